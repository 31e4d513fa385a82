// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host streams that accept the points produced by the reporter.

use crate::point::Point;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Logical name of the stream stats points are written to.
pub const STATS_STREAM_NAME: &str = "stats";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("unknown stream {0}")]
    UnknownStream(String),

    #[error("stream closed")]
    Closed,
}

/// Sink accepting one point at a time.
pub trait StreamCollector: Send + Sync {
    fn collect_point(&self, point: Point);
    fn close(&self);
}

/// Resolves a logical stream name to a sink handle.
pub trait StreamFactory: Send + Sync {
    fn stream(&self, name: &str) -> Result<Arc<dyn StreamCollector>, StreamError>;
}

/// In-memory stream factory backed by unbounded channels, one per logical name.
///
/// Every [`ChannelStream`] handed out for a name feeds the same receiver, so a
/// consumer taken once keeps receiving across close and re-open cycles.
#[derive(Debug)]
pub struct ChannelStreamFactory {
    senders: HashMap<String, mpsc::UnboundedSender<Point>>,
    receivers: Mutex<HashMap<String, mpsc::UnboundedReceiver<Point>>>,
}

impl ChannelStreamFactory {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for name in names {
            let name = name.into();
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(name.clone(), tx);
            receivers.insert(name, rx);
        }
        Self {
            senders,
            receivers: Mutex::new(receivers),
        }
    }

    /// Takes the consuming end of `name`. Returns `None` for unknown names or
    /// when the receiver was already taken.
    pub fn take_receiver(&self, name: &str) -> Option<mpsc::UnboundedReceiver<Point>> {
        self.receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }
}

impl StreamFactory for ChannelStreamFactory {
    fn stream(&self, name: &str) -> Result<Arc<dyn StreamCollector>, StreamError> {
        let tx = self
            .senders
            .get(name)
            .ok_or_else(|| StreamError::UnknownStream(name.to_string()))?;
        Ok(Arc::new(ChannelStream {
            name: name.to_string(),
            tx: Mutex::new(Some(tx.clone())),
        }))
    }
}

#[derive(Debug)]
pub struct ChannelStream {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Point>>>,
}

impl StreamCollector for ChannelStream {
    fn collect_point(&self, point: Point) {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(point).is_err() {
                    debug!("stream {}: receiver dropped, point discarded", self.name);
                }
            }
            None => debug!("stream {}: {}, point discarded", self.name, StreamError::Closed),
        }
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{Fields, Group, Tags};
    use time::OffsetDateTime;

    fn point(name: &str) -> Point {
        Point {
            database: "_stats".to_string(),
            retention_policy: "autogen".to_string(),
            name: name.to_string(),
            group: Group::NIL,
            tags: Tags::new(),
            fields: Fields::new(),
            time: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_unknown_stream() {
        let factory = ChannelStreamFactory::new([STATS_STREAM_NAME]);
        let err = factory.stream("other").err().expect("unknown name must fail");
        assert_eq!(err, StreamError::UnknownStream("other".to_string()));
    }

    #[test]
    fn test_points_reach_receiver() {
        let factory = ChannelStreamFactory::new([STATS_STREAM_NAME]);
        let mut rx = factory
            .take_receiver(STATS_STREAM_NAME)
            .expect("receiver available");
        assert!(factory.take_receiver(STATS_STREAM_NAME).is_none());

        let stream = factory.stream(STATS_STREAM_NAME).expect("known stream");
        stream.collect_point(point("ingress"));

        let received = rx.try_recv().expect("point forwarded");
        assert_eq!(received.name, "ingress");
    }

    #[test]
    fn test_closed_stream_drops_points_but_factory_survives() {
        let factory = ChannelStreamFactory::new([STATS_STREAM_NAME]);
        let mut rx = factory
            .take_receiver(STATS_STREAM_NAME)
            .expect("receiver available");

        let first = factory.stream(STATS_STREAM_NAME).expect("known stream");
        first.close();
        first.collect_point(point("dropped"));
        assert!(rx.try_recv().is_err());

        let second = factory.stream(STATS_STREAM_NAME).expect("known stream");
        second.collect_point(point("kept"));
        assert_eq!(rx.try_recv().expect("point forwarded").name, "kept");
    }
}
