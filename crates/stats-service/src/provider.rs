// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sources of the stats snapshots emitted on every tick.
//!
//! [`StatsProvider`] is the seam the reporter pulls from. [`StatsRegistry`] is
//! the in-process implementation host components publish their counters into.

use crate::point::{FieldValue, Fields, Tags};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// One named metric record with its tags and field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Stat {
    pub name: String,
    pub tags: Tags,
    pub values: Fields,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Returns the current snapshot. Called once per tick, so it must be cheap.
    async fn stats(&self) -> Result<Vec<Stat>, ProviderError>;
}

type StatKey = (String, Tags);

/// Shared registry of named stats, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct StatsRegistry {
    entries: Arc<RwLock<BTreeMap<StatKey, StatHandle>>>,
}

/// Handle used by a host component to update the fields of its stat.
#[derive(Debug, Clone, Default)]
pub struct StatHandle {
    values: Arc<Mutex<Fields>>,
}

impl StatHandle {
    pub fn set(&self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.into(), value.into());
    }

    /// Adds `delta` to an integer field, starting from zero when the field is
    /// missing or holds another type.
    pub fn add(&self, key: impl Into<String>, delta: i64) {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = values.entry(key.into()).or_insert(FieldValue::Integer(0));
        match entry {
            FieldValue::Integer(current) => *current = current.saturating_add(delta),
            other => *other = FieldValue::Integer(delta),
        }
    }

    fn snapshot(&self) -> Fields {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for `(name, tags)`, creating it on first use.
    pub fn register(&self, name: impl Into<String>, tags: Tags) -> StatHandle {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.entry((name.into(), tags)).or_default().clone()
    }

    /// Removes a stat. Returns whether it was registered.
    pub fn unregister(&self, name: &str, tags: &Tags) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.remove(&(name.to_string(), tags.clone())).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every registered stat ordered by name then tags.
    pub fn snapshot(&self) -> Vec<Stat> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|((name, tags), handle)| Stat {
                name: name.clone(),
                tags: tags.clone(),
                values: handle.snapshot(),
            })
            .collect()
    }
}

#[async_trait]
impl StatsProvider for StatsRegistry {
    async fn stats(&self) -> Result<Vec<Stat>, ProviderError> {
        Ok(self.snapshot())
    }
}
