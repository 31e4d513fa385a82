// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stats service lifecycle.
//!
//! On [`StatsService::open`] the service acquires the `stats` stream, optionally
//! spawns a one-shot registration task, and spawns the periodic reporting loop.
//! [`StatsService::close`] cancels the loop, waits for every spawned task to
//! exit, and only then closes the stream, so no point is ever written to a
//! closed sink.

use crate::config::{StatsConfig, MAX_STATS_INTERVAL};
use crate::error::StatsError;
use crate::identity::{Identity, IdentityResolver};
use crate::point::{Group, Point};
use crate::provider::StatsProvider;
use crate::registration::{HttpRegistrationClientFactory, Product, RegistrationClientFactory};
use crate::stream::{StreamCollector, StreamFactory, STATS_STREAM_NAME};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Sends internal stats back into the host stream under the configured
/// database and retention policy.
pub struct StatsService {
    config: StatsConfig,
    provider: Arc<dyn StatsProvider>,
    streams: Arc<dyn StreamFactory>,
    identity: Arc<dyn IdentityResolver>,
    registration: Arc<dyn RegistrationClientFactory>,
    state: Mutex<State>,
}

impl std::fmt::Debug for StatsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsService")
            .field("config", &self.config)
            .finish()
    }
}

enum State {
    Closed,
    Open(Running),
}

/// Everything owned by one open/close cycle.
struct Running {
    stream: Arc<dyn StreamCollector>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl StatsService {
    /// Create a closed service. Registration goes over HTTP unless replaced
    /// with [`StatsService::with_registration_factory`].
    pub fn new(
        config: StatsConfig,
        provider: Arc<dyn StatsProvider>,
        streams: Arc<dyn StreamFactory>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Result<Self, StatsError> {
        config.validate()?;
        let registration = Arc::new(HttpRegistrationClientFactory {
            timeout: config.registration_timeout,
        });
        Ok(Self {
            config,
            provider,
            streams,
            identity,
            registration,
            state: Mutex::new(State::Closed),
        })
    }

    pub fn with_registration_factory(
        mut self,
        registration: Arc<dyn RegistrationClientFactory>,
    ) -> Self {
        self.registration = registration;
        self
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    pub async fn is_open(&self) -> bool {
        matches!(*self.state.lock().await, State::Open(_))
    }

    /// Open the service and start reporting.
    ///
    /// Fails without side effects if the service is already open or the
    /// stats stream cannot be acquired.
    pub async fn open(&self) -> Result<(), StatsError> {
        let mut state = self.state.lock().await;
        if matches!(*state, State::Open(_)) {
            return Err(StatsError::AlreadyOpen);
        }

        // Published values may only be set once the host has started.
        let identity = self.identity.resolve();

        let stream = self.streams.stream(STATS_STREAM_NAME)?;
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(2);

        if let Some(task) = self.register_server(&identity) {
            tasks.push(task);
        }

        let reporter = Reporter {
            provider: Arc::clone(&self.provider),
            stream: Arc::clone(&stream),
            database: self.config.database.clone(),
            retention_policy: self.config.retention_policy.clone(),
        };
        tasks.push(tokio::spawn(
            reporter
                .run(self.config.stats_interval, cancel.clone())
                .in_current_span(),
        ));

        *state = State::Open(Running {
            stream,
            cancel,
            tasks,
        });
        info!("opened stats service");
        Ok(())
    }

    /// Close the service.
    ///
    /// Returns only after the reporting loop and any in-flight registration
    /// have exited; the stream is closed last.
    ///
    /// The drain runs on its own task: dropping this future before it
    /// resolves leaves the service closed and the stream is still closed
    /// once the tasks exit.
    pub async fn close(&self) -> Result<(), StatsError> {
        let Running {
            stream,
            cancel,
            tasks,
        } = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, State::Closed) {
                State::Closed => return Err(StatsError::NotOpen),
                State::Open(running) => running,
            }
        };

        cancel.cancel();
        let drain = tokio::spawn(
            async move {
                for task in tasks {
                    if let Err(e) = task.await {
                        error!("stats task ended abnormally: {e}");
                    }
                }
                stream.close();
            }
            .in_current_span(),
        );
        if let Err(e) = drain.await {
            error!("stats drain ended abnormally: {e}");
        }
        info!("closed stats service");
        Ok(())
    }

    /// Spawns the registration task when enterprise hosts are configured.
    fn register_server(&self, identity: &Identity) -> Option<JoinHandle<()>> {
        if self.config.enterprise_hosts.is_empty() {
            return None;
        }

        let client = match self.registration.build(&self.config.enterprise_hosts) {
            Ok(client) => client,
            Err(e) => {
                error!("Unable to contact one or more Enterprise hosts: {e}");
                error!("Unable to register with Enterprise Manager");
                return None;
            }
        };

        let product = Product::from(identity);
        Some(tokio::spawn(
            async move {
                match client.register(&product).await {
                    Ok(resp) => info!(
                        "registered {} with {}, received code {}",
                        product.name, resp.url, resp.status
                    ),
                    Err(e) => error!("failed to register {}: {e}", product.name),
                }
            }
            .in_current_span(),
        ))
    }
}

/// Periodic loop turning stats snapshots into points.
struct Reporter {
    provider: Arc<dyn StatsProvider>,
    stream: Arc<dyn StreamCollector>,
    database: String,
    retention_policy: String,
}

impl Reporter {
    async fn run(self, mut period: Duration, cancel: CancellationToken) {
        let start = match Instant::now().checked_add(period) {
            Some(start) => start,
            None => {
                warn!(
                    "stats interval {:?} out of range, using {:?}",
                    period, MAX_STATS_INTERVAL
                );
                period = MAX_STATS_INTERVAL;
                Instant::now() + period
            }
        };
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("stats reporter started, interval {:?}", period);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("stats reporter stopping");
                    return;
                }
                _ = ticker.tick() => self.report_stats().await,
            }
        }
    }

    async fn report_stats(&self) {
        // One timestamp per tick, shared by every point.
        let now = OffsetDateTime::now_utc();
        let data = match self.provider.stats().await {
            Ok(data) => data,
            Err(e) => {
                error!("error getting stats data: {e}");
                return;
            }
        };

        for stat in data {
            self.stream.collect_point(Point {
                database: self.database.clone(),
                retention_policy: self.retention_policy.clone(),
                name: stat.name,
                group: Group::NIL,
                tags: stat.tags,
                fields: stat.values,
                time: now,
            });
        }
    }
}
