// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::StatsError;
use crate::registration::EnterpriseHost;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use url::Url;

pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest accepted stats interval; larger values cannot be scheduled.
pub const MAX_STATS_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const MAX_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_DATABASE: &str = "_stats";
pub const DEFAULT_RETENTION_POLICY: &str = "autogen";

/// Configuration for the stats service.
///
/// Immutable once handed to [`crate::StatsService::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsConfig {
    /// Whether the host should run the reporter at all
    pub enabled: bool,
    /// Period between two stats snapshots
    pub stats_interval: Duration,
    /// Database every emitted point is routed to
    pub database: String,
    /// Retention policy every emitted point is routed to
    pub retention_policy: String,
    /// Enterprise management endpoints to register with at startup
    pub enterprise_hosts: Vec<EnterpriseHost>,
    /// Per-request timeout of the registration call
    pub registration_timeout: Duration,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stats_interval: DEFAULT_STATS_INTERVAL,
            database: DEFAULT_DATABASE.to_string(),
            retention_policy: DEFAULT_RETENTION_POLICY.to_string(),
            enterprise_hosts: Vec::new(),
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
        }
    }
}

impl StatsConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, StatsError> {
        Self::from_env_iter(env::vars())
    }

    /// Create configuration from an explicit set of `(key, value)` pairs.
    ///
    /// Recognized keys match the `STATS_*` environment variables read by
    /// [`StatsConfig::from_env`].
    pub fn from_env_iter<I, K, V>(vars: I) -> Result<Self, StatsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let defaults = Self::default();

        let enabled = vars
            .get("STATS_ENABLED")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(defaults.enabled);
        let stats_interval = vars
            .get("STATS_INTERVAL_SECS")
            .and_then(|val| val.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.stats_interval);
        let database = vars
            .get("STATS_DATABASE")
            .cloned()
            .unwrap_or(defaults.database);
        let retention_policy = vars
            .get("STATS_RETENTION_POLICY")
            .cloned()
            .unwrap_or(defaults.retention_policy);
        let enterprise_hosts = vars
            .get("STATS_ENTERPRISE_HOSTS")
            .map(|val| parse_enterprise_hosts(val.as_str()))
            .unwrap_or_default();
        let registration_timeout = vars
            .get("STATS_REGISTRATION_TIMEOUT_SECS")
            .and_then(|val| val.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.registration_timeout);

        let config = Self {
            enabled,
            stats_interval,
            database,
            retention_policy,
            enterprise_hosts,
            registration_timeout,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), StatsError> {
        if self.stats_interval.is_zero() {
            return Err(StatsError::InvalidConfig(
                "stats interval must be greater than 0".to_string(),
            ));
        }

        if self.stats_interval > MAX_STATS_INTERVAL {
            return Err(StatsError::InvalidConfig(format!(
                "stats interval cannot exceed {}s",
                MAX_STATS_INTERVAL.as_secs()
            )));
        }

        if self.registration_timeout.is_zero() {
            return Err(StatsError::InvalidConfig(
                "registration timeout must be greater than 0".to_string(),
            ));
        }

        if self.registration_timeout > MAX_REGISTRATION_TIMEOUT {
            return Err(StatsError::InvalidConfig(format!(
                "registration timeout cannot exceed {}s",
                MAX_REGISTRATION_TIMEOUT.as_secs()
            )));
        }

        if self.database.trim().is_empty() {
            return Err(StatsError::InvalidConfig(
                "stats database cannot be empty".to_string(),
            ));
        }

        if self.retention_policy.trim().is_empty() {
            return Err(StatsError::InvalidConfig(
                "stats retention policy cannot be empty".to_string(),
            ));
        }

        for host in &self.enterprise_hosts {
            match Url::parse(&host.url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                _ => {
                    return Err(StatsError::InvalidConfig(format!(
                        "Invalid enterprise host '{}'. Must be an http or https URL",
                        host.url
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Splits a comma separated host list; the first entry is the primary host.
fn parse_enterprise_hosts(raw: &str) -> Vec<EnterpriseHost> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .enumerate()
        .map(|(i, url)| EnterpriseHost {
            url: url.to_string(),
            primary: i == 0,
        })
        .collect()
}
