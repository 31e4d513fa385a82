// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tokio::time::{interval, Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use stats_service::{
    identity::{CLUSTER_ID_VAR, HOST_VAR, SERVER_ID_VAR, VERSION_VAR},
    ChannelStreamFactory, PublishedVars, StatsConfig, StatsRegistry, StatsService, Tags,
    STATS_STREAM_NAME,
};

const PRODUCT_NAME: &str = "stats-reporter";
const RUNTIME_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
pub async fn main() {
    let log_level = env::var("STATS_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match StatsConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating stats config on startup: {e}");
            return;
        }
    };

    if !config.enabled {
        info!("stats reporting disabled, shutting down");
        return;
    }

    let vars = PublishedVars::new(PRODUCT_NAME);
    let registry = StatsRegistry::new();
    let streams = Arc::new(ChannelStreamFactory::new([STATS_STREAM_NAME]));

    let Some(mut points) = streams.take_receiver(STATS_STREAM_NAME) else {
        error!("stats stream receiver unavailable");
        return;
    };
    tokio::spawn(async move {
        while let Some(point) = points.recv().await {
            match serde_json::to_string(&point) {
                Ok(line) => info!("{line}"),
                Err(e) => error!("failed to encode point {}: {e}", point.name),
            }
        }
    });

    let runtime_tags = Tags::from([("pid".to_string(), std::process::id().to_string())]);
    let runtime = registry.register("runtime", runtime_tags);
    tokio::spawn(async move {
        let started = Instant::now();
        let mut refresh = interval(RUNTIME_REFRESH_INTERVAL);
        loop {
            refresh.tick().await;
            runtime.set("uptime_secs", started.elapsed().as_secs());
        }
    });

    let service = match StatsService::new(
        config,
        Arc::new(registry),
        streams.clone(),
        Arc::new(vars.clone()),
    ) {
        Ok(service) => service,
        Err(e) => {
            error!("Error creating stats service: {e}");
            return;
        }
    };

    // Identity is published after construction; the service reads it on open.
    publish_identity(&vars);

    if let Err(e) = service.open().await {
        error!("Error opening stats service: {e}");
        return;
    }
    info!(
        "reporting stats every {:?} into {}.{}",
        service.config().stats_interval,
        service.config().database,
        service.config().retention_policy
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {e}");
    }

    info!("Shutting down stats reporter");
    if let Err(e) = service.close().await {
        error!("Error closing stats service: {e}");
    }
}

fn publish_identity(vars: &PublishedVars) {
    vars.set(
        CLUSTER_ID_VAR,
        env::var("STATS_CLUSTER_ID").unwrap_or_default(),
    );
    vars.set(SERVER_ID_VAR, env::var("STATS_SERVER_ID").unwrap_or_default());
    vars.set(
        HOST_VAR,
        env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
    );
    vars.set(VERSION_VAR, env!("CARGO_PKG_VERSION"));
}
