// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background reporter that snapshots internal runtime stats on a fixed
//! interval and emits them as points into a host stream, tagged with a
//! destination database and retention policy.
//!
//! The service optionally registers the running instance with enterprise
//! management hosts once per open.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod error;
pub mod identity;
pub mod point;
pub mod provider;
pub mod registration;
pub mod service;
pub mod stream;

pub use config::StatsConfig;
pub use error::StatsError;
pub use identity::{Identity, IdentityResolver, PublishedVars};
pub use point::{FieldValue, Fields, Group, Point, Tags};
pub use provider::{ProviderError, Stat, StatHandle, StatsProvider, StatsRegistry};
pub use registration::{
    EnterpriseHost, HttpRegistrationClient, HttpRegistrationClientFactory, Product,
    RegistrationClient, RegistrationClientFactory, RegistrationError, RegistrationResponse,
};
pub use service::StatsService;
pub use stream::{
    ChannelStream, ChannelStreamFactory, StreamCollector, StreamError, StreamFactory,
    STATS_STREAM_NAME,
};
