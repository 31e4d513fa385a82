// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One-shot registration of this instance with enterprise management hosts.

use crate::identity::Identity;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const PRODUCTS_PATH: &str = "api/v2/products";

/// A management endpoint. The primary host is tried first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterpriseHost {
    pub url: String,
    pub primary: bool,
}

/// Registration payload announcing this instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub cluster_id: String,
    pub product_id: String,
    pub host: String,
    pub name: String,
    pub version: String,
}

impl From<&Identity> for Product {
    fn from(identity: &Identity) -> Self {
        Self {
            cluster_id: identity.cluster_id.clone(),
            product_id: identity.product_id.clone(),
            host: identity.host.clone(),
            name: identity.product.clone(),
            version: identity.version.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationResponse {
    pub url: String,
    pub status: StatusCode,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("no enterprise hosts configured")]
    NoHosts,

    #[error("invalid enterprise host {0}")]
    InvalidHost(String),

    #[error("failed to build registration client: {0}")]
    Client(String),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with {status}")]
    Status { url: String, status: StatusCode },
}

#[async_trait]
pub trait RegistrationClient: Send + Sync {
    async fn register(&self, product: &Product)
        -> Result<RegistrationResponse, RegistrationError>;
}

/// Builds a registration client bound to a list of hosts.
pub trait RegistrationClientFactory: Send + Sync {
    fn build(
        &self,
        hosts: &[EnterpriseHost],
    ) -> Result<Arc<dyn RegistrationClient>, RegistrationError>;
}

/// Registration client posting the product as JSON to every host in turn
/// until one accepts it.
#[derive(Debug, Clone)]
pub struct HttpRegistrationClient {
    client: reqwest::Client,
    endpoints: Vec<Url>,
}

impl HttpRegistrationClient {
    pub fn new(hosts: &[EnterpriseHost], timeout: Duration) -> Result<Self, RegistrationError> {
        if hosts.is_empty() {
            return Err(RegistrationError::NoHosts);
        }

        let mut ordered: Vec<&EnterpriseHost> = hosts.iter().collect();
        ordered.sort_by_key(|host| !host.primary);

        let endpoints = ordered
            .into_iter()
            .map(|host| products_endpoint(&host.url))
            .collect::<Result<Vec<_>, _>>()?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistrationError::Client(e.to_string()))?;

        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }
}

fn products_endpoint(raw: &str) -> Result<Url, RegistrationError> {
    let base = Url::parse(raw).map_err(|_| RegistrationError::InvalidHost(raw.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(RegistrationError::InvalidHost(raw.to_string()));
    }
    let joined = format!("{}/{PRODUCTS_PATH}", base.as_str().trim_end_matches('/'));
    Url::parse(&joined).map_err(|_| RegistrationError::InvalidHost(raw.to_string()))
}

#[async_trait]
impl RegistrationClient for HttpRegistrationClient {
    async fn register(
        &self,
        product: &Product,
    ) -> Result<RegistrationResponse, RegistrationError> {
        let mut last_error = RegistrationError::NoHosts;
        for endpoint in &self.endpoints {
            let url = endpoint.to_string();
            debug!("Registering {} with {}", product.name, url);
            match self.client.post(endpoint.clone()).json(product).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(RegistrationResponse {
                        url,
                        status: resp.status(),
                    });
                }
                Ok(resp) => {
                    last_error = RegistrationError::Status {
                        url,
                        status: resp.status(),
                    };
                }
                Err(source) => {
                    last_error = RegistrationError::Request { url, source };
                }
            }
            debug!("Registration attempt failed: {last_error}");
        }
        Err(last_error)
    }
}

/// Builds [`HttpRegistrationClient`]s with a fixed request timeout.
#[derive(Debug, Clone)]
pub struct HttpRegistrationClientFactory {
    pub timeout: Duration,
}

impl RegistrationClientFactory for HttpRegistrationClientFactory {
    fn build(
        &self,
        hosts: &[EnterpriseHost],
    ) -> Result<Arc<dyn RegistrationClient>, RegistrationError> {
        Ok(Arc::new(HttpRegistrationClient::new(hosts, self.timeout)?))
    }
}
