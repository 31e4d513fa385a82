// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub const CLUSTER_ID_VAR: &str = "cluster_id";
pub const SERVER_ID_VAR: &str = "server_id";
pub const HOST_VAR: &str = "host";
pub const VERSION_VAR: &str = "version";

/// Product name announced when the host does not override it.
pub const DEFAULT_PRODUCT: &str = "stats-reporter";

/// Identity of this instance, as announced to enterprise managers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub cluster_id: String,
    pub product_id: String,
    pub host: String,
    pub version: String,
    pub product: String,
}

/// Reads the identity published by the host. Resolved on every open, never
/// at construction.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self) -> Identity;
}

impl IdentityResolver for Identity {
    fn resolve(&self) -> Identity {
        self.clone()
    }
}

/// Process-wide string variables published by the host, cheap to clone.
#[derive(Debug, Clone)]
pub struct PublishedVars {
    vars: Arc<RwLock<HashMap<String, String>>>,
    product: String,
}

impl Default for PublishedVars {
    fn default() -> Self {
        Self::new(DEFAULT_PRODUCT)
    }
}

impl PublishedVars {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            vars: Arc::new(RwLock::new(HashMap::new())),
            product: product.into(),
        }
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Unset variables read as an empty string.
    fn get_string(&self, name: &str) -> String {
        self.get(name).unwrap_or_default()
    }
}

impl IdentityResolver for PublishedVars {
    fn resolve(&self) -> Identity {
        Identity {
            cluster_id: self.get_string(CLUSTER_ID_VAR),
            product_id: self.get_string(SERVER_ID_VAR),
            host: self.get_string(HOST_VAR),
            version: self.get_string(VERSION_VAR),
            product: self.product.clone(),
        }
    }
}
