//! Per-tenant database connections.
//!
//! Each tenant key maps to one `[databases.<key>]` entry. Stores are
//! created lazily on first use and then shared by every request for that
//! tenant; connecting also loads the table catalog, so the first request
//! pays for it once.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::info;

use pgsemantic_core::store::Store;

use crate::config::{Config, DatabaseConfig};
use crate::pg_store::PgStore;

/// Tenant used when a request names none.
pub const DEFAULT_TENANT: &str = "default";

/// Short, stable identifier for a tenant key, safe to log.
pub fn tenant_fingerprint(tenant: &str) -> String {
    let digest = Sha256::digest(tenant.as_bytes());
    hex::encode(&digest[..6])
}

/// Lazily connected stores keyed by tenant.
pub struct ConnectionRegistry {
    databases: BTreeMap<String, DatabaseConfig>,
    stores: RwLock<HashMap<String, Arc<dyn Store>>>,
}

impl ConnectionRegistry {
    pub fn new(databases: BTreeMap<String, DatabaseConfig>) -> Self {
        Self {
            databases,
            stores: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.databases.clone())
    }

    /// Install a ready-made store for a tenant, bypassing the connection
    /// step. The tenant need not appear in the configuration.
    pub async fn seed(&self, tenant: &str, store: Arc<dyn Store>) {
        self.stores.write().await.insert(tenant.to_string(), store);
    }

    /// The store for `tenant`, connecting on first use.
    pub async fn get(&self, tenant: &str) -> Result<Arc<dyn Store>> {
        if let Some(store) = self.stores.read().await.get(tenant) {
            return Ok(store.clone());
        }

        let mut stores = self.stores.write().await;
        if let Some(store) = stores.get(tenant) {
            return Ok(store.clone());
        }
        let Some(db) = self.databases.get(tenant) else {
            bail!("tenant '{}' not found in [databases]", tenant);
        };

        let store: Arc<dyn Store> = Arc::new(PgStore::connect(db).await?);
        info!(
            tenant = %tenant_fingerprint(tenant),
            database = %store.label(),
            "database connected"
        );
        stores.insert(tenant.to_string(), store.clone());
        Ok(store)
    }

    /// Drop a cached store; the next request reconnects.
    pub async fn remove(&self, tenant: &str) -> bool {
        self.stores.write().await.remove(tenant).is_some()
    }

    /// Number of connected stores.
    pub async fn len(&self) -> usize {
        self.stores.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
