//! Operator-assigned labels for clients.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Persistent mapping from client id to a free-text tag.
#[async_trait]
pub trait TagStore: Send + Sync + 'static {
    /// All known tags keyed by client id.
    async fn get_all(&self) -> Result<BTreeMap<String, String>>;

    /// Create or replace the tag of one client. Last write wins.
    async fn upsert(&self, client_id: &str, tag: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct ClientRegistry {
    store: Arc<dyn TagStore>,
}

impl ClientRegistry {
    pub fn new(store: Arc<dyn TagStore>) -> Self {
        Self { store }
    }

    pub async fn get_all(&self) -> Result<BTreeMap<String, String>> {
        self.store.get_all().await
    }

    pub async fn upsert(&self, client_id: &str, tag: &str) -> Result<()> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(Error::Validation("client id must not be empty".to_owned()));
        }
        let tag = tag.trim();
        self.store.upsert(client_id, tag).await?;
        info!(client_id, tag, "client tag updated");
        Ok(())
    }

    /// Tag for one client, if assigned.
    pub async fn tag_of(&self, client_id: &str) -> Result<Option<String>> {
        Ok(self.store.get_all().await?.remove(client_id))
    }
}
