use crate::estate::overview::ListingOverview;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink backend failed: {0}")]
    Backend(String),
    #[error("stored node is unreadable: {0}")]
    Serialize(String),
}

/// A listing as handed to the host content graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedNode {
    pub id: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub owner: String,
    pub node_type: String,
    pub content_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<ListingOverview>,
    pub listing: Value,
}

impl PublishedNode {
    pub fn new(id: String, owner: &str, node_type: &str, listing: Value) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            owner: owner.to_string(),
            node_type: node_type.to_string(),
            content_digest: content_digest(&listing),
            overview: None,
            listing,
        }
    }

    pub fn with_overview(mut self, overview: ListingOverview) -> Self {
        self.overview = Some(overview);
        self
    }
}

/// SHA-256 over the compact JSON rendering. Object keys serialize in sorted
/// order, so equal listings always hash equally.
pub fn content_digest(listing: &Value) -> String {
    hex::encode(Sha256::digest(listing.to_string().as_bytes()))
}

/// The host-side store this pipeline publishes into.
#[async_trait]
pub trait NodeSink: Send + Sync {
    /// Identifiers previously published under `owner`.
    async fn list_existing(&self, owner: &str) -> Result<Vec<String>, SinkError>;

    /// Creates the node or replaces the one with the same id.
    async fn publish(&self, node: &PublishedNode) -> Result<(), SinkError>;

    async fn delete(&self, id: &str) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    Publish(String),
    Delete(String),
}

/// Process-local sink. Keeps every node plus the sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    nodes: Arc<Mutex<BTreeMap<String, PublishedNode>>>,
    ops: Arc<Mutex<Vec<SinkOp>>>,
}

impl MemorySink {
    pub fn seeded(nodes: impl IntoIterator<Item = PublishedNode>) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect();
        Self {
            nodes: Arc::new(Mutex::new(nodes)),
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn ops(&self) -> Vec<SinkOp> {
        self.ops.lock().await.clone()
    }

    pub async fn node(&self, id: &str) -> Option<PublishedNode> {
        self.nodes.lock().await.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.nodes.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl NodeSink for MemorySink {
    async fn list_existing(&self, owner: &str) -> Result<Vec<String>, SinkError> {
        let guard = self.nodes.lock().await;
        Ok(guard
            .values()
            .filter(|node| node.owner == owner)
            .map(|node| node.id.clone())
            .collect())
    }

    async fn publish(&self, node: &PublishedNode) -> Result<(), SinkError> {
        let mut guard = self.nodes.lock().await;
        let unchanged = guard
            .get(&node.id)
            .is_some_and(|prev| prev.content_digest == node.content_digest);
        if unchanged {
            debug!(target: "is24.sink", id = %node.id, "node unchanged");
        }
        guard.insert(node.id.clone(), node.clone());
        self.ops.lock().await.push(SinkOp::Publish(node.id.clone()));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SinkError> {
        self.nodes.lock().await.remove(id);
        self.ops.lock().await.push(SinkOp::Delete(id.to_string()));
        Ok(())
    }
}
