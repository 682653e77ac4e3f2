use crate::sink::{NodeSink, PublishedNode, SinkError};
use async_trait::async_trait;
use redis::{AsyncCommands, Pipeline, aio::MultiplexedConnection};
use tracing::debug;

/// Stores nodes as JSON strings under `<prefix>:node:<id>` and indexes them
/// per owner in the set `<prefix>:owner:<owner>`. Every owner that ever
/// published is registered in `<prefix>:owners`, so a delete can clear the
/// id from all owner sets without reading the node back.
#[derive(Debug, Clone)]
pub struct RedisSink {
    client: redis::Client,
    prefix: String,
}

impl RedisSink {
    pub fn open(url: &str, prefix: impl Into<String>) -> Result<Self, SinkError> {
        let client = redis::Client::open(url).map_err(|err| SinkError::Backend(err.to_string()))?;
        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    fn node_key(&self, id: &str) -> String {
        format!("{}:node:{}", self.prefix, id)
    }

    fn owner_key(&self, owner: &str) -> String {
        format!("{}:owner:{}", self.prefix, owner)
    }

    fn owners_key(&self) -> String {
        format!("{}:owners", self.prefix)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, SinkError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)
    }

    /// Index updates for `node`, plus the body write when `write_body`.
    fn publish_commands(&self, node: &PublishedNode, write_body: bool) -> Result<Pipeline, SinkError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        if write_body {
            let json =
                serde_json::to_string(node).map_err(|err| SinkError::Serialize(err.to_string()))?;
            pipe.set(self.node_key(&node.id), json).ignore();
        }
        pipe.sadd(self.owner_key(&node.owner), &node.id).ignore();
        pipe.sadd(self.owners_key(), &node.owner).ignore();
        Ok(pipe)
    }

    /// Removes `id` from every known owner set and drops its body. Does not
    /// depend on the stored node being present or readable.
    fn delete_commands(&self, owners: &[String], id: &str) -> Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for owner in owners {
            pipe.srem(self.owner_key(owner), id).ignore();
        }
        pipe.del(self.node_key(id)).ignore();
        pipe
    }
}

/// A stored node that is missing or unreadable counts as changed.
fn is_unchanged(stored: Option<&str>, digest: &str) -> bool {
    stored
        .and_then(|raw| serde_json::from_str::<PublishedNode>(raw).ok())
        .is_some_and(|prev| prev.content_digest == digest)
}

fn backend(err: redis::RedisError) -> SinkError {
    SinkError::Backend(err.to_string())
}

#[async_trait]
impl NodeSink for RedisSink {
    async fn list_existing(&self, owner: &str) -> Result<Vec<String>, SinkError> {
        let mut conn = self.connection().await?;
        let mut ids: Vec<String> = conn.smembers(self.owner_key(owner)).await.map_err(backend)?;
        ids.sort();
        Ok(ids)
    }

    async fn publish(&self, node: &PublishedNode) -> Result<(), SinkError> {
        let mut conn = self.connection().await?;
        let stored: Option<String> = conn.get(self.node_key(&node.id)).await.map_err(backend)?;
        let unchanged = is_unchanged(stored.as_deref(), &node.content_digest);
        if unchanged {
            debug!(target: "is24.sink", id = %node.id, "node unchanged");
        }
        let pipe = self.publish_commands(node, !unchanged)?;
        let _: () = pipe.query_async(&mut conn).await.map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SinkError> {
        let mut conn = self.connection().await?;
        let owners: Vec<String> = conn.smembers(self.owners_key()).await.map_err(backend)?;
        let pipe = self.delete_commands(&owners, id);
        let _: () = pipe.query_async(&mut conn).await.map_err(backend)?;
        Ok(())
    }
}
