use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};
use tokio::sync::RwLock;

/// Capped stream that monitoring dashboards tail for integrity events.
pub(crate) const VIOLATION_STREAM_KEY: &str = "exam:violations";
const VIOLATION_STREAM_MAXLEN: u64 = 10_000;

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    /// Claims `key` for `ttl_seconds`. Returns `false` when someone already holds it.
    ///
    /// Without a connection every claim succeeds; callers keep their own local guard.
    pub(crate) async fn claim_once(&self, key: &str, ttl_seconds: u64) -> Result<bool, RedisError> {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return Ok(true);
        };

        let reply: Option<String> = cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut manager)
            .await?;

        Ok(reply.is_some())
    }

    /// Appends an event to the capped violation stream. No-op while disconnected.
    pub(crate) async fn append_violation_event(&self, payload: &str) -> Result<(), RedisError> {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return Ok(());
        };

        cmd("XADD")
            .arg(VIOLATION_STREAM_KEY)
            .arg("MAXLEN")
            .arg("~")
            .arg(VIOLATION_STREAM_MAXLEN)
            .arg("*")
            .arg("payload")
            .arg(payload)
            .query_async::<_, String>(&mut manager)
            .await?;

        Ok(())
    }
}
