use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    db::{Cache, CacheKey},
    error::AppResult,
    models::ChannelId,
};

/// Where a batch recompute remembers the last channel it fully committed
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, mode: &str) -> AppResult<Option<ChannelId>>;

    /// Must be durable when it returns; the job moves on right after
    async fn save(&self, mode: &str, channel: ChannelId) -> AppResult<()>;

    async fn clear(&self, mode: &str) -> AppResult<()>;
}

#[async_trait::async_trait]
impl CheckpointStore for Cache {
    async fn load(&self, mode: &str) -> AppResult<Option<ChannelId>> {
        self.get_from_cache(&CacheKey::RecomputeCheckpoint(mode.to_string()))
            .await
    }

    async fn save(&self, mode: &str, channel: ChannelId) -> AppResult<()> {
        self.set_now(&CacheKey::RecomputeCheckpoint(mode.to_string()), &channel)
            .await
    }

    async fn clear(&self, mode: &str) -> AppResult<()> {
        self.delete(&CacheKey::RecomputeCheckpoint(mode.to_string()))
            .await
    }
}

/// Process-local checkpoints, lost on exit
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpoints {
    inner: Arc<Mutex<HashMap<String, ChannelId>>>,
}

impl MemoryCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryCheckpoints {
    async fn load(&self, mode: &str) -> AppResult<Option<ChannelId>> {
        Ok(self.inner.lock().await.get(mode).copied())
    }

    async fn save(&self, mode: &str, channel: ChannelId) -> AppResult<()> {
        self.inner.lock().await.insert(mode.to_string(), channel);
        Ok(())
    }

    async fn clear(&self, mode: &str) -> AppResult<()> {
        self.inner.lock().await.remove(mode);
        Ok(())
    }
}
