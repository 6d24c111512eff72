use crate::core::errors::BillioError;
use crate::core::models::group::GroupId;
use crate::core::services::GroupSnapshot;
use crate::infrastructure::cache::Cache;
use crate::infrastructure::cache::cache_keys::group_snapshot_key;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryCache {
    cache: Arc<RwLock<HashMap<String, (GroupSnapshot, DateTime<Utc>)>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        InMemoryCache::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_group_snapshot(&self, group_id: GroupId) -> Result<Option<GroupSnapshot>, BillioError> {
        let key = group_snapshot_key(group_id);
        let mut cache = self.cache.write().await;
        match cache.get(&key) {
            Some((_, expiry)) if *expiry <= Utc::now() => {
                cache.remove(&key);
                Ok(None)
            }
            Some((snapshot, _)) => Ok(Some(snapshot.clone())),
            None => Ok(None),
        }
    }

    async fn save_group_snapshot(
        &self,
        snapshot: &GroupSnapshot,
        ttl: std::time::Duration,
    ) -> Result<(), BillioError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| BillioError::CacheError(format!("Failed to convert TTL: {}", e)))?;
        let mut cache = self.cache.write().await;
        cache.insert(group_snapshot_key(snapshot.group.id), (snapshot.clone(), Utc::now() + ttl));
        Ok(())
    }

    async fn invalidate_group(&self, group_id: GroupId) -> Result<(), BillioError> {
        let mut cache = self.cache.write().await;
        cache.remove(&group_snapshot_key(group_id));
        Ok(())
    }

    async fn clear(&self) -> Result<(), BillioError> {
        self.cache.write().await.clear();
        Ok(())
    }
}
