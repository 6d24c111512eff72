pub mod cache_keys;
pub mod in_memory;

use crate::core::errors::BillioError;
use crate::core::models::group::GroupId;
use crate::core::services::GroupSnapshot;
use async_trait::async_trait;

/// Last known state of each group, served when the backend is unreachable.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_group_snapshot(&self, group_id: GroupId) -> Result<Option<GroupSnapshot>, BillioError>;
    async fn save_group_snapshot(
        &self,
        snapshot: &GroupSnapshot,
        ttl: std::time::Duration,
    ) -> Result<(), BillioError>;
    async fn invalidate_group(&self, group_id: GroupId) -> Result<(), BillioError>;
    async fn clear(&self) -> Result<(), BillioError>;
}
