pub mod file;
pub mod in_memory;

use crate::auth::AuthToken;
use crate::core::errors::BillioError;
use async_trait::async_trait;

/// Durable home of the session token between runs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_token(&self) -> Result<Option<AuthToken>, BillioError>;
    async fn save_token(&self, token: &AuthToken) -> Result<(), BillioError>;
    async fn clear(&self) -> Result<(), BillioError>;
}
