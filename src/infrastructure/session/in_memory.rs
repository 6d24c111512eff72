use crate::auth::AuthToken;
use crate::core::errors::BillioError;
use crate::infrastructure::session::SessionStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    token: Arc<RwLock<Option<AuthToken>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        InMemorySessionStore::default()
    }

    pub fn with_token(token: AuthToken) -> Self {
        InMemorySessionStore {
            token: Arc::new(RwLock::new(Some(token))),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load_token(&self) -> Result<Option<AuthToken>, BillioError> {
        Ok(self.token.read().await.clone())
    }

    async fn save_token(&self, token: &AuthToken) -> Result<(), BillioError> {
        *self.token.write().await = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), BillioError> {
        *self.token.write().await = None;
        Ok(())
    }
}
