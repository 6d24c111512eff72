use crate::core::errors::BillioError;
use crate::core::models::user::UserProfile;
use crate::infrastructure::session::SessionStore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Opaque bearer token handed out by the backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Result<Self, BillioError> {
        let token = token.into();
        if token.trim().is_empty() || token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(BillioError::InvalidResponse("malformed auth token".to_string()));
        }
        Ok(AuthToken(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header, e.g. `Token abc123`.
    pub fn header_value(&self, scheme: &str) -> String {
        format!("{} {}", scheme, self.0)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// A logged-in user and the token their requests carry.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub token: AuthToken,
    pub user: UserProfile,
}

/// Owns the current session and keeps the durable token store in step with it.
///
/// Login, registration and restore begin a session; logout and any
/// authentication failure end it.
pub struct SessionContext<S: SessionStore> {
    store: S,
    current: RwLock<Option<Session>>,
}

impl<S: SessionStore> SessionContext<S> {
    pub fn new(store: S) -> Self {
        SessionContext {
            store,
            current: RwLock::new(None),
        }
    }

    pub async fn stored_token(&self) -> Result<Option<AuthToken>, BillioError> {
        self.store.load_token().await
    }

    pub async fn begin(&self, session: Session) -> Result<(), BillioError> {
        self.store.save_token(&session.token).await?;
        info!("Session started for user {}", session.user.id);
        *self.current.write().await = Some(session);
        Ok(())
    }

    /// Adopts a session whose token is already in the store.
    pub async fn resume(&self, session: Session) {
        debug!("Session resumed for user {}", session.user.id);
        *self.current.write().await = Some(session);
    }

    pub async fn end(&self) -> Result<Option<Session>, BillioError> {
        let previous = self.current.write().await.take();
        self.store.clear().await?;
        if let Some(session) = &previous {
            info!("Session ended for user {}", session.user.id);
        }
        Ok(previous)
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    pub async fn require(&self) -> Result<Session, BillioError> {
        self.current().await.ok_or(BillioError::NotAuthenticated)
    }
}
