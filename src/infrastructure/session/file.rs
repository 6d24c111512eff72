use crate::auth::AuthToken;
use crate::core::errors::BillioError;
use crate::infrastructure::session::SessionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Serialize, Deserialize)]
struct StoredSession {
    token: AuthToken,
    saved_at: DateTime<Utc>,
}

/// Keeps the token in a small JSON file.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileSessionStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load_token(&self) -> Result<Option<AuthToken>, BillioError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BillioError::SessionStoreError(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        match serde_json::from_slice::<StoredSession>(&raw) {
            Ok(stored) => {
                debug!("Loaded session token saved at {}", stored.saved_at);
                Ok(Some(stored.token))
            }
            Err(e) => {
                // an unreadable file is as good as no session
                warn!("Ignoring corrupt session file {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save_token(&self, token: &AuthToken) -> Result<(), BillioError> {
        let stored = StoredSession {
            token: token.clone(),
            saved_at: Utc::now(),
        };
        let raw = serde_json::to_vec_pretty(&stored)
            .map_err(|e| BillioError::SessionStoreError(format!("Failed to encode session: {}", e)))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BillioError::SessionStoreError(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| BillioError::SessionStoreError(format!("Failed to write {}: {}", self.path.display(), e)))
    }

    async fn clear(&self) -> Result<(), BillioError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BillioError::SessionStoreError(format!(
                "Failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
