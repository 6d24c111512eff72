use super::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the client-side activity trail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppLog {
    pub id: String,
    pub action: String,
    pub user_id: Option<UserId>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}
