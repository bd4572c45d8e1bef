//! Rate limit rule model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Administrative rate limit rule.
///
/// # Database Table
///
/// Maps to the `rate_limits` table. `key` is unique and usually names a user
/// id or an API key. The `limit` column is stored as `request_limit` since
/// `LIMIT` is an SQL keyword.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct RateLimit {
    pub id: Uuid,

    pub key: String,

    /// Requests allowed per window
    #[sqlx(rename = "request_limit")]
    pub limit: i32,

    /// Window length in seconds
    pub window_sec: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
