//! Request audit log model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One lookup made by a user.
///
/// # Database Table
///
/// Maps to the `requests` table. Rows are append-only and are removed only
/// when the owning user is deleted.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct RequestRecord {
    pub id: Uuid,

    /// User who made the request
    pub user_id: Uuid,

    /// Source IP address of the caller
    pub ip_address: String,

    pub requested_at: DateTime<Utc>,

    /// Response returned to the caller, stored as JSONB
    pub response: serde_json::Value,
}

/// Payload for appending a request to the log.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub user_id: Uuid,
    pub ip_address: String,
    pub response: serde_json::Value,
}
