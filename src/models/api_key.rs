//! API key model for authentication.
//!
//! API keys are credentials issued to users. Each key string is a random
//! 128-bit token rendered as 32 hex characters.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `user_id`: Owning user; the key is deleted along with the user
/// - `key`: The credential string, unique across all keys
/// - `active`: Whether the key is currently valid
/// - `created_at` / `updated_at`: Row timestamps
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct ApiKey {
    /// Unique identifier for this API key
    pub id: Uuid,

    /// User that owns this key
    pub user_id: Uuid,

    /// The credential presented by clients
    pub key: String,

    /// Whether this API key is currently active
    ///
    /// Inactive keys fail verification. This provides a way to revoke access
    /// without deleting the record.
    pub active: bool,

    /// Timestamp when this API key was issued
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last activation change
    pub updated_at: DateTime<Utc>,
}

/// Generate a fresh key string from 16 random bytes.
pub fn generate_key() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}
