//! User and role models.
//!
//! A user is the root owner of API keys and request logs. Every user belongs
//! to exactly one role; a role cannot be removed while users reference it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table. Each user:
/// - Has a unique email address
/// - References one row of `user_roles` (deletion of that role is blocked)
/// - Owns API keys and requests, which are deleted along with the user
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct User {
    /// Unique identifier for this user
    pub id: Uuid,

    /// Email address, unique across all users
    pub email: String,

    /// Password hash produced by the caller; never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Foreign key to the role this user holds
    pub role_id: Uuid,

    /// Timestamp when the user registered
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last change to this row
    pub updated_at: DateTime<Utc>,
}

/// Payload for registering a new user.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role_id: Uuid,
}

/// Partial update for an existing user.
///
/// `None` leaves the column untouched. Any applied change refreshes
/// `updated_at`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserChanges {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role_id: Option<Uuid>,
}

/// Named role, unique by `role_name`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserRole {
    pub id: Uuid,
    pub role_name: String,
}

/// Rows removed by a cascading user delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UserDeletion {
    pub api_keys: u64,
    pub requests: u64,
}
