//! API key service - issuing and verifying credentials.
//!
//! This service handles:
//! - Issuing keys, retrying when a generated key collides with an existing one
//! - Classifying a presented key as valid, inactive, or unknown

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::api_key::{self, ApiKey},
    store::{Store, constraints},
};

/// Attempts made before a run of key collisions is reported to the caller.
pub const MAX_ISSUE_ATTEMPTS: usize = 5;

/// Outcome of checking a presented API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyVerification {
    Valid,
    Inactive,
    Unknown,
}

impl KeyVerification {
    pub fn is_valid(self) -> bool {
        self == KeyVerification::Valid
    }

    pub fn message(self) -> &'static str {
        match self {
            KeyVerification::Valid => "API key is valid and active.",
            KeyVerification::Inactive => "API key is inactive.",
            KeyVerification::Unknown => "API key does not exist.",
        }
    }
}

/// Issue a new API key for `user_id`.
///
/// # Errors
///
/// - `ForeignKeyViolation`: the user does not exist
/// - `UniquenessViolation`: every attempt collided (practically unreachable
///   with 128-bit keys)
pub async fn issue_api_key<S: Store + ?Sized>(
    store: &S,
    user_id: Uuid,
) -> Result<ApiKey, StoreError> {
    issue_api_key_with(store, user_id, api_key::generate_key).await
}

/// Issue a key using `generate` for each candidate key string.
pub async fn issue_api_key_with<S, F>(
    store: &S,
    user_id: Uuid,
    mut generate: F,
) -> Result<ApiKey, StoreError>
where
    S: Store + ?Sized,
    F: FnMut() -> String,
{
    let mut attempt = 1;
    loop {
        let candidate = generate();
        match store.insert_api_key(user_id, &candidate).await {
            Err(err)
                if err.is_unique_violation_on(constraints::API_KEY_UNIQUE)
                    && attempt < MAX_ISSUE_ATTEMPTS =>
            {
                warn!(%user_id, attempt, "Generated API key collided, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Check whether `key` exists and is active.
pub async fn verify_api_key<S: Store + ?Sized>(
    store: &S,
    key: &str,
) -> Result<KeyVerification, StoreError> {
    let verification = match store.find_api_key(key).await? {
        None => KeyVerification::Unknown,
        Some(record) if !record.active => KeyVerification::Inactive,
        Some(_) => KeyVerification::Valid,
    };
    Ok(verification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::NewUser;
    use crate::store::MemoryStore;

    async fn store_with_user() -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let role = store.create_role("user").await.unwrap();
        let user = store
            .create_user(NewUser {
                email: "owner@example.com".into(),
                password_hash: "hash".into(),
                role_id: role.id,
            })
            .await
            .unwrap();
        (store, user.id)
    }

    #[tokio::test]
    async fn collision_is_retried_with_a_new_key() {
        let (store, user_id) = store_with_user().await;
        store.insert_api_key(user_id, "taken").await.unwrap();

        let mut candidates = vec!["fresh".to_string(), "taken".to_string()];
        let key = issue_api_key_with(&store, user_id, || candidates.pop().unwrap())
            .await
            .unwrap();

        assert_eq!(key.key, "fresh");
        assert!(key.active);
    }

    #[tokio::test]
    async fn retries_stop_after_max_attempts() {
        let (store, user_id) = store_with_user().await;
        store.insert_api_key(user_id, "taken").await.unwrap();

        let mut calls = 0;
        let err = issue_api_key_with(&store, user_id, || {
            calls += 1;
            "taken".to_string()
        })
        .await
        .unwrap_err();

        assert!(err.is_unique_violation_on(constraints::API_KEY_UNIQUE));
        assert_eq!(calls, MAX_ISSUE_ATTEMPTS);
    }

    #[tokio::test]
    async fn unknown_user_is_not_retried() {
        let store = MemoryStore::new();
        let err = issue_api_key(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_foreign_key_violation());
    }

    #[tokio::test]
    async fn verification_tracks_activation() {
        let (store, user_id) = store_with_user().await;
        let key = issue_api_key(&store, user_id).await.unwrap();

        let state = verify_api_key(&store, &key.key).await.unwrap();
        assert!(state.is_valid());
        assert_eq!(state.message(), "API key is valid and active.");

        store.set_api_key_active(key.id, false).await.unwrap();
        assert_eq!(
            verify_api_key(&store, &key.key).await.unwrap(),
            KeyVerification::Inactive
        );

        assert_eq!(
            verify_api_key(&store, "no-such-key").await.unwrap(),
            KeyVerification::Unknown
        );
    }
}
