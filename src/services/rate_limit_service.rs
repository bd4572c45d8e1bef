//! Rate limit rules with configured fallbacks.

use serde::Serialize;
use tracing::debug;

use crate::{error::StoreError, models::rate_limit::RateLimit, store::Store};

/// Rule applied to keys with no stored rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDefaults {
    pub limit: i32,
    pub window_sec: i32,
}

impl Default for RateLimitDefaults {
    fn default() -> Self {
        Self {
            limit: 100,
            window_sec: 3600,
        }
    }
}

/// Whether an effective rule was stored or fell back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitSource {
    Stored,
    Default,
}

/// The rule a rate limiter should enforce for one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveRateLimit {
    pub key: String,
    pub limit: i32,
    pub window_sec: i32,
    pub source: RateLimitSource,
}

impl From<RateLimit> for EffectiveRateLimit {
    fn from(rule: RateLimit) -> Self {
        Self {
            key: rule.key,
            limit: rule.limit,
            window_sec: rule.window_sec,
            source: RateLimitSource::Stored,
        }
    }
}

/// Resolve the rule for `key`, falling back to `defaults`.
pub async fn effective_rate_limit<S: Store + ?Sized>(
    store: &S,
    key: &str,
    defaults: RateLimitDefaults,
) -> Result<EffectiveRateLimit, StoreError> {
    match store.get_rate_limit(key).await? {
        Some(rule) => Ok(rule.into()),
        None => {
            debug!(key, "No stored rate limit, using defaults");
            Ok(EffectiveRateLimit {
                key: key.to_string(),
                limit: defaults.limit,
                window_sec: defaults.window_sec,
                source: RateLimitSource::Default,
            })
        }
    }
}

/// Create or replace the rule for `key`.
///
/// # Errors
///
/// `InvalidInput` if `limit` or `window_sec` is not positive.
pub async fn update_rate_limit<S: Store + ?Sized>(
    store: &S,
    key: &str,
    limit: i32,
    window_sec: i32,
) -> Result<RateLimit, StoreError> {
    if limit <= 0 {
        return Err(StoreError::InvalidInput(
            "limit must be positive".to_string(),
        ));
    }
    if window_sec <= 0 {
        return Err(StoreError::InvalidInput(
            "window_sec must be positive".to_string(),
        ));
    }
    store.upsert_rate_limit(key, limit, window_sec).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn missing_rule_falls_back_to_defaults() {
        let store = MemoryStore::new();
        let rule = effective_rate_limit(&store, "user-1", RateLimitDefaults::default())
            .await
            .unwrap();

        assert_eq!(rule.limit, 100);
        assert_eq!(rule.window_sec, 3600);
        assert_eq!(rule.source, RateLimitSource::Default);
    }

    #[tokio::test]
    async fn stored_rule_wins_and_updates_in_place() {
        let store = MemoryStore::new();
        let first = update_rate_limit(&store, "user-1", 10, 60).await.unwrap();
        let second = update_rate_limit(&store, "user-1", 20, 120).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at > first.updated_at);

        let rule = effective_rate_limit(&store, "user-1", RateLimitDefaults::default())
            .await
            .unwrap();
        assert_eq!((rule.limit, rule.window_sec), (20, 120));
        assert_eq!(rule.source, RateLimitSource::Stored);
    }

    #[tokio::test]
    async fn zero_window_is_rejected() {
        let store = MemoryStore::new();
        let err = update_rate_limit(&store, "user-1", 10, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
        assert!(store.get_rate_limit("user-1").await.unwrap().is_none());
    }
}
