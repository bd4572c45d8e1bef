//! Operations layered on top of the storage contract.
//!
//! Services hold the small amount of logic that sits above single-row
//! storage calls: retrying key collisions, classifying key state, applying
//! rate limit defaults, and validating bulk lookups. Every function is
//! generic over [`Store`](crate::store::Store), so it runs against either
//! engine.

pub mod api_key_service;
pub mod geolocation_service;
pub mod rate_limit_service;
