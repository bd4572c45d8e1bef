//! Geolocation cache models.
//!
//! One row per queried IP string. Every location attribute is optional since
//! a provider lookup may return partial data or fail outright.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a geolocation record from the database.
///
/// # Database Table
///
/// Maps to the `geolocation_data` table. Rows are shared by all users and
/// keyed by `ip_address`; they outlive any user that triggered the lookup.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct GeolocationData {
    pub id: Uuid,

    /// IP string exactly as supplied by the caller (unique)
    pub ip_address: String,

    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Internet service provider
    pub isp: Option<String>,

    /// Link to the normalized IPv4 row, unique when set
    pub ipv4_id: Option<Uuid>,

    /// Link to the normalized IPv6 row, unique when set
    pub ipv6_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,

    /// Refreshed on every upsert
    pub updated_at: DateTime<Utc>,
}

/// Mutable fields written by an insert or upsert.
///
/// On upsert every field replaces the stored value, including `None`: the
/// newest provider answer wins.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeolocationFields {
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub isp: Option<String>,
}
