//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the payloads used to create and change them.

/// API key credential model
pub mod api_key;
/// Geolocation cache records
pub mod geolocation;
/// Normalized IPv4 / IPv6 address rows
pub mod ip_address;
/// Rate limit rules
pub mod rate_limit;
/// Request audit log
pub mod request;
/// Users and their roles
pub mod user;
