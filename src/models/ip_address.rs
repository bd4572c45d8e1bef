//! Normalized IPv4 / IPv6 address rows.
//!
//! Geolocation records keep the caller's IP string verbatim; the parsed,
//! canonical form lives in `ipv4_addresses` or `ipv6_addresses` and is linked
//! from `geolocation_data` through a unique nullable foreign key.

use std::net::IpAddr;

use serde::Serialize;
use uuid::Uuid;

/// Address family, selecting the table a normalized address lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn table(self) -> &'static str {
        match self {
            IpFamily::V4 => "ipv4_addresses",
            IpFamily::V6 => "ipv6_addresses",
        }
    }

    /// Column on `geolocation_data` that links to this family's table.
    pub fn link_column(self) -> &'static str {
        match self {
            IpFamily::V4 => "ipv4_id",
            IpFamily::V6 => "ipv6_id",
        }
    }

    pub(crate) fn address_constraint(self) -> &'static str {
        match self {
            IpFamily::V4 => "ipv4_addresses_address_key",
            IpFamily::V6 => "ipv6_addresses_address_key",
        }
    }
}

/// Row of `ipv4_addresses` or `ipv6_addresses`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct IpAddressRecord {
    pub id: Uuid,
    pub address: String,
}

/// Parse and canonicalize an IP string.
///
/// Returns `None` for anything that is not a literal IPv4 or IPv6 address.
/// IPv6 output uses the compressed lower-case form (`2001:db8::1`).
pub fn normalize(raw: &str) -> Option<(IpFamily, String)> {
    match raw.trim().parse::<IpAddr>().ok()? {
        IpAddr::V4(addr) => Some((IpFamily::V4, addr.to_string())),
        IpAddr::V6(addr) => Some((IpFamily::V6, addr.to_string())),
    }
}
