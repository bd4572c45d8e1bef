//! Geolocation lookups against the shared cache.

use crate::{error::StoreError, models::geolocation::GeolocationData, store::Store};

/// Fetch the cached record for one IP string.
///
/// # Errors
///
/// `NotFound` when the address has never been resolved.
pub async fn lookup_geolocation<S: Store + ?Sized>(
    store: &S,
    ip_address: &str,
) -> Result<GeolocationData, StoreError> {
    store.get_geolocation(ip_address).await
}

/// Fetch cached records for several IP strings.
///
/// Addresses with no record are skipped; the rest keep the input order.
///
/// # Errors
///
/// `InvalidInput` when `ip_addresses` is empty.
pub async fn lookup_geolocations<S: Store + ?Sized>(
    store: &S,
    ip_addresses: &[String],
) -> Result<Vec<GeolocationData>, StoreError> {
    if ip_addresses.is_empty() {
        return Err(StoreError::InvalidInput(
            "No IP addresses provided.".to_string(),
        ));
    }
    store.find_geolocations(ip_addresses).await
}
