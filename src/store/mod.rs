//! Storage contract for the geolocation schema.
//!
//! `Store` is the only interface external collaborators (an HTTP layer, a
//! rate limiter, a provider importer) use to read and write rows. Two engines
//! implement it:
//!
//! - [`PgStore`]: PostgreSQL, constraints enforced by the migration schema
//! - [`MemoryStore`]: in-process tables behind one lock, same constraint names
//!
//! # Atomicity
//!
//! Every method is a single atomic operation. Cascading and multi-row writes
//! (user delete, geolocation upsert with address linking) run in one
//! transaction on `PgStore` and under one write guard on `MemoryStore`.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    api_key::{self, ApiKey},
    geolocation::{GeolocationData, GeolocationFields},
    ip_address::{IpAddressRecord, IpFamily},
    rate_limit::RateLimit,
    request::{NewRequest, RequestRecord},
    user::{NewUser, User, UserChanges, UserDeletion, UserRole},
};

/// Constraint names shared by the migration and the in-memory engine.
pub mod constraints {
    pub const ROLE_NAME_UNIQUE: &str = "user_roles_role_name_key";
    pub const USER_EMAIL_UNIQUE: &str = "users_email_key";
    pub const USER_ROLE_FK: &str = "users_role_id_fkey";
    pub const API_KEY_UNIQUE: &str = "api_keys_key_key";
    pub const API_KEY_USER_FK: &str = "api_keys_user_id_fkey";
    pub const REQUEST_USER_FK: &str = "requests_user_id_fkey";
    pub const GEOLOCATION_IP_UNIQUE: &str = "geolocation_data_ip_address_key";
    pub const RATE_LIMIT_KEY_UNIQUE: &str = "rate_limits_key_key";
}

#[async_trait]
pub trait Store: Send + Sync {
    // Roles

    async fn create_role(&self, role_name: &str) -> Result<UserRole, StoreError>;

    async fn get_role(&self, id: Uuid) -> Result<UserRole, StoreError>;

    async fn find_role_by_name(&self, role_name: &str) -> Result<Option<UserRole>, StoreError>;

    /// Delete a role.
    ///
    /// # Errors
    ///
    /// - `ForeignKeyViolation` while any user still references the role
    /// - `NotFound` if the role does not exist
    async fn delete_role(&self, id: Uuid) -> Result<(), StoreError>;

    // Users

    /// Register a user.
    ///
    /// # Errors
    ///
    /// - `UniquenessViolation` if the email is taken
    /// - `ForeignKeyViolation` if `role_id` names no role
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Apply a partial update, refreshing `updated_at`.
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError>;

    /// Delete a user together with all of its API keys and requests.
    async fn delete_user(&self, id: Uuid) -> Result<UserDeletion, StoreError>;

    // API keys

    /// Store an API key with a caller-chosen key string.
    async fn insert_api_key(&self, user_id: Uuid, key: &str) -> Result<ApiKey, StoreError>;

    /// Issue an API key with a freshly generated key string.
    ///
    /// A key collision surfaces as `UniquenessViolation` on
    /// [`constraints::API_KEY_UNIQUE`]; `services::api_key_service::issue_api_key`
    /// retries those.
    async fn create_api_key(&self, user_id: Uuid) -> Result<ApiKey, StoreError> {
        self.insert_api_key(user_id, &api_key::generate_key()).await
    }

    async fn get_api_key(&self, id: Uuid) -> Result<ApiKey, StoreError>;

    async fn find_api_key(&self, key: &str) -> Result<Option<ApiKey>, StoreError>;

    /// Keys owned by a user, oldest first.
    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>, StoreError>;

    async fn set_api_key_active(&self, id: Uuid, active: bool) -> Result<ApiKey, StoreError>;

    // Requests

    /// Append a request to the audit log.
    async fn record_request(&self, request: NewRequest) -> Result<RequestRecord, StoreError>;

    /// Requests made by a user, newest first.
    async fn list_requests(&self, user_id: Uuid) -> Result<Vec<RequestRecord>, StoreError>;

    // Geolocation

    /// Insert a geolocation record, failing on a duplicate IP string.
    async fn insert_geolocation(
        &self,
        ip_address: &str,
        fields: GeolocationFields,
    ) -> Result<GeolocationData, StoreError>;

    /// Insert a geolocation record, or overwrite the fields of the existing one.
    ///
    /// `created_at` never changes; `updated_at` strictly increases on update.
    async fn upsert_geolocation(
        &self,
        ip_address: &str,
        fields: GeolocationFields,
    ) -> Result<GeolocationData, StoreError>;

    async fn get_geolocation(&self, ip_address: &str) -> Result<GeolocationData, StoreError>;

    /// Records for the given IP strings in input order; unknown IPs are skipped.
    async fn find_geolocations(
        &self,
        ip_addresses: &[String],
    ) -> Result<Vec<GeolocationData>, StoreError>;

    /// Look up a normalized address row by its canonical string.
    async fn find_ip_address(
        &self,
        family: IpFamily,
        address: &str,
    ) -> Result<Option<IpAddressRecord>, StoreError>;

    // Rate limits

    async fn upsert_rate_limit(
        &self,
        key: &str,
        limit: i32,
        window_sec: i32,
    ) -> Result<RateLimit, StoreError>;

    async fn get_rate_limit(&self, key: &str) -> Result<Option<RateLimit>, StoreError>;

    async fn delete_rate_limit(&self, key: &str) -> Result<(), StoreError>;
}
