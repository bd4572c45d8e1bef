//! In-process storage engine.
//!
//! Tables live in hash maps behind one `tokio::sync::RwLock`. Every write
//! checks its constraints and applies its changes under a single write guard,
//! which makes each operation atomic. Constraint names match the migration,
//! so callers see identical errors from both engines.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Store, constraints};
use crate::{
    error::StoreError,
    models::{
        api_key::ApiKey,
        geolocation::{GeolocationData, GeolocationFields},
        ip_address::{self, IpAddressRecord, IpFamily},
        rate_limit::RateLimit,
        request::{NewRequest, RequestRecord},
        user::{NewUser, User, UserChanges, UserDeletion, UserRole},
    },
};

/// Current time at the database's microsecond resolution.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Next `updated_at` for a row last touched at `previous`; always later.
fn touch(previous: DateTime<Utc>) -> DateTime<Utc> {
    let current = now();
    if current > previous {
        current
    } else {
        previous + TimeDelta::microseconds(1)
    }
}

#[derive(Debug, Default)]
struct Tables {
    roles: HashMap<Uuid, UserRole>,
    users: HashMap<Uuid, User>,
    api_keys: HashMap<Uuid, ApiKey>,
    // Insertion order doubles as time order
    requests: Vec<RequestRecord>,
    // Keyed by the raw ip string
    geolocations: HashMap<String, GeolocationData>,
    // Keyed by canonical address
    ipv4_addresses: HashMap<String, IpAddressRecord>,
    ipv6_addresses: HashMap<String, IpAddressRecord>,
    rate_limits: HashMap<String, RateLimit>,
}

impl Tables {
    fn addresses_mut(&mut self, family: IpFamily) -> &mut HashMap<String, IpAddressRecord> {
        match family {
            IpFamily::V4 => &mut self.ipv4_addresses,
            IpFamily::V6 => &mut self.ipv6_addresses,
        }
    }

    fn addresses(&self, family: IpFamily) -> &HashMap<String, IpAddressRecord> {
        match family {
            IpFamily::V4 => &self.ipv4_addresses,
            IpFamily::V6 => &self.ipv6_addresses,
        }
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|user| user.email == email && Some(user.id) != except)
    }

    /// Same contract as the Postgres `link_address`.
    fn link_address(&mut self, ip_address: &str) -> (Option<Uuid>, Option<Uuid>) {
        let Some((family, canonical)) = ip_address::normalize(ip_address) else {
            return (None, None);
        };

        let address_id = self
            .addresses_mut(family)
            .entry(canonical.clone())
            .or_insert_with(|| IpAddressRecord {
                id: Uuid::new_v4(),
                address: canonical.clone(),
            })
            .id;

        let taken = self.geolocations.values().any(|geo| {
            let link = match family {
                IpFamily::V4 => geo.ipv4_id,
                IpFamily::V6 => geo.ipv6_id,
            };
            link == Some(address_id) && geo.ip_address != ip_address
        });

        if taken {
            debug!(ip = ip_address, address = %canonical, "Address already linked elsewhere");
            return (None, None);
        }

        match family {
            IpFamily::V4 => (Some(address_id), None),
            IpFamily::V6 => (None, Some(address_id)),
        }
    }
}

/// Store that keeps every table in memory.
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate_rate_limit(limit: i32, window_sec: i32) -> Result<(), StoreError> {
    if limit <= 0 {
        return Err(StoreError::InvalidInput(
            "check failed: rate_limits_limit_positive".to_string(),
        ));
    }
    if window_sec <= 0 {
        return Err(StoreError::InvalidInput(
            "check failed: rate_limits_window_positive".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_role(&self, role_name: &str) -> Result<UserRole, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.roles.values().any(|role| role.role_name == role_name) {
            return Err(StoreError::unique(constraints::ROLE_NAME_UNIQUE));
        }

        let role = UserRole {
            id: Uuid::new_v4(),
            role_name: role_name.to_string(),
        };
        tables.roles.insert(role.id, role.clone());

        info!(role_id = %role.id, role_name, "Role created");
        Ok(role)
    }

    async fn get_role(&self, id: Uuid) -> Result<UserRole, StoreError> {
        let tables = self.tables.read().await;
        tables
            .roles
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user_role", id))
    }

    async fn find_role_by_name(&self, role_name: &str) -> Result<Option<UserRole>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .roles
            .values()
            .find(|role| role.role_name == role_name)
            .cloned())
    }

    async fn delete_role(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        if !tables.roles.contains_key(&id) {
            return Err(StoreError::not_found("user_role", id));
        }
        if tables.users.values().any(|user| user.role_id == id) {
            return Err(StoreError::foreign_key(constraints::USER_ROLE_FK));
        }

        tables.roles.remove(&id);
        info!(role_id = %id, "Role deleted");
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.email_taken(&user.email, None) {
            return Err(StoreError::unique(constraints::USER_EMAIL_UNIQUE));
        }
        if !tables.roles.contains_key(&user.role_id) {
            return Err(StoreError::foreign_key(constraints::USER_ROLE_FK));
        }

        let created_at = now();
        let user = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            role_id: user.role_id,
            created_at,
            updated_at: created_at,
        };
        tables.users.insert(user.id, user.clone());

        info!(user_id = %user.id, "User created");
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|user| user.email == email).cloned())
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&id) {
            return Err(StoreError::not_found("user", id));
        }
        if let Some(ref email) = changes.email {
            if tables.email_taken(email, Some(id)) {
                return Err(StoreError::unique(constraints::USER_EMAIL_UNIQUE));
            }
        }
        if let Some(role_id) = changes.role_id {
            if !tables.roles.contains_key(&role_id) {
                return Err(StoreError::foreign_key(constraints::USER_ROLE_FK));
            }
        }

        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("user", id))?;
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(password_hash) = changes.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(role_id) = changes.role_id {
            user.role_id = role_id;
        }
        user.updated_at = touch(user.updated_at);

        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<UserDeletion, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.users.remove(&id).is_none() {
            return Err(StoreError::not_found("user", id));
        }

        let keys_before = tables.api_keys.len();
        tables.api_keys.retain(|_, key| key.user_id != id);
        let api_keys = (keys_before - tables.api_keys.len()) as u64;

        let requests_before = tables.requests.len();
        tables.requests.retain(|request| request.user_id != id);
        let requests = (requests_before - tables.requests.len()) as u64;

        info!(user_id = %id, api_keys, requests, "User deleted");
        Ok(UserDeletion { api_keys, requests })
    }

    async fn insert_api_key(&self, user_id: Uuid, key: &str) -> Result<ApiKey, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.api_keys.values().any(|existing| existing.key == key) {
            return Err(StoreError::unique(constraints::API_KEY_UNIQUE));
        }
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::foreign_key(constraints::API_KEY_USER_FK));
        }

        let created_at = now();
        let api_key = ApiKey {
            id: Uuid::new_v4(),
            user_id,
            key: key.to_string(),
            active: true,
            created_at,
            updated_at: created_at,
        };
        tables.api_keys.insert(api_key.id, api_key.clone());

        info!(api_key_id = %api_key.id, %user_id, "API key issued");
        Ok(api_key)
    }

    async fn get_api_key(&self, id: Uuid) -> Result<ApiKey, StoreError> {
        let tables = self.tables.read().await;
        tables
            .api_keys
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("api_key", id))
    }

    async fn find_api_key(&self, key: &str) -> Result<Option<ApiKey>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .api_keys
            .values()
            .find(|existing| existing.key == key)
            .cloned())
    }

    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>, StoreError> {
        let tables = self.tables.read().await;
        let mut keys: Vec<ApiKey> = tables
            .api_keys
            .values()
            .filter(|key| key.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by_key(|key| key.created_at);
        Ok(keys)
    }

    async fn set_api_key_active(&self, id: Uuid, active: bool) -> Result<ApiKey, StoreError> {
        let mut tables = self.tables.write().await;

        let api_key = tables
            .api_keys
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("api_key", id))?;
        api_key.active = active;
        api_key.updated_at = touch(api_key.updated_at);

        info!(api_key_id = %id, active, "API key activation changed");
        Ok(api_key.clone())
    }

    async fn record_request(&self, request: NewRequest) -> Result<RequestRecord, StoreError> {
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&request.user_id) {
            return Err(StoreError::foreign_key(constraints::REQUEST_USER_FK));
        }

        let record = RequestRecord {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            ip_address: request.ip_address,
            requested_at: now(),
            response: request.response,
        };
        tables.requests.push(record.clone());

        debug!(request_id = %record.id, user_id = %record.user_id, "Request recorded");
        Ok(record)
    }

    async fn list_requests(&self, user_id: Uuid) -> Result<Vec<RequestRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .requests
            .iter()
            .rev()
            .filter(|request| request.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_geolocation(
        &self,
        ip_address: &str,
        fields: GeolocationFields,
    ) -> Result<GeolocationData, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.geolocations.contains_key(ip_address) {
            return Err(StoreError::unique(constraints::GEOLOCATION_IP_UNIQUE));
        }

        let (ipv4_id, ipv6_id) = tables.link_address(ip_address);
        let created_at = now();
        let record = GeolocationData {
            id: Uuid::new_v4(),
            ip_address: ip_address.to_string(),
            country: fields.country,
            city: fields.city,
            latitude: fields.latitude,
            longitude: fields.longitude,
            isp: fields.isp,
            ipv4_id,
            ipv6_id,
            created_at,
            updated_at: created_at,
        };
        tables
            .geolocations
            .insert(record.ip_address.clone(), record.clone());

        debug!(ip = ip_address, upsert = false, "Geolocation stored");
        Ok(record)
    }

    async fn upsert_geolocation(
        &self,
        ip_address: &str,
        fields: GeolocationFields,
    ) -> Result<GeolocationData, StoreError> {
        let mut tables = self.tables.write().await;

        let (ipv4_id, ipv6_id) = tables.link_address(ip_address);
        let record = match tables.geolocations.get_mut(ip_address) {
            Some(existing) => {
                existing.country = fields.country;
                existing.city = fields.city;
                existing.latitude = fields.latitude;
                existing.longitude = fields.longitude;
                existing.isp = fields.isp;
                existing.ipv4_id = ipv4_id;
                existing.ipv6_id = ipv6_id;
                existing.updated_at = touch(existing.updated_at);
                existing.clone()
            }
            None => {
                let created_at = now();
                let record = GeolocationData {
                    id: Uuid::new_v4(),
                    ip_address: ip_address.to_string(),
                    country: fields.country,
                    city: fields.city,
                    latitude: fields.latitude,
                    longitude: fields.longitude,
                    isp: fields.isp,
                    ipv4_id,
                    ipv6_id,
                    created_at,
                    updated_at: created_at,
                };
                tables
                    .geolocations
                    .insert(record.ip_address.clone(), record.clone());
                record
            }
        };

        debug!(ip = ip_address, upsert = true, "Geolocation stored");
        Ok(record)
    }

    async fn get_geolocation(&self, ip_address: &str) -> Result<GeolocationData, StoreError> {
        let tables = self.tables.read().await;
        tables
            .geolocations
            .get(ip_address)
            .cloned()
            .ok_or_else(|| StoreError::not_found("geolocation_data", ip_address))
    }

    async fn find_geolocations(
        &self,
        ip_addresses: &[String],
    ) -> Result<Vec<GeolocationData>, StoreError> {
        let tables = self.tables.read().await;
        Ok(ip_addresses
            .iter()
            .filter_map(|ip| tables.geolocations.get(ip).cloned())
            .collect())
    }

    async fn find_ip_address(
        &self,
        family: IpFamily,
        address: &str,
    ) -> Result<Option<IpAddressRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.addresses(family).get(address).cloned())
    }

    async fn upsert_rate_limit(
        &self,
        key: &str,
        limit: i32,
        window_sec: i32,
    ) -> Result<RateLimit, StoreError> {
        validate_rate_limit(limit, window_sec)?;
        let mut tables = self.tables.write().await;

        let rate_limit = match tables.rate_limits.get_mut(key) {
            Some(existing) => {
                existing.limit = limit;
                existing.window_sec = window_sec;
                existing.updated_at = touch(existing.updated_at);
                existing.clone()
            }
            None => {
                let created_at = now();
                let rate_limit = RateLimit {
                    id: Uuid::new_v4(),
                    key: key.to_string(),
                    limit,
                    window_sec,
                    created_at,
                    updated_at: created_at,
                };
                tables.rate_limits.insert(key.to_string(), rate_limit.clone());
                rate_limit
            }
        };

        info!(key, limit, window_sec, "Rate limit stored");
        Ok(rate_limit)
    }

    async fn get_rate_limit(&self, key: &str) -> Result<Option<RateLimit>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.rate_limits.get(key).cloned())
    }

    async fn delete_rate_limit(&self, key: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .rate_limits
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("rate_limit", key))
    }
}
