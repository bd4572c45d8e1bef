//! PostgreSQL storage engine.
//!
//! Uniqueness and referential integrity are enforced by the schema in
//! `migrations/`; this module issues the statements and lets
//! `From<sqlx::Error> for StoreError` classify constraint failures.
//!
//! # Timestamps
//!
//! `created_at` and `updated_at` default to `NOW()` in the same statement, so
//! they are equal on insert. Updates set
//! `updated_at = GREATEST(NOW(), updated_at + 1µs)`, which keeps the column
//! strictly increasing even when two writes share a transaction timestamp.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::Store;
use crate::{
    db::DbPool,
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

const INSERT_GEOLOCATION: &str = r#"
    INSERT INTO geolocation_data (
        id, ip_address, country, city, latitude, longitude, isp, ipv4_id, ipv6_id
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
"#;

/// Store backed by a PostgreSQL connection pool.
///
/// Cloning is cheap; clones share the pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Write a geolocation row inside one transaction, linking its address first.
    async fn write_geolocation(
        &self,
        ip_address: &str,
        fields: GeolocationFields,
        upsert: bool,
    ) -> Result<GeolocationData, StoreError> {
        let mut tx = self.pool.begin().await?;

        let (ipv4_id, ipv6_id) = link_address(&mut tx, ip_address).await?;

        let sql = if upsert {
            format!(
                r#"{INSERT_GEOLOCATION}
                ON CONFLICT (ip_address) DO UPDATE SET
                    country = EXCLUDED.country,
                    city = EXCLUDED.city,
                    latitude = EXCLUDED.latitude,
                    longitude = EXCLUDED.longitude,
                    isp = EXCLUDED.isp,
                    ipv4_id = EXCLUDED.ipv4_id,
                    ipv6_id = EXCLUDED.ipv6_id,
                    updated_at = GREATEST(NOW(), geolocation_data.updated_at + INTERVAL '1 microsecond')
                RETURNING *"#
            )
        } else {
            format!("{INSERT_GEOLOCATION} RETURNING *")
        };

        let record = sqlx::query_as::<_, GeolocationData>(&sql)
            .bind(Uuid::new_v4())
            .bind(ip_address)
            .bind(fields.country)
            .bind(fields.city)
            .bind(fields.latitude)
            .bind(fields.longitude)
            .bind(fields.isp)
            .bind(ipv4_id)
            .bind(ipv6_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(ip = %record.ip_address, upsert, "Geolocation stored");
        Ok(record)
    }
}

/// Find or create the normalized address row for `ip_address`.
///
/// Returns `(ipv4_id, ipv6_id)`. Both are `None` when the string is not an IP
/// literal, or when another geolocation row already owns the link (two raw
/// strings can share one canonical form).
async fn link_address(
    tx: &mut Transaction<'_, Postgres>,
    ip_address: &str,
) -> Result<(Option<Uuid>, Option<Uuid>), StoreError> {
    let Some((family, canonical)) = ip_address::normalize(ip_address) else {
        return Ok((None, None));
    };

    // No-op update so RETURNING yields the id on conflict too
    let address_id: Uuid = sqlx::query_scalar(&format!(
        "INSERT INTO {} (id, address) VALUES ($1, $2)
         ON CONFLICT (address) DO UPDATE SET address = EXCLUDED.address
         RETURNING id",
        family.table()
    ))
    .bind(Uuid::new_v4())
    .bind(&canonical)
    .fetch_one(&mut **tx)
    .await?;

    let taken: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS(SELECT 1 FROM geolocation_data WHERE {} = $1 AND ip_address <> $2)",
        family.link_column()
    ))
    .bind(address_id)
    .bind(ip_address)
    .fetch_one(&mut **tx)
    .await?;

    if taken {
        debug!(ip = ip_address, address = %canonical, "Address already linked elsewhere");
        return Ok((None, None));
    }

    Ok(match family {
        IpFamily::V4 => (Some(address_id), None),
        IpFamily::V6 => (None, Some(address_id)),
    })
}

#[async_trait]
impl Store for PgStore {
    async fn create_role(&self, role_name: &str) -> Result<UserRole, StoreError> {
        let role = sqlx::query_as::<_, UserRole>(
            "INSERT INTO user_roles (id, role_name) VALUES ($1, $2) RETURNING id, role_name",
        )
        .bind(Uuid::new_v4())
        .bind(role_name)
        .fetch_one(&self.pool)
        .await?;

        info!(role_id = %role.id, role_name, "Role created");
        Ok(role)
    }

    async fn get_role(&self, id: Uuid) -> Result<UserRole, StoreError> {
        sqlx::query_as::<_, UserRole>("SELECT id, role_name FROM user_roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("user_role", id))
    }

    async fn find_role_by_name(&self, role_name: &str) -> Result<Option<UserRole>, StoreError> {
        let role =
            sqlx::query_as::<_, UserRole>("SELECT id, role_name FROM user_roles WHERE role_name = $1")
                .bind(role_name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(role)
    }

    async fn delete_role(&self, id: Uuid) -> Result<(), StoreError> {
        // ON DELETE RESTRICT on users.role_id raises 23503 while referenced
        let deleted = sqlx::query("DELETE FROM user_roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::not_found("user_role", id));
        }

        info!(role_id = %id, "Role deleted");
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, role_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.role_id)
        .fetch_one(&self.pool)
        .await?;

        info!(user_id = %user.id, "User created");
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash),
                role_id = COALESCE($4, role_id),
                updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.email)
        .bind(changes.password_hash)
        .bind(changes.role_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn delete_user(&self, id: Uuid) -> Result<UserDeletion, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock the user so no key or request can be attached mid-delete
        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        if locked.is_none() {
            tx.rollback().await?;
            return Err(StoreError::not_found("user", id));
        }

        // The schema cascades too; deleting explicitly reports the counts
        let api_keys = sqlx::query("DELETE FROM api_keys WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let requests = sqlx::query("DELETE FROM requests WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(user_id = %id, api_keys, requests, "User deleted");
        Ok(UserDeletion { api_keys, requests })
    }

    async fn insert_api_key(&self, user_id: Uuid, key: &str) -> Result<ApiKey, StoreError> {
        let api_key = sqlx::query_as::<_, ApiKey>(
            "INSERT INTO api_keys (id, user_id, key) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        info!(api_key_id = %api_key.id, %user_id, "API key issued");
        Ok(api_key)
    }

    async fn get_api_key(&self, id: Uuid) -> Result<ApiKey, StoreError> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("api_key", id))
    }

    async fn find_api_key(&self, key: &str) -> Result<Option<ApiKey>, StoreError> {
        let api_key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(api_key)
    }

    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>, StoreError> {
        let keys = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn set_api_key_active(&self, id: Uuid, active: bool) -> Result<ApiKey, StoreError> {
        let api_key = sqlx::query_as::<_, ApiKey>(
            r#"
            UPDATE api_keys
            SET active = $2,
                updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("api_key", id))?;

        info!(api_key_id = %id, active, "API key activation changed");
        Ok(api_key)
    }

    async fn record_request(&self, request: NewRequest) -> Result<RequestRecord, StoreError> {
        let record = sqlx::query_as::<_, RequestRecord>(
            r#"
            INSERT INTO requests (id, user_id, ip_address, response)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(request.ip_address)
        .bind(request.response)
        .fetch_one(&self.pool)
        .await?;

        debug!(request_id = %record.id, user_id = %record.user_id, "Request recorded");
        Ok(record)
    }

    async fn list_requests(&self, user_id: Uuid) -> Result<Vec<RequestRecord>, StoreError> {
        let requests = sqlx::query_as::<_, RequestRecord>(
            "SELECT * FROM requests WHERE user_id = $1 ORDER BY requested_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn insert_geolocation(
        &self,
        ip_address: &str,
        fields: GeolocationFields,
    ) -> Result<GeolocationData, StoreError> {
        self.write_geolocation(ip_address, fields, false).await
    }

    async fn upsert_geolocation(
        &self,
        ip_address: &str,
        fields: GeolocationFields,
    ) -> Result<GeolocationData, StoreError> {
        self.write_geolocation(ip_address, fields, true).await
    }

    async fn get_geolocation(&self, ip_address: &str) -> Result<GeolocationData, StoreError> {
        sqlx::query_as::<_, GeolocationData>("SELECT * FROM geolocation_data WHERE ip_address = $1")
            .bind(ip_address)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("geolocation_data", ip_address))
    }

    async fn find_geolocations(
        &self,
        ip_addresses: &[String],
    ) -> Result<Vec<GeolocationData>, StoreError> {
        if ip_addresses.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, GeolocationData>(
            "SELECT * FROM geolocation_data WHERE ip_address = ANY($1)",
        )
        .bind(ip_addresses)
        .fetch_all(&self.pool)
        .await?;

        // ANY() gives no ordering guarantee; restore the caller's order
        Ok(ip_addresses
            .iter()
            .filter_map(|ip| rows.iter().find(|row| &row.ip_address == ip).cloned())
            .collect())
    }

    async fn find_ip_address(
        &self,
        family: IpFamily,
        address: &str,
    ) -> Result<Option<IpAddressRecord>, StoreError> {
        let record = sqlx::query_as::<_, IpAddressRecord>(&format!(
            "SELECT id, address FROM {} WHERE address = $1",
            family.table()
        ))
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert_rate_limit(
        &self,
        key: &str,
        limit: i32,
        window_sec: i32,
    ) -> Result<RateLimit, StoreError> {
        let rate_limit = sqlx::query_as::<_, RateLimit>(
            r#"
            INSERT INTO rate_limits (id, key, request_limit, window_sec)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO UPDATE SET
                request_limit = EXCLUDED.request_limit,
                window_sec = EXCLUDED.window_sec,
                updated_at = GREATEST(NOW(), rate_limits.updated_at + INTERVAL '1 microsecond')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(limit)
        .bind(window_sec)
        .fetch_one(&self.pool)
        .await?;

        info!(key, limit, window_sec, "Rate limit stored");
        Ok(rate_limit)
    }

    async fn get_rate_limit(&self, key: &str) -> Result<Option<RateLimit>, StoreError> {
        let rate_limit = sqlx::query_as::<_, RateLimit>("SELECT * FROM rate_limits WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(rate_limit)
    }

    async fn delete_rate_limit(&self, key: &str) -> Result<(), StoreError> {
        let deleted = sqlx::query("DELETE FROM rate_limits WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::not_found("rate_limit", key));
        }
        Ok(())
    }
}
