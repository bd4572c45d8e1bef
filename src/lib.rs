//! Geolocation Store - storage core for an IP geolocation lookup API.
//!
//! The crate owns the relational data model (users, roles, API keys, request
//! logs, the shared geolocation cache with normalized IPv4/IPv6 rows, and
//! rate limit rules) and the constraints every writer must respect.
//!
//! # Architecture
//!
//! - **Storage contract**: [`store::Store`], implemented by PostgreSQL
//!   ([`store::PgStore`]) and an in-process engine ([`store::MemoryStore`])
//! - **Database**: PostgreSQL with sqlx, schema in `migrations/`
//! - **Errors**: [`error::StoreError`] separates uniqueness, foreign key and
//!   not-found failures
//! - **Services**: key issuance and verification, rate limit defaults,
//!   geolocation lookups

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::StoreError;
pub use store::{MemoryStore, PgStore, Store};
