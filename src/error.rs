//! Storage error types.
//!
//! Every constraint the schema enforces surfaces as its own variant so that
//! callers (an API layer, an importer) can map a duplicate email and an
//! unknown role to different responses without inspecting database codes.

use sqlx::error::ErrorKind;

/// Error returned by every storage operation.
///
/// # Error Categories
///
/// - **Constraint Errors**: a unique or foreign key constraint rejected the write
/// - **Resource Errors**: the targeted row does not exist
/// - **Validation Errors**: arguments rejected before reaching the engine
/// - **Database Errors**: connection, protocol, or other sqlx failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique-constrained column already holds this value.
    ///
    /// `constraint` is the constraint name from the schema, e.g. `users_email_key`.
    #[error("Uniqueness violation: {constraint}")]
    UniquenessViolation { constraint: String },

    /// A referenced parent row is missing, or a delete is blocked by children.
    #[error("Foreign key violation: {constraint}")]
    ForeignKeyViolation { constraint: String },

    /// The operation targeted a row that does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Arguments failed validation (empty input, non-positive limits).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub(crate) fn unique(constraint: &str) -> Self {
        StoreError::UniquenessViolation {
            constraint: constraint.to_string(),
        }
    }

    pub(crate) fn foreign_key(constraint: &str) -> Self {
        StoreError::ForeignKeyViolation {
            constraint: constraint.to_string(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for any uniqueness violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniquenessViolation { .. })
    }

    /// True when the uniqueness violation came from the named constraint.
    pub fn is_unique_violation_on(&self, name: &str) -> bool {
        matches!(self, StoreError::UniquenessViolation { constraint } if constraint == name)
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, StoreError::ForeignKeyViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Classify sqlx errors by SQLSTATE class.
///
/// - `23505` (unique_violation) → `UniquenessViolation`
/// - `23503` (foreign_key_violation) → `ForeignKeyViolation`
/// - `23514` (check_violation) → `InvalidInput`
/// - everything else → `Database`
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.kind() {
                ErrorKind::UniqueViolation => {
                    return StoreError::UniquenessViolation { constraint };
                }
                ErrorKind::ForeignKeyViolation => {
                    return StoreError::ForeignKeyViolation { constraint };
                }
                ErrorKind::CheckViolation => {
                    return StoreError::InvalidInput(format!("check failed: {constraint}"));
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}
