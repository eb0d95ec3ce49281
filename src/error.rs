//! Layered error types for the event store core.
//!
//! This module provides a hierarchical error system:
//!
//! - [`DomainError`] - Invalid inputs (malformed criteria, bad hex)
//! - [`InfraError`] - Infrastructure errors (database, serialization)
//! - [`StoreError`] - Top-level error combining domain and infrastructure
//!
//! # Error Philosophy
//!
//! - Domain errors are programmer errors: the call fails synchronously and
//!   nothing is written.
//! - Infrastructure errors surface the failing subsystem; serialization
//!   conflicts are the only class retried automatically (inside the store).
//! - A contract-read cache miss is `Ok(None)`, never an error.

use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Domain-level errors representing invalid inputs.
///
/// These are considered programmer errors and fail the surrounding
/// operation before any database work happens.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DomainError {
    /// A topic filter had more than four positions.
    #[error("too many topic positions: {0} (max 4)")]
    TooManyTopicPositions(usize),

    /// A filter slot was given an empty OR-set.
    ///
    /// Slots are either wildcards or non-empty sets; an empty set would
    /// match nothing and is always a caller bug.
    #[error("empty set in filter slot: {0}")]
    EmptyFilterSet(&'static str),

    /// A child-address location string could not be parsed.
    #[error("invalid child address location: {0}")]
    InvalidChildAddressLocation(String),

    /// An interval with `start > end`.
    #[error("invalid block range: start {start} > end {end}")]
    InvalidBlockRange {
        /// Requested start block.
        start: String,
        /// Requested end block.
        end: String,
    },

    /// A hex string was malformed for the expected width.
    #[error("invalid hex value for {field}: {value}")]
    InvalidHex {
        /// Which field was being parsed.
        field: &'static str,
        /// The offending input.
        value: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// INFRASTRUCTURE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Infrastructure-level errors from the backing engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InfraError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row referenced a block or transaction that was not inserted in
    /// the same transaction (foreign key violation).
    #[error("referential violation: {0}")]
    ReferentialViolation(String),

    /// Concurrent interval merges collided and the retry budget ran out.
    #[error("serialization conflict persisted after {attempts} attempts")]
    SerializationConflict {
        /// How many attempts were made before giving up.
        attempts: u32,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A persisted row failed to decode back into its domain type.
    #[error("internal error: {0}")]
    Internal(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Top-level error combining domain and infrastructure errors.
///
/// This is the error type of every public store operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Invalid input.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Infrastructure failure.
    #[error(transparent)]
    Infra(#[from] InfraError),
}

/// Type alias for store Results.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Infra(map_database_error(err))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SQLSTATE CLASSIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

/// SQLSTATE for foreign key violations.
const FOREIGN_KEY_VIOLATION: &str = "23503";
/// SQLSTATE for serialization failures under SERIALIZABLE isolation.
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for deadlocks, which are retried the same way.
const DEADLOCK_DETECTED: &str = "40P01";

/// Map a raw sqlx error onto the infrastructure taxonomy.
///
/// Foreign key violations become [`InfraError::ReferentialViolation`];
/// everything else stays a plain database error.
pub(crate) fn map_database_error(err: sqlx::Error) -> InfraError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) {
            return InfraError::ReferentialViolation(db.message().to_owned());
        }
    }
    InfraError::Database(err)
}

/// Whether an error is a serialization conflict worth retrying.
pub(crate) fn is_serialization_conflict(err: &StoreError) -> bool {
    let StoreError::Infra(InfraError::Database(sqlx::Error::Database(db))) = err else {
        return false;
    };
    matches!(
        db.code().as_deref(),
        Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_display() {
        let err = DomainError::TooManyTopicPositions(7);
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn store_error_from_domain() {
        let domain = DomainError::EmptyFilterSet("address");
        let store: StoreError = domain.into();
        assert!(matches!(
            store,
            StoreError::Domain(DomainError::EmptyFilterSet("address"))
        ));
    }

    #[test]
    fn store_error_from_infra() {
        let infra = InfraError::SerializationConflict { attempts: 3 };
        let store: StoreError = infra.into();
        assert!(store.to_string().contains("3 attempts"));
    }

    #[test]
    fn row_not_found_is_not_retryable() {
        let err: StoreError = StoreError::Infra(InfraError::Database(sqlx::Error::RowNotFound));
        assert!(!is_serialization_conflict(&err));
    }
}
