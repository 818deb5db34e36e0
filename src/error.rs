// =============================================================================
// Error taxonomy — mirrors the recoverable/fatal split in SPEC_FULL §7
// =============================================================================
//
// Everything above the persistence boundary propagates as `anyhow::Result`;
// this enum exists specifically so that callers touching the store can
// pattern-match the recoverability class (Duplicate is always swallowed,
// Transient is logged and the caller continues, Fatal terminates the
// process) instead of re-parsing a Postgres error code at every call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-constraint violation on an idempotent insert — always treated
    /// as success by the caller, never surfaced further.
    #[error("duplicate row")]
    Duplicate,

    /// Any I/O failure against the store or cache that can recur during
    /// normal operation (connection reset, timeout, deadlock retry). Logged
    /// and non-fatal: the surrounding pipeline continues.
    #[error("transient store error: {0}")]
    Transient(#[source] sqlx::Error),

    /// A failure indicating a broken invariant of the storage layer itself
    /// (unreachable at startup, migration failure). The process should exit
    /// non-zero after logging a diagnostic.
    #[error("fatal store error: {0}")]
    Fatal(#[source] sqlx::Error),
}

impl StoreError {
    /// Classify a raw `sqlx::Error` into the Duplicate/Transient taxonomy.
    /// Callers that already know a failure is fatal (e.g. pool construction
    /// at startup) should construct `StoreError::Fatal` directly instead of
    /// calling this.
    pub fn classify(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            // Postgres unique_violation is SQLSTATE 23505.
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Duplicate;
            }
        }
        StoreError::Transient(err)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_generic_io_as_transient() {
        let err = StoreError::classify(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Transient(_)));
        assert!(!err.is_duplicate());
    }
}
