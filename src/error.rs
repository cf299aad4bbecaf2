//! Error taxonomy for the scheduling and aggregate engine.

use rusqlite::ErrorCode;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid pattern entry {index}: {reason}")]
    InvalidPatternEntry { index: usize, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("class overlaps an existing class of group {group_id} on {date}")]
    SessionConflict { group_id: String, date: String },

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Wire code reported in the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::InvalidPatternEntry { .. } => "bad_params",
            Self::NotFound { .. } => "not_found",
            Self::SessionConflict { .. } | Self::Conflict(_) => "conflict",
            Self::Store(_) => "db_error",
        }
    }

    /// BUSY / LOCKED failures; the whole transaction may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        assert_eq!(EngineError::validation("x").code(), "bad_params");
        assert_eq!(
            EngineError::InvalidPatternEntry {
                index: 0,
                reason: "too long".into()
            }
            .code(),
            "bad_params"
        );
        assert_eq!(EngineError::not_found("group", "g1").code(), "not_found");
        assert_eq!(
            EngineError::SessionConflict {
                group_id: "g1".into(),
                date: "2024-01-01".into()
            }
            .code(),
            "conflict"
        );
    }

    #[test]
    fn not_found_display() {
        let err = EngineError::not_found("group", "g-42");
        assert_eq!(err.to_string(), "group not found: g-42");
    }

    #[test]
    fn busy_is_transient() {
        let busy = EngineError::Store(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_transient());
        let constraint = EngineError::Store(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        ));
        assert!(!constraint.is_transient());
        assert!(!EngineError::validation("x").is_transient());
    }
}
