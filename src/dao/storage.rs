use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by match stores regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend refused the record itself. Writing it again gives the same answer.
    #[error("match record `{match_id}` rejected: {message}")]
    Rejected { match_id: String, message: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether the same write may succeed once the backend recovers.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_outages_are_transient() {
        let outage = StorageError::unavailable("down".into(), std::io::Error::other("refused"));
        assert!(outage.is_transient());
        let rejected = StorageError::Rejected {
            match_id: "match_1".into(),
            message: "bad document".into(),
        };
        assert!(!rejected.is_transient());
        assert_eq!(
            rejected.to_string(),
            "match record `match_1` rejected: bad document"
        );
    }
}
