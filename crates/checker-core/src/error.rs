//! Error taxonomy for a single checker run.

use thiserror::Error;

/// Failure of one pipeline component.
#[derive(Error, Debug)]
pub enum Error {
    /// Remote comic could not be fetched or parsed
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Notification backend rejected or failed to send the message
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// History could not be read or written
    #[error("History error: {0}")]
    Persistence(String),

    /// Image archive failed; never fatal to a run
    #[error("Download failed: {0}")]
    Download(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Result type alias using the checker [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_diagnostic() {
        let err = Error::Delivery("HTTP 401 Unauthorized".to_string());
        assert_eq!(err.to_string(), "Delivery failed: HTTP 401 Unauthorized");
    }

    #[test]
    fn test_sqlite_error_is_persistence() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Persistence(_)));
    }
}
