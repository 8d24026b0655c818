//! Error types for alertfeed.
//!
//! This module defines all error types used throughout the alertfeed crate.
//! Failures are grouped by the collaborator they originate from so callers can
//! decide at the boundary whether a failure is ignorable or user-visible.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The main error type for alertfeed operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Session Errors ===
    /// The store refused an operation because no session is attached.
    #[error("permission denied: {operation} requires an anonymous session")]
    PermissionDenied {
        /// The store operation that was refused.
        operation: &'static str,
    },

    /// The identity provider could not establish a session.
    #[error("identity provider failed: {0}")]
    Identity(String),

    // === Location Errors ===
    /// The geolocation provider could not produce a fix.
    #[error("geolocation unavailable: {0}")]
    Geolocation(String),

    /// The geolocation provider did not answer in time.
    #[error("geolocation timed out after {0:?}")]
    GeolocationTimeout(Duration),

    // === Feed Errors ===
    /// A live subscription is already open on this synchronizer.
    #[error("feed is already subscribed")]
    AlreadySubscribed,

    /// The store rejected or failed to persist a new alert.
    #[error("failed to post alert: {0}")]
    Append(String),

    // === File System Errors ===
    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for alertfeed operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new append error.
    #[must_use]
    pub fn append(message: impl Into<String>) -> Self {
        Self::Append(message.into())
    }

    /// Create a new identity error.
    #[must_use]
    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity(message.into())
    }

    /// Create a new geolocation error.
    #[must_use]
    pub fn geolocation(message: impl Into<String>) -> Self {
        Self::Geolocation(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is a missing-session refusal.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AlreadySubscribed;
        assert_eq!(err.to_string(), "feed is already subscribed");

        let err = Error::append("quota exceeded");
        assert_eq!(err.to_string(), "failed to post alert: quota exceeded");
    }

    #[test]
    fn test_permission_denied_display() {
        let err = Error::PermissionDenied { operation: "append" };
        let msg = err.to_string();
        assert!(msg.contains("append"));
        assert!(msg.contains("anonymous session"));
        assert!(err.is_permission_error());
        assert!(!Error::AlreadySubscribed.is_permission_error());
    }

    #[test]
    fn test_geolocation_errors() {
        let err = Error::geolocation("denied");
        assert_eq!(err.to_string(), "geolocation unavailable: denied");

        let err = Error::GeolocationTimeout(Duration::from_millis(1500));
        assert!(err.to_string().contains("1.5s"));
    }

    #[test]
    fn test_identity_error() {
        let err = Error::identity("network unreachable");
        assert_eq!(
            err.to_string(),
            "identity provider failed: network unreachable"
        );
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "zoom out of range".to_string(),
        };
        assert!(err.to_string().contains("zoom out of range"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }

    #[test]
    fn test_database_migration_error_display() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.to_string().contains("version mismatch"));
    }
}
