//! Error types for urio-core
//!
//! Every public operation fails with one of these kinds. Backend crates map
//! their SDK errors into this type so callers only ever match on one enum.

use std::fmt;

use thiserror::Error;

use crate::uri::Uri;

/// Result type alias for urio operations
pub type Result<T> = std::result::Result<T, Error>;

/// The operation that was being attempted when an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Open,
    Read,
    Write,
    Append,
    Flush,
    Close,
    Exists,
    List,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Connect => "connect",
            Operation::Open => "open",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Append => "append",
            Operation::Flush => "flush",
            Operation::Close => "close",
            Operation::Exists => "exists",
            Operation::List => "list",
            Operation::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Scheme and redacted authority of the backend an error refers to
///
/// Never contains a plaintext password.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub scheme: String,
    pub authority: String,
}

impl Target {
    pub fn new(scheme: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            authority: authority.into(),
        }
    }

    /// Build the target for a parsed URI
    pub fn of(uri: &Uri) -> Self {
        Self::new(uri.scheme(), uri.redacted_authority())
    }

    pub fn connection(&self, operation: Operation, message: impl fmt::Display) -> Error {
        Error::Connection {
            target: self.clone(),
            operation,
            message: message.to_string(),
        }
    }

    pub fn transfer(&self, operation: Operation, message: impl fmt::Display) -> Error {
        Error::Transfer {
            target: self.clone(),
            operation,
            message: message.to_string(),
        }
    }

    pub fn timeout(&self, operation: Operation, message: impl fmt::Display) -> Error {
        Error::Timeout {
            target: self.clone(),
            operation,
            message: message.to_string(),
        }
    }

    pub fn unsupported(&self, operation: Operation) -> Error {
        Error::UnsupportedOperation {
            target: self.clone(),
            operation,
        }
    }

    pub fn read_only(&self) -> Error {
        Error::ReadOnlyBackend {
            target: self.clone(),
        }
    }

    pub fn not_found(&self, operation: Operation, path: impl Into<String>) -> Error {
        Error::NotFound {
            target: self.clone(),
            operation,
            path: path.into(),
        }
    }

    /// Translate an I/O error raised while performing `operation`
    pub fn io(&self, operation: Operation, path: &str, err: std::io::Error) -> Error {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                self.timeout(operation, err)
            }
            std::io::ErrorKind::NotFound => self.not_found(operation, path),
            _ => self.transfer(operation, err),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

/// Error types for urio operations
#[derive(Error, Debug)]
pub enum Error {
    /// The URI has no scheme or cannot be tokenized
    #[error("Malformed URI '{uri}': {reason}")]
    MalformedUri { uri: String, reason: String },

    /// A URI referenced a named connection that is not registered
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// No client factory is registered for the scheme
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Backend unreachable or authentication failed
    #[error("Connection to {target} failed during {operation}: {message}")]
    Connection {
        target: Target,
        operation: Operation,
        message: String,
    },

    /// Capability not implemented by this client
    #[error("Operation '{operation}' is not supported by {target}")]
    UnsupportedOperation { target: Target, operation: Operation },

    /// Writing was requested from a backend that only reads
    #[error("{target} is read-only")]
    ReadOnlyBackend { target: Target },

    /// A backend-level timeout expired
    #[error("{operation} on {target} timed out: {message}")]
    Timeout {
        target: Target,
        operation: Operation,
        message: String,
    },

    /// Fault in the middle of a read, write or close
    #[error("{operation} on {target} failed: {message}")]
    Transfer {
        target: Target,
        operation: Operation,
        message: String,
    },

    /// The addressed resource does not exist
    #[error("{operation} on {target} failed: {path} not found")]
    NotFound {
        target: Target,
        operation: Operation,
        path: String,
    },

    /// Unrecognised open mode string
    #[error("Invalid open mode: {0}")]
    InvalidMode(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a caller-level retry policy may reasonably try again
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Connection { .. } | Error::Timeout { .. } | Error::Transfer { .. }
        )
    }

    /// The backend this error refers to, when it refers to one
    pub fn target(&self) -> Option<&Target> {
        match self {
            Error::Connection { target, .. }
            | Error::UnsupportedOperation { target, .. }
            | Error::ReadOnlyBackend { target }
            | Error::Timeout { target, .. }
            | Error::Transfer { target, .. }
            | Error::NotFound { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::MalformedUri { .. } | Error::InvalidMode(_) | Error::Config(_) => 2, // UsageError
            Error::Connection { .. } | Error::Timeout { .. } => 3, // NetworkError
            Error::NotFound { .. } | Error::UnknownConnection(_) => 5, // NotFound
            Error::UnsupportedScheme(_)
            | Error::UnsupportedOperation { .. }
            | Error::ReadOnlyBackend { .. } => 7, // UnsupportedFeature
            Error::Transfer { .. } => 1,           // GeneralError
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::new("s3", "AKIA:***@bucket")
    }

    #[test]
    fn test_error_exit_codes() {
        let malformed = Error::MalformedUri {
            uri: "nope".into(),
            reason: "missing scheme".into(),
        };
        assert_eq!(malformed.exit_code(), 2);
        assert_eq!(Error::Config("test".into()).exit_code(), 2);
        assert_eq!(target().connection(Operation::Connect, "refused").exit_code(), 3);
        assert_eq!(target().timeout(Operation::Read, "5s").exit_code(), 3);
        assert_eq!(target().not_found(Operation::Open, "/k").exit_code(), 5);
        assert_eq!(Error::UnknownConnection("DB".into()).exit_code(), 5);
        assert_eq!(Error::UnsupportedScheme("foo".into()).exit_code(), 7);
        assert_eq!(target().unsupported(Operation::Remove).exit_code(), 7);
        assert_eq!(target().read_only().exit_code(), 7);
        assert_eq!(target().transfer(Operation::Write, "reset").exit_code(), 1);
    }

    #[test]
    fn test_error_display_carries_operation_and_target() {
        let err = target().unsupported(Operation::Remove);
        assert_eq!(
            err.to_string(),
            "Operation 'remove' is not supported by s3://AKIA:***@bucket"
        );

        let err = target().transfer(Operation::Close, "complete multipart upload failed");
        assert_eq!(
            err.to_string(),
            "close on s3://AKIA:***@bucket failed: complete multipart upload failed"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(target().connection(Operation::Connect, "x").is_transient());
        assert!(target().timeout(Operation::Read, "x").is_transient());
        assert!(target().transfer(Operation::Read, "x").is_transient());
        assert!(!target().unsupported(Operation::List).is_transient());
        assert!(!Error::UnsupportedScheme("foo".into()).is_transient());
    }

    #[test]
    fn test_io_error_translation() {
        let t = target();
        let err = t.io(
            Operation::Read,
            "/k",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"),
        );
        assert!(matches!(err, Error::Timeout { .. }));

        let err = t.io(
            Operation::Open,
            "/k",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, Error::NotFound { ref path, .. } if path == "/k"));

        let err = t.io(
            Operation::Write,
            "/k",
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"),
        );
        assert!(matches!(err, Error::Transfer { .. }));
    }
}
