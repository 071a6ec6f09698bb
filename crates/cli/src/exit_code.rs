//! Exit codes for the urio CLI
//!
//! Scripts rely on these values; changing one is a breaking change.

use urio_core::Error;

/// Process exit codes
///
/// Every error kind of `urio_core::Error` maps onto one of these through
/// [`Error::exit_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,

    /// Transfer fault or unspecified error
    GeneralError = 1,

    /// Malformed URI, bad arguments, broken configuration
    UsageError = 2,

    /// Backend unreachable, login rejected or timed out (retryable)
    NetworkError = 3,

    /// Resource or named connection does not exist
    NotFound = 5,

    /// Scheme or operation not supported by the backend
    UnsupportedFeature = 7,
}

impl ExitCode {
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Returns None if the value doesn't correspond to a known exit code.
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            5 => Some(Self::NotFound),
            7 => Some(Self::UnsupportedFeature),
            _ => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Operation completed successfully",
            Self::GeneralError => "General error",
            Self::UsageError => "Invalid arguments, URI or configuration",
            Self::NetworkError => "Network error (retryable)",
            Self::NotFound => "Resource not found",
            Self::UnsupportedFeature => "Feature not supported by backend",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        Self::from_i32(err.exit_code()).unwrap_or(Self::GeneralError)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}
