//! Error types and error code constants for minicheck.
//!
//! `CheckError` is the single error type rendered by the CLI. Each module
//! keeps its own `thiserror` enum; `impl From<X> for CheckError` bridges them
//! here, and [`OutputErrorCode`] maps every variant to a stable exit code:
//!
//! - `2`: invalid arguments (bad flags, unparsable input or config)
//! - `3`: resolution errors (input path not found)
//! - `4`: I/O errors (reading inputs, writing output, running the transformer)
//! - `5`: verification failed (structural difference found; reported by the
//!   CLI as a normal response plus this exit code, never as an error)
//! - `10`: internal errors

use std::fmt;
use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::delta::DeltaError;
use crate::files::FileError;
use crate::oracle::{EngineSpecError, TransformError};
use crate::parse::ParseError;
use crate::settings::SettingsError;
use crate::summary::SummaryError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Stable error codes used as exit codes and in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller.
    InvalidArguments = 2,
    /// An input path could not be resolved.
    ResolutionError = 3,
    /// Reading, writing, or running a subprocess failed.
    IoError = 4,
    /// Programs were found to differ.
    VerificationFailed = 5,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Input source could not be parsed.
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// Input path does not exist.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// Reading or writing failed.
    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<String>,
    },

    /// The transformer failed.
    #[error("transform failed: {message}")]
    TransformFailed { message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&CheckError> for OutputErrorCode {
    fn from(err: &CheckError) -> Self {
        match err {
            CheckError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            CheckError::Parse { .. } => OutputErrorCode::InvalidArguments,
            CheckError::FileNotFound { .. } => OutputErrorCode::ResolutionError,
            CheckError::Io { .. } => OutputErrorCode::IoError,
            CheckError::TransformFailed { .. } => OutputErrorCode::IoError,
            CheckError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<CheckError> for OutputErrorCode {
    fn from(err: CheckError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<ParseError> for CheckError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Language { .. } | ParseError::Aborted => CheckError::InternalError {
                message: err.to_string(),
            },
            other => CheckError::Parse {
                file: "<input>".to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<TransformError> for CheckError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Config { message } => CheckError::InvalidArguments {
                message,
                details: None,
            },
            other => CheckError::TransformFailed {
                message: other.to_string(),
            },
        }
    }
}

impl From<ConfigError> for CheckError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io { ref path, ref source } if source.kind() == io::ErrorKind::NotFound => {
                CheckError::file_not_found(path.display().to_string())
            }
            ConfigError::Io { ref path, .. } => CheckError::Io {
                message: err.to_string(),
                path: Some(path.display().to_string()),
            },
            ConfigError::Parse { .. } | ConfigError::InvalidPointer { .. } => {
                CheckError::invalid_args(err.to_string())
            }
        }
    }
}

impl From<FileError> for CheckError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::NotFound { path } => CheckError::file_not_found(path),
            FileError::Walk { ref path, .. } => CheckError::Io {
                message: err.to_string(),
                path: Some(path.clone()),
            },
            FileError::Io(io_err) => CheckError::from(io_err),
        }
    }
}

impl From<DeltaError> for CheckError {
    fn from(err: DeltaError) -> Self {
        let details = match err {
            DeltaError::TooManyFlags { count, limit } => {
                serde_json::json!({ "candidates": count, "limit": limit })
            }
        };
        CheckError::invalid_args_with_details(err.to_string(), details)
    }
}

impl From<SummaryError> for CheckError {
    fn from(err: SummaryError) -> Self {
        match err {
            SummaryError::Io(io_err) => CheckError::from(io_err),
            SummaryError::Serialize { .. } => CheckError::internal(err.to_string()),
        }
    }
}

impl From<SettingsError> for CheckError {
    fn from(err: SettingsError) -> Self {
        let details = serde_json::json!({ "origin": err.origin, "value": err.value });
        CheckError::invalid_args_with_details(err.to_string(), details)
    }
}

impl From<EngineSpecError> for CheckError {
    fn from(err: EngineSpecError) -> Self {
        CheckError::invalid_args(err.to_string())
    }
}

impl From<io::Error> for CheckError {
    fn from(err: io::Error) -> Self {
        CheckError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl CheckError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        CheckError::InvalidArguments {
            message: message.into(),
            details: None,
        }
    }

    /// Create an invalid arguments error with JSON details.
    pub fn invalid_args_with_details(
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        CheckError::InvalidArguments {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        CheckError::FileNotFound { path: path.into() }
    }

    /// Create an I/O error tied to a path.
    pub fn io_at(path: impl Into<String>, err: &io::Error) -> Self {
        let path = path.into();
        if err.kind() == io::ErrorKind::NotFound {
            return CheckError::file_not_found(path);
        }
        CheckError::Io {
            message: format!("{path}: {err}"),
            path: Some(path),
        }
    }

    /// Attach the file name to a parse error.
    pub fn parse_in(file: impl Into<String>, err: ParseError) -> Self {
        match CheckError::from(err) {
            CheckError::Parse { message, .. } => CheckError::Parse {
                file: file.into(),
                message,
            },
            other => other,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        CheckError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
