//! JSON output types for CLI responses.
//!
//! Every response carries `status` first and a `schema_version`, and is
//! written through [`emit_response`] so output is deterministic: the same
//! response always produces identical bytes.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::equiv::Divergence;
use crate::error::{CheckError, OutputErrorCode};

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Errors
// ============================================================================

/// Error information for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code (also the exit code).
    pub code: u8,
    /// Human-readable message.
    pub message: String,
    /// Error-specific structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// File the error refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ErrorInfo {
    /// Create from a CheckError.
    pub fn from_error(err: &CheckError) -> Self {
        let code = OutputErrorCode::from(err).code();
        let message = err.to_string();
        let (details, file) = match err {
            CheckError::InvalidArguments { details, .. } => (details.clone(), None),
            CheckError::Parse { file, .. } => (None, Some(file.clone())),
            CheckError::FileNotFound { path } => (None, Some(path.clone())),
            CheckError::Io { path, .. } => (None, path.clone()),
            CheckError::TransformFailed { .. } | CheckError::InternalError { .. } => (None, None),
        };
        ErrorInfo {
            code,
            message,
            details,
            file,
        }
    }
}

/// Response for a failed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Status: "error".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Error information.
    pub error: ErrorInfo,
}

impl ErrorResponse {
    /// Create an error response from a CheckError.
    pub fn from_error(err: &CheckError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Command Responses
// ============================================================================

/// Response for `run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    /// Status: "ok".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Transformer that produced the output.
    pub engine: String,
    /// Trimmed transformer output.
    pub output: String,
}

impl RunResponse {
    pub fn new(engine: impl Into<String>, output: impl Into<String>) -> Self {
        RunResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            engine: engine.into(),
            output: output.into(),
        }
    }
}

/// Response for `compare`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareResponse {
    /// Status: "ok" when equivalent, "different" otherwise.
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    pub original: String,
    pub transformed: String,
    /// Whether the programs differ structurally.
    pub different: bool,
    /// Where they first differ.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence: Option<Divergence>,
}

impl CompareResponse {
    pub fn new(
        original: impl Into<String>,
        transformed: impl Into<String>,
        divergence: Option<Divergence>,
    ) -> Self {
        let different = divergence.is_some();
        CompareResponse {
            status: if different { "different" } else { "ok" }.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            original: original.into(),
            transformed: transformed.into(),
            different,
            divergence,
        }
    }
}

/// A file whose transformed output differs from its input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence: Option<Divergence>,
}

/// A file that could not be checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Response for `verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Status: "ok" when no file failed, "failed" otherwise.
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Transformer under test.
    pub engine: String,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Files that differ after transformation.
    pub failures: Vec<FileFailure>,
    /// Files that could not be read, transformed, or parsed.
    pub skipped_files: Vec<SkippedFile>,
}

impl VerifyResponse {
    pub fn new(
        engine: impl Into<String>,
        passed: usize,
        failures: Vec<FileFailure>,
        skipped_files: Vec<SkippedFile>,
    ) -> Self {
        VerifyResponse {
            status: if failures.is_empty() { "ok" } else { "failed" }.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            engine: engine.into(),
            passed,
            failed: failures.len(),
            skipped: skipped_files.len(),
            failures,
            skipped_files,
        }
    }
}

/// Response for `find-triggered-options`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindTriggeredOptionsResponse {
    /// Status: "ok".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Transformer searched.
    pub engine: String,
    /// Where the summary was written.
    pub summary: String,
    /// Number of inputs processed.
    pub files: usize,
    /// Number of inputs with at least one triggered flag.
    pub triggered: usize,
}

impl FindTriggeredOptionsResponse {
    pub fn new(
        engine: impl Into<String>,
        summary: impl Into<String>,
        files: usize,
        triggered: usize,
    ) -> Self {
        FindTriggeredOptionsResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            engine: engine.into(),
            summary: summary.into(),
            files,
            triggered,
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Emit a response as pretty-printed JSON to a writer.
///
/// This is the single output path for the CLI.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================
