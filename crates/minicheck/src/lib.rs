//! minicheck - structural checks for JavaScript minifiers and transpilers.
//!
//! This crate provides the CLI binary for minicheck.
//!
//! ## Modules
//!
//! - `cli` - CLI command implementations

pub mod cli;

// Re-export core types for convenience
pub use minicheck_core::error::{CheckError, OutputErrorCode};
pub use minicheck_core::output::{
    CompareResponse, ErrorInfo, ErrorResponse, FindTriggeredOptionsResponse, RunResponse,
    VerifyResponse, SCHEMA_VERSION,
};
