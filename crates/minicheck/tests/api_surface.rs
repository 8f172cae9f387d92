//! Compile-only test to verify public API surface.
//!
//! This file serves as a compile-time contract for the public API.
//! If this file fails to compile, the public API has regressed.
//!
//! Run with: cargo test -p minicheck -- api_surface

// Allow unused imports - this test is about compile-time verification, not runtime usage
#![allow(unused_imports)]

// ============================================================================
// Syntax Trees and Parsing
// ============================================================================

use minicheck_core::ast::{Node, NodeKind, Tree, CHILDREN_FIELD, TOKENS_FIELD};
use minicheck_core::parse::{
    parse_program, JsParser, ParseError, ParseOptions, ParseResult, SourceType,
};

// ============================================================================
// Equivalence
// ============================================================================

use minicheck_core::equiv::{
    check, first_divergence, is_structurally_different, nodes_differ, normalize_strict_mode,
    Divergence, DivergenceReason, Verdict,
};

// ============================================================================
// Configuration, Oracles, Delta Debugging
// ============================================================================

use minicheck_core::config::{ConfigError, ConfigRecord};
use minicheck_core::delta::{
    baseline, candidate_flags, ensure_searchable, find_triggered_options, probe, DebugOptions,
    DeltaError, ProbeOutcome, Strategy, TriggeredOptions, DEFAULT_MAX_POWER_SET_FLAGS,
    UNSAFE_PREFIX,
};
use minicheck_core::oracle::{
    cache_key, CachingOracle, CommandOracle, Engine, EngineSpec, EngineSpecError,
    TransformError, TransformOracle, DEFAULT_TIMEOUT,
};

// ============================================================================
// Files, Summary, Settings
// ============================================================================

use minicheck_core::files::{collect_js_files, FileError, FileResult};
use minicheck_core::settings::{
    default_cache_dir, CliOverrides, ConfigSource, ConfigValue, ResolvedSettings, SettingsError,
    BATCH_SIZE_VAR, CACHE_DIR_VAR, ENGINE_VAR, LEGACY_CACHE_DIR_VAR, TIMEOUT_VAR,
};
use minicheck_core::summary::{SummaryError, SummaryWriter, DEFAULT_BATCH_SIZE};

// ============================================================================
// Errors and Output
// ============================================================================

use minicheck_core::error::{CheckError, OutputErrorCode};
use minicheck_core::output::{
    emit_response, CompareResponse, ErrorInfo, ErrorResponse, FileFailure,
    FindTriggeredOptionsResponse, RunResponse, SkippedFile, VerifyResponse, SCHEMA_VERSION,
};

// ============================================================================
// CLI Crate
// ============================================================================

use minicheck::cli::{
    build_oracle, load_config, parse_command_template, run_compare, run_find_triggered_options,
    run_transform, run_verify, PROGRESS_INTERVAL,
};

// Re-exports at the crate root
use minicheck::{
    CheckError as RootCheckError, ErrorResponse as RootErrorResponse,
    OutputErrorCode as RootOutputErrorCode, SCHEMA_VERSION as ROOT_SCHEMA_VERSION,
};

#[test]
fn api_surface_compiles() {
    // The imports above are the test.
}
