//! CLI command implementations.
//!
//! Each `run_*` function drives one subcommand against the core library and
//! returns the JSON response to print. They take the oracle and
//! configuration as arguments so tests can substitute closures for real
//! transformers.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use minicheck_core::config::ConfigRecord;
use minicheck_core::delta::{ensure_searchable, find_triggered_options, DebugOptions};
use minicheck_core::equiv::{check, first_divergence, normalize_strict_mode};
use minicheck_core::error::CheckError;
use minicheck_core::files::collect_js_files;
use minicheck_core::oracle::{CachingOracle, CommandOracle, Engine, TransformOracle};
use minicheck_core::output::{
    CompareResponse, FileFailure, FindTriggeredOptionsResponse, RunResponse, SkippedFile,
    VerifyResponse,
};
use minicheck_core::parse::{JsParser, ParseOptions};
use minicheck_core::settings::ResolvedSettings;
use minicheck_core::summary::SummaryWriter;

/// Inputs processed between progress log lines.
pub const PROGRESS_INTERVAL: usize = 1000;

// ============================================================================
// Setup
// ============================================================================

/// Parse a command template given as a JSON array of strings.
///
/// ```json
/// ["node", "minify.js", "--config", "{config}"]
/// ```
pub fn parse_command_template(json_str: &str) -> Result<Vec<String>, CheckError> {
    let args: Vec<String> = serde_json::from_str(json_str).map_err(|e| {
        CheckError::invalid_args(format!(
            "transform command must be a JSON array of strings: {}",
            e
        ))
    })?;
    if args.is_empty() {
        return Err(CheckError::invalid_args(
            "transform command array cannot be empty",
        ));
    }
    Ok(args)
}

/// Build the oracle for the resolved engine, or for `template` if given.
pub fn build_oracle(
    settings: &ResolvedSettings,
    template: Option<Vec<String>>,
) -> CachingOracle<CommandOracle> {
    let oracle = match template {
        Some(template) => CommandOracle::from_template("custom command", template),
        None => CommandOracle::for_engine(&settings.engine.value),
    };
    CachingOracle::new(
        oracle
            .with_timeout(settings.timeout.value)
            .with_cache_dir(&settings.cache_dir.value),
    )
}

/// Load the transformer configuration.
///
/// Without `path`, the engine's built-in default is used. The flags pointer
/// defaults to the engine's.
pub fn load_config(
    engine: Engine,
    path: Option<&Path>,
    flags_pointer: Option<&str>,
) -> Result<ConfigRecord, CheckError> {
    let pointer = flags_pointer.unwrap_or(engine.flags_pointer());
    let config = match path {
        Some(path) => ConfigRecord::load(path, pointer)?,
        None => ConfigRecord::new(engine.default_config(), pointer)?,
    };
    debug!(
        "config: {} boolean flags under `{}`",
        config.boolean_flags().len(),
        config.flags_pointer()
    );
    Ok(config)
}

/// Read a source file. Invalid UTF-8 is replaced rather than rejected.
fn read_source(path: &Path) -> Result<String, CheckError> {
    let bytes = fs::read(path).map_err(|e| CheckError::io_at(path.display().to_string(), &e))?;
    match String::from_utf8(bytes) {
        Ok(code) => Ok(code),
        Err(err) => {
            warn!("{} is not valid UTF-8, decoding lossily", path.display());
            Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
        }
    }
}

// ============================================================================
// run
// ============================================================================

/// Transform `code` once and return the trimmed output.
pub fn run_transform(
    code: &str,
    config: &Value,
    oracle: &dyn TransformOracle,
) -> Result<RunResponse, CheckError> {
    let output = oracle.transform(code, config)?;
    Ok(RunResponse::new(oracle.describe(), output.trim()))
}

// ============================================================================
// compare
// ============================================================================

/// Compare two files structurally.
pub fn run_compare(
    original: &Path,
    transformed: &Path,
    options: &ParseOptions,
) -> Result<CompareResponse, CheckError> {
    let original_code = read_source(original)?;
    let transformed_code = read_source(transformed)?;

    let (original_code, transformed_code) =
        normalize_strict_mode(&original_code, &transformed_code);

    let mut parser = JsParser::new(*options)?;
    let original_ast = parser
        .parse(&original_code)
        .map_err(|e| CheckError::parse_in(original.display().to_string(), e))?;
    let transformed_ast = parser
        .parse(&transformed_code)
        .map_err(|e| CheckError::parse_in(transformed.display().to_string(), e))?;

    Ok(CompareResponse::new(
        original.display().to_string(),
        transformed.display().to_string(),
        first_divergence(&original_ast, &transformed_ast),
    ))
}

// ============================================================================
// verify
// ============================================================================

/// Transform every collected file and check that its structure survives.
///
/// Files the transformer rejects, or whose input or output does not parse,
/// are skipped and listed. Unreadable files abort the run.
pub fn run_verify(
    paths: &[PathBuf],
    config: &ConfigRecord,
    oracle: &dyn TransformOracle,
    options: &ParseOptions,
) -> Result<VerifyResponse, CheckError> {
    let files = collect_js_files(paths)?;
    info!("verifying {} files with {}", files.len(), oracle.describe());

    let mut passed = 0;
    let mut failures = Vec::new();
    let mut skipped = Vec::new();

    for (index, file) in files.iter().enumerate() {
        let path = file.display().to_string();
        debug!("checking {}", path);
        let code = read_source(file)?;

        let transformed = oracle.transform(&code, config.value());
        oracle.reset();
        let output = match transformed {
            Ok(output) => output,
            Err(err) => {
                warn!("skipping {}: {}", path, err);
                skipped.push(SkippedFile {
                    path,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        match check(&code, &output, options) {
            Ok(verdict) if verdict.different => {
                warn!("{} changed structure", path);
                failures.push(FileFailure {
                    path,
                    divergence: verdict.divergence,
                });
            }
            Ok(_) => passed += 1,
            Err(err) => {
                warn!("skipping {}: {}", path, err);
                skipped.push(SkippedFile {
                    path,
                    reason: err.to_string(),
                });
            }
        }

        if (index + 1) % PROGRESS_INTERVAL == 0 {
            info!("checked {} files", index + 1);
        }
    }

    Ok(VerifyResponse::new(
        oracle.describe(),
        passed,
        failures,
        skipped,
    ))
}

// ============================================================================
// find-triggered-options
// ============================================================================

/// Delta-debug every collected file and stream the summary to `writer`.
///
/// `summary_label` names the summary destination in the response. If a file
/// cannot be processed, the entries gathered so far are still written and
/// the summary is closed before the error is returned.
pub fn run_find_triggered_options<W: Write>(
    paths: &[PathBuf],
    config: &ConfigRecord,
    oracle: &dyn TransformOracle,
    options: &DebugOptions,
    batch_size: usize,
    writer: W,
    summary_label: &str,
) -> Result<FindTriggeredOptionsResponse, CheckError> {
    ensure_searchable(config, options)?;
    let files = collect_js_files(paths)?;
    info!("found {} JavaScript files", files.len());

    let mut summary = SummaryWriter::with_batch_size(writer, batch_size);
    let triggered = match search_files(&files, config, oracle, options, &mut summary) {
        Ok(triggered) => triggered,
        Err(err) => {
            match summary.finish() {
                Ok(written) => warn!(
                    "stopped early; {} entries saved to {}",
                    written, summary_label
                ),
                Err(close_err) => warn!("could not close {}: {}", summary_label, close_err),
            }
            return Err(err);
        }
    };

    let count = summary.finish()?;
    info!("summary saved to {}", summary_label);

    Ok(FindTriggeredOptionsResponse::new(
        oracle.describe(),
        summary_label,
        count,
        triggered,
    ))
}

/// Search each file and push its entry; returns how many had any result.
fn search_files<W: Write>(
    files: &[PathBuf],
    config: &ConfigRecord,
    oracle: &dyn TransformOracle,
    options: &DebugOptions,
    summary: &mut SummaryWriter<W>,
) -> Result<usize, CheckError> {
    let mut triggered = 0;
    for (index, file) in files.iter().enumerate() {
        let path = file.display().to_string();
        debug!("checking {}", path);
        let code = read_source(file)?;

        let result = find_triggered_options(&code, config, oracle, options);
        oracle.reset();
        let result = result?;
        if !result.is_empty() {
            triggered += 1;
        }
        summary.push(&path, &result)?;

        if (index + 1) % PROGRESS_INTERVAL == 0 {
            info!("checked {} files", index + 1);
        }
    }
    Ok(triggered)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod command_templates {
        use super::*;

        #[test]
        fn parses_json_array() {
            let args = parse_command_template(r#"["node", "min.js", "{config}"]"#).unwrap();
            assert_eq!(args, vec!["node", "min.js", "{config}"]);
        }

        #[test]
        fn rejects_empty_array() {
            assert!(parse_command_template("[]").is_err());
        }

        #[test]
        fn rejects_non_array() {
            let err = parse_command_template(r#""node min.js""#).unwrap_err();
            assert_eq!(err.error_code().code(), 2);
        }
    }

    mod configs {
        use super::*;

        #[test]
        fn default_config_uses_engine_pointer() {
            let config = load_config(Engine::Terser, None, None).unwrap();
            assert_eq!(config.flags_pointer(), "/compress");
        }

        #[test]
        fn explicit_pointer_wins() {
            let config = load_config(Engine::Swc, None, Some("/jsc/minify")).unwrap();
            assert_eq!(config.flags_pointer(), "/jsc/minify");
        }

        #[test]
        fn missing_config_file_is_resolution_error() {
            let err =
                load_config(Engine::Swc, Some(Path::new("/nonexistent/.swcrc")), None).unwrap_err();
            assert_eq!(err.error_code().code(), 3);
        }

        #[test]
        fn oracle_uses_custom_template_when_given() {
            let settings = ResolvedSettings::defaults();
            let oracle = build_oracle(&settings, Some(vec!["cat".to_string()]));
            assert_eq!(oracle.inner().template(), ["cat".to_string()]);
            assert_eq!(oracle.describe(), "custom command (cached)");

            let oracle = build_oracle(&settings, None);
            assert_eq!(oracle.describe(), "swc@1.6.7 (cached)");
        }
    }
}
