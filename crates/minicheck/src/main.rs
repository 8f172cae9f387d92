//! Binary entry point for the minicheck CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Minify a snippet with the default engine
//! minicheck run 'const x = 1 + 2;'
//!
//! # Check that two files have the same structure
//! minicheck compare original.js minified.js
//!
//! # Minify every file under src/ and check each result
//! minicheck verify --engine terser@5.31.5 src/
//!
//! # Find the compress options that change the output of each file
//! minicheck find-triggered-options -o summary.json --config .swcrc src/
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use minicheck::cli::{
    build_oracle, load_config, parse_command_template, run_compare, run_find_triggered_options,
    run_transform, run_verify,
};
use minicheck_core::delta::{
    ensure_searchable, DebugOptions, Strategy, DEFAULT_MAX_POWER_SET_FLAGS,
};
use minicheck_core::error::{CheckError, OutputErrorCode};
use minicheck_core::oracle::EngineSpec;
use minicheck_core::output::{emit_response, ErrorResponse};
use minicheck_core::parse::{ParseOptions, SourceType};
use minicheck_core::settings::{CliOverrides, ResolvedSettings};

// ============================================================================
// CLI Structure
// ============================================================================

/// Structural checks for JavaScript minifiers.
///
/// All results are printed as JSON on stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(
    name = "minicheck",
    version,
    about = "Check that JavaScript minifiers preserve program structure"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Log level for tracing output (overridden by RUST_LOG).
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Package cache directory for the transformer.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Seconds allowed for one transformer run.
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Options selecting and configuring the transformer.
#[derive(clap::Args, Debug)]
struct TransformArgs {
    /// Transformer as `name@version` (swc, terser, babel).
    #[arg(long)]
    engine: Option<String>,

    /// Transformer configuration file (JSON, e.g. `.swcrc`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON pointer to the boolean flags inside the configuration.
    #[arg(long)]
    flags_pointer: Option<String>,

    /// Custom transformer command as a JSON array of strings.
    ///
    /// Supports `{config}`, `{input}`, `{version}` and `{filename}` placeholders.
    #[arg(long)]
    transform_command: Option<String>,
}

/// Options controlling how sources are parsed.
#[derive(clap::Args, Debug)]
struct ParseArgs {
    /// Parse sources as ES modules.
    #[arg(long)]
    module: bool,

    /// Accept JSX syntax.
    #[arg(long)]
    jsx: bool,
}

impl ParseArgs {
    fn options(&self) -> ParseOptions {
        ParseOptions {
            source_type: if self.module {
                SourceType::Module
            } else {
                SourceType::Script
            },
            allow_jsx: self.jsx,
            ..ParseOptions::default()
        }
    }
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Transform code once and print the output.
    Run {
        #[command(flatten)]
        transform: TransformArgs,
        /// Treat the argument as a file path.
        #[arg(long)]
        file: bool,
        /// Source code, or a path with --file.
        input: String,
    },
    /// Compare two files structurally.
    Compare {
        #[command(flatten)]
        parse: ParseArgs,
        /// Original source file.
        original: PathBuf,
        /// Transformed source file.
        transformed: PathBuf,
    },
    /// Transform files and check that their structure is preserved.
    Verify {
        #[command(flatten)]
        transform: TransformArgs,
        #[command(flatten)]
        parse: ParseArgs,
        /// Files or directories to check.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Find the boolean options that change the output of each file.
    FindTriggeredOptions {
        #[command(flatten)]
        transform: TransformArgs,
        /// Output summary file.
        #[arg(short, long, default_value = "summary.json")]
        output: PathBuf,
        /// Also check options named `unsafe*`.
        #[arg(short = 'u', long = "unsafe")]
        include_unsafe: bool,
        /// Try every combination of options instead of one at a time.
        #[arg(short = 'b', long = "bruteforce")]
        brute_force: bool,
        /// Largest option count allowed with --bruteforce.
        #[arg(long, default_value_t = DEFAULT_MAX_POWER_SET_FLAGS)]
        max_flags: usize,
        /// Entries written per summary flush.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Files or directories to check.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level);

    match execute(cli) {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Different) => ExitCode::from(OutputErrorCode::VerificationFailed.code()),
        Err(err) => {
            // Errors go to stdout as JSON, like every other response.
            let response = ErrorResponse::from_error(&err);
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();
            ExitCode::from(OutputErrorCode::from(&err).code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// How a successful command ended.
enum Outcome {
    Success,
    /// A structural difference was reported.
    Different,
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<Outcome, CheckError> {
    match cli.command {
        Command::Run {
            transform,
            file,
            input,
        } => execute_run(&cli.global, &transform, file, &input),
        Command::Compare {
            parse,
            original,
            transformed,
        } => execute_compare(&parse, &original, &transformed),
        Command::Verify {
            transform,
            parse,
            paths,
        } => execute_verify(&cli.global, &transform, &parse, &paths),
        Command::FindTriggeredOptions {
            transform,
            output,
            include_unsafe,
            brute_force,
            max_flags,
            batch_size,
            paths,
        } => {
            let options = DebugOptions {
                include_unsafe,
                strategy: if brute_force {
                    Strategy::PowerSet
                } else {
                    Strategy::Linear
                },
                max_power_set_flags: max_flags,
            };
            execute_find_triggered_options(
                &cli.global,
                &transform,
                &options,
                batch_size,
                &output,
                &paths,
            )
        }
    }
}

// ============================================================================
// Command Executors
// ============================================================================

fn resolve_settings(
    global: &GlobalArgs,
    transform: &TransformArgs,
    batch_size: Option<usize>,
) -> Result<ResolvedSettings, CheckError> {
    let engine = transform
        .engine
        .as_deref()
        .map(str::parse::<EngineSpec>)
        .transpose()?;
    let overrides = CliOverrides {
        engine,
        cache_dir: global.cache_dir.clone(),
        timeout_secs: global.timeout,
        batch_size,
    };
    Ok(ResolvedSettings::resolve(&overrides)?)
}

fn emit<T: serde::Serialize>(response: &T) -> Result<(), CheckError> {
    emit_response(response, &mut io::stdout()).map_err(|e| CheckError::internal(e.to_string()))?;
    let _ = io::stdout().flush();
    Ok(())
}

fn execute_run(
    global: &GlobalArgs,
    transform: &TransformArgs,
    file: bool,
    input: &str,
) -> Result<Outcome, CheckError> {
    let settings = resolve_settings(global, transform, None)?;
    let template = transform
        .transform_command
        .as_deref()
        .map(parse_command_template)
        .transpose()?;
    let oracle = build_oracle(&settings, template);
    let config = load_config(
        settings.engine.value.engine,
        transform.config.as_deref(),
        transform.flags_pointer.as_deref(),
    )?;

    let code = if file {
        std::fs::read_to_string(input).map_err(|e| CheckError::io_at(input, &e))?
    } else {
        input.to_string()
    };

    emit(&run_transform(&code, config.value(), &oracle)?)?;
    Ok(Outcome::Success)
}

fn execute_compare(
    parse: &ParseArgs,
    original: &std::path::Path,
    transformed: &std::path::Path,
) -> Result<Outcome, CheckError> {
    let response = run_compare(original, transformed, &parse.options())?;
    emit(&response)?;
    Ok(if response.different {
        Outcome::Different
    } else {
        Outcome::Success
    })
}

fn execute_verify(
    global: &GlobalArgs,
    transform: &TransformArgs,
    parse: &ParseArgs,
    paths: &[PathBuf],
) -> Result<Outcome, CheckError> {
    let settings = resolve_settings(global, transform, None)?;
    let template = transform
        .transform_command
        .as_deref()
        .map(parse_command_template)
        .transpose()?;
    let oracle = build_oracle(&settings, template);
    let config = load_config(
        settings.engine.value.engine,
        transform.config.as_deref(),
        transform.flags_pointer.as_deref(),
    )?;

    let response = run_verify(paths, &config, &oracle, &parse.options())?;
    emit(&response)?;
    Ok(if response.failed > 0 {
        Outcome::Different
    } else {
        Outcome::Success
    })
}

fn execute_find_triggered_options(
    global: &GlobalArgs,
    transform: &TransformArgs,
    options: &DebugOptions,
    batch_size: Option<usize>,
    output: &std::path::Path,
    paths: &[PathBuf],
) -> Result<Outcome, CheckError> {
    let settings = resolve_settings(global, transform, batch_size)?;
    let template = transform
        .transform_command
        .as_deref()
        .map(parse_command_template)
        .transpose()?;
    let oracle = build_oracle(&settings, template);
    let config = load_config(
        settings.engine.value.engine,
        transform.config.as_deref(),
        transform.flags_pointer.as_deref(),
    )?;

    // A refused search must not truncate an existing summary.
    ensure_searchable(&config, options)?;
    let file = File::create(output)
        .map_err(|e| CheckError::io_at(output.display().to_string(), &e))?;
    let response = run_find_triggered_options(
        paths,
        &config,
        &oracle,
        options,
        settings.batch_size.value,
        BufWriter::new(file),
        &output.display().to_string(),
    )?;
    tracing::info!(
        "transformer cache: {} hits, {} misses",
        oracle.hits(),
        oracle.misses()
    );
    emit(&response)?;
    Ok(Outcome::Success)
}
