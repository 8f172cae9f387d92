//! Transform oracles: anything that turns source code plus a configuration
//! into transformed source code.
//!
//! The delta-debugger and the batch verifier only see the
//! [`TransformOracle`] trait. Two implementations ship here:
//!
//! - [`CommandOracle`] runs an external transformer (SWC, Terser, Babel) via
//!   a command template, usually through `npx`, which keeps its own package
//!   cache under the configured cache directory.
//! - [`CachingOracle`] memoizes another oracle, keyed by a SHA-256 digest of
//!   the code and the canonical configuration JSON.
//!
//! Closures with the right signature are oracles too, which is what the
//! tests use.
//!
//! ## Command Templates
//!
//! Each template argument may contain these placeholders:
//!
//! - `{config}` - path of a temporary JSON file holding the configuration
//! - `{version}` - engine version
//! - `{filename}` - file name reported to the transformer
//! - `{input}` - path of a temporary file holding the code
//!
//! When no argument mentions `{input}`, the code is piped on stdin.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

// ============================================================================
// Errors
// ============================================================================

/// Error from a single transformation.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The transformer ran and refused the input.
    #[error("{engine} rejected the input (exit code {status:?}): {stderr}")]
    Rejected {
        engine: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The transformer process could not be started.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The transformer did not finish in time and was killed.
    #[error("{engine} timed out after {timeout:?}")]
    Timeout { engine: String, timeout: Duration },

    /// Scratch files or process pipes failed.
    #[error("transform I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transformer setup is unusable.
    #[error("invalid transformer configuration: {message}")]
    Config { message: String },
}

impl TransformError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        TransformError::Config {
            message: message.into(),
        }
    }
}

// ============================================================================
// Oracle Trait
// ============================================================================

/// Produces transformed code for a given input and configuration.
///
/// Implementations must be re-invocable: calling `transform` twice with the
/// same arguments is allowed and expected.
pub trait TransformOracle {
    /// Transform `code` under `config`.
    fn transform(&self, code: &str, config: &Value) -> Result<String, TransformError>;

    /// Human-readable name used in logs and reports.
    fn describe(&self) -> String {
        "custom transformer".to_string()
    }

    /// Drop state kept for the current input. Batch drivers call this
    /// between inputs.
    fn reset(&self) {}
}

impl<F> TransformOracle for F
where
    F: Fn(&str, &Value) -> Result<String, TransformError>,
{
    fn transform(&self, code: &str, config: &Value) -> Result<String, TransformError> {
        self(code, config)
    }
}

// ============================================================================
// Engines
// ============================================================================

/// A supported transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Swc,
    Terser,
    Babel,
}

impl Engine {
    /// Name used in engine specs and logs.
    pub fn name(self) -> &'static str {
        match self {
            Engine::Swc => "swc",
            Engine::Terser => "terser",
            Engine::Babel => "babel",
        }
    }

    /// Version used when a spec names only the engine.
    pub fn default_version(self) -> &'static str {
        match self {
            Engine::Swc => "1.6.7",
            Engine::Terser => "5.31.5",
            Engine::Babel => "7.14.0",
        }
    }

    /// Pointer to the object holding this engine's boolean switches.
    pub fn flags_pointer(self) -> &'static str {
        match self {
            Engine::Swc => "/jsc/minify/compress",
            Engine::Terser => "/compress",
            Engine::Babel => "",
        }
    }

    /// Conventional configuration file name.
    pub fn config_file_name(self) -> &'static str {
        match self {
            Engine::Swc => ".swcrc",
            Engine::Terser => ".terserrc",
            Engine::Babel => ".babelrc",
        }
    }

    /// Configuration used when none is supplied.
    pub fn default_config(self) -> Value {
        match self {
            Engine::Swc => json!({
                "minify": true,
                "jsc": { "minify": { "compress": {}, "mangle": false } }
            }),
            Engine::Terser => json!({ "compress": {}, "mangle": false }),
            Engine::Babel => json!({ "compact": true, "comments": false }),
        }
    }

    /// Command template that runs this engine through `npx`.
    pub fn command_template(self) -> Vec<String> {
        let args: &[&str] = match self {
            Engine::Swc => &[
                "npx",
                "--yes",
                "-p",
                "@swc/core@{version}",
                "-p",
                "@swc/cli",
                "swc",
                "{input}",
                "--config-file",
                "{config}",
                "--filename",
                "{filename}",
            ],
            Engine::Terser => &[
                "npx",
                "--yes",
                "terser@{version}",
                "{input}",
                "--config-file",
                "{config}",
            ],
            Engine::Babel => &[
                "npx",
                "--yes",
                "-p",
                "@babel/core@{version}",
                "-p",
                "@babel/cli",
                "babel",
                "{input}",
                "--config-file",
                "{config}",
                "--filename",
                "{filename}",
            ],
        };
        args.iter().map(|arg| arg.to_string()).collect()
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error parsing an engine spec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineSpecError {
    #[error("unknown engine `{name}` (expected swc, terser, or babel)")]
    UnknownEngine { name: String },

    #[error("invalid engine version `{version}`")]
    InvalidVersion { version: String },
}

impl FromStr for Engine {
    type Err = EngineSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "swc" => Ok(Engine::Swc),
            "terser" => Ok(Engine::Terser),
            "babel" => Ok(Engine::Babel),
            other => Err(EngineSpecError::UnknownEngine {
                name: other.to_string(),
            }),
        }
    }
}

/// An engine pinned to a version, written `name@version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineSpec {
    pub engine: Engine,
    pub version: String,
}

impl EngineSpec {
    /// Pin `engine` to `version`.
    pub fn new(engine: Engine, version: impl Into<String>) -> Self {
        EngineSpec {
            engine,
            version: version.into(),
        }
    }
}

impl Default for EngineSpec {
    fn default() -> Self {
        EngineSpec::new(Engine::Swc, Engine::Swc.default_version())
    }
}

impl fmt::Display for EngineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.engine, self.version)
    }
}

fn is_valid_version(version: &str) -> bool {
    version.starts_with(|c: char| c.is_ascii_digit())
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
}

impl FromStr for EngineSpec {
    type Err = EngineSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = match s.trim().split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (s.trim(), None),
        };
        let engine: Engine = name.parse()?;
        let version = match version {
            Some(version) if is_valid_version(version) => version.to_string(),
            Some(version) => {
                return Err(EngineSpecError::InvalidVersion {
                    version: version.to_string(),
                })
            }
            None => engine.default_version().to_string(),
        };
        Ok(EngineSpec { engine, version })
    }
}

// ============================================================================
// Command Oracle
// ============================================================================

/// Default time allowed for one transformer run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const CONFIG_FILE_NAME: &str = "config.json";

/// Runs an external transformer process per call.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    label: String,
    template: Vec<String>,
    version: String,
    filename: String,
    timeout: Duration,
    cache_dir: Option<PathBuf>,
}

impl CommandOracle {
    /// Oracle for a pinned engine, using its `npx` template.
    pub fn for_engine(spec: &EngineSpec) -> Self {
        CommandOracle {
            label: spec.to_string(),
            template: spec.engine.command_template(),
            version: spec.version.clone(),
            filename: "input.js".to_string(),
            timeout: DEFAULT_TIMEOUT,
            cache_dir: None,
        }
    }

    /// Oracle for an arbitrary command template.
    pub fn from_template(label: impl Into<String>, template: Vec<String>) -> Self {
        CommandOracle {
            label: label.into(),
            template,
            version: String::new(),
            filename: "input.js".to_string(),
            timeout: DEFAULT_TIMEOUT,
            cache_dir: None,
        }
    }

    /// Set the per-run timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the package cache directory passed to `npx`.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// Set the file name reported to the transformer.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// The unexpanded command template.
    pub fn template(&self) -> &[String] {
        &self.template
    }

    fn reads_input_file(&self) -> bool {
        self.template.iter().any(|arg| arg.contains("{input}"))
    }

    /// Expand the template for one run.
    fn expand(&self, config_path: &Path, input_path: &Path) -> Vec<String> {
        let config = config_path.to_string_lossy();
        let input = input_path.to_string_lossy();
        self.template
            .iter()
            .map(|arg| {
                arg.replace("{config}", &config)
                    .replace("{input}", &input)
                    .replace("{version}", &self.version)
                    .replace("{filename}", &self.filename)
            })
            .collect()
    }
}

fn pump<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn collect(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> Result<Vec<u8>, TransformError> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| TransformError::Io(io::Error::other("output reader panicked")))?
            .map_err(TransformError::Io),
        None => Ok(Vec::new()),
    }
}

impl TransformOracle for CommandOracle {
    fn transform(&self, code: &str, config: &Value) -> Result<String, TransformError> {
        let Some(program) = self.template.first() else {
            return Err(TransformError::config("command template is empty"));
        };

        let scratch = tempfile::tempdir()?;
        let config_path = scratch.path().join(CONFIG_FILE_NAME);
        let input_path = scratch.path().join(&self.filename);
        let config_json = serde_json::to_vec_pretty(config)
            .map_err(|e| TransformError::config(format!("cannot serialize config: {e}")))?;
        fs::write(&config_path, config_json)?;

        let pipe_stdin = !self.reads_input_file();
        if !pipe_stdin {
            fs::write(&input_path, code)?;
        }

        let args = self.expand(&config_path, &input_path);
        let resolved = which::which(program).map_err(|e| TransformError::Spawn {
            program: program.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, e.to_string()),
        })?;

        let mut cmd = Command::new(&resolved);
        cmd.args(&args[1..])
            .current_dir(scratch.path())
            .stdin(if pipe_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cache_dir) = &self.cache_dir {
            cmd.env("npm_config_cache", cache_dir);
        }

        debug!("running {}: {:?}", self.label, args);
        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| TransformError::Spawn {
            program: program.clone(),
            source,
        })?;

        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = code.as_bytes().to_vec();
            thread::spawn(move || match stdin.write_all(&bytes) {
                Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            })
        });
        let stdout = child.stdout.take().map(pump);
        let stderr = child.stderr.take().map(pump);

        let Some(status) = child.wait_timeout(self.timeout)? else {
            let _ = child.kill();
            let _ = child.wait();
            warn!(
                "{} timed out after {:?} (limit: {:?})",
                self.label,
                start.elapsed(),
                self.timeout
            );
            return Err(TransformError::Timeout {
                engine: self.label.clone(),
                timeout: self.timeout,
            });
        };

        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| TransformError::Io(io::Error::other("input writer panicked")))??;
        }
        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;
        debug!("{} finished in {:?}", self.label, start.elapsed());

        if !status.success() {
            return Err(TransformError::Rejected {
                engine: self.label.clone(),
                status: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

// ============================================================================
// Caching Oracle
// ============================================================================

/// Memoizes successful transformations of another oracle.
///
/// Failures are returned as-is and not remembered, so a flaky run can
/// succeed on retry.
pub struct CachingOracle<O> {
    inner: O,
    entries: RefCell<HashMap<String, String>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl<O: TransformOracle> CachingOracle<O> {
    /// Wrap `inner` with an empty cache.
    pub fn new(inner: O) -> Self {
        CachingOracle {
            inner,
            entries: RefCell::new(HashMap::new()),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// Number of calls answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.get()
    }

    /// Number of calls forwarded to the wrapped oracle.
    pub fn misses(&self) -> u64 {
        self.misses.get()
    }

    /// Number of cached outputs.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// The wrapped oracle.
    pub fn inner(&self) -> &O {
        &self.inner
    }

    /// Forget every cached output. Counters are kept.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

/// Cache key: SHA-256 over the code and the canonical configuration.
///
/// `serde_json` objects keep keys sorted, so equal configurations render to
/// identical text.
pub fn cache_key(code: &str, config: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.update([0u8]);
    hasher.update(config.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

impl<O: TransformOracle> TransformOracle for CachingOracle<O> {
    fn transform(&self, code: &str, config: &Value) -> Result<String, TransformError> {
        let key = cache_key(code, config);
        if let Some(output) = self.entries.borrow().get(&key) {
            self.hits.set(self.hits.get() + 1);
            return Ok(output.clone());
        }
        self.misses.set(self.misses.get() + 1);
        let output = self.inner.transform(code, config)?;
        self.entries.borrow_mut().insert(key, output.clone());
        Ok(output)
    }

    fn describe(&self) -> String {
        format!("{} (cached)", self.inner.describe())
    }

    fn reset(&self) {
        self.clear();
        self.inner.reset();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod engines {
        use super::*;

        #[test]
        fn parses_name_and_version() {
            let spec: EngineSpec = "terser@5.31.5".parse().expect("valid spec");
            assert_eq!(spec, EngineSpec::new(Engine::Terser, "5.31.5"));
            assert_eq!(spec.to_string(), "terser@5.31.5");
        }

        #[test]
        fn bare_name_uses_default_version() {
            let spec: EngineSpec = "SWC".parse().expect("valid spec");
            assert_eq!(spec, EngineSpec::default());
            assert_eq!(spec.to_string(), "swc@1.6.7");
        }

        #[test]
        fn rejects_unknown_engine() {
            assert_eq!(
                "esbuild@0.20.0".parse::<EngineSpec>(),
                Err(EngineSpecError::UnknownEngine {
                    name: "esbuild".to_string()
                })
            );
        }

        #[test]
        fn rejects_malformed_version() {
            assert!(matches!(
                "swc@latest".parse::<EngineSpec>(),
                Err(EngineSpecError::InvalidVersion { .. })
            ));
            assert!(matches!(
                "swc@".parse::<EngineSpec>(),
                Err(EngineSpecError::InvalidVersion { .. })
            ));
        }

        #[test]
        fn default_configs_contain_flags_object() {
            for engine in [Engine::Swc, Engine::Terser] {
                let config = engine.default_config();
                assert!(
                    config.pointer(engine.flags_pointer()).is_some_and(Value::is_object),
                    "{engine} default config lacks its flags object"
                );
            }
        }

        #[test]
        fn templates_mention_version_and_config() {
            for engine in [Engine::Swc, Engine::Terser, Engine::Babel] {
                let template = engine.command_template();
                assert_eq!(template[0], "npx");
                assert!(template.iter().any(|a| a.contains("{version}")));
                assert!(template.iter().any(|a| a == "{config}"));
            }
        }
    }

    mod closures {
        use super::*;

        #[test]
        fn closure_is_an_oracle() {
            let upper = |code: &str, _config: &Value| -> Result<String, TransformError> {
                Ok(code.to_uppercase())
            };
            let oracle: &dyn TransformOracle = &upper;
            assert_eq!(oracle.transform("abc", &json!({})).expect("ok"), "ABC");
            assert_eq!(oracle.describe(), "custom transformer");
        }
    }

    mod caching {
        use super::*;

        #[test]
        fn repeated_calls_hit_the_cache() {
            let calls = Cell::new(0);
            let counting = |code: &str, _config: &Value| -> Result<String, TransformError> {
                calls.set(calls.get() + 1);
                Ok(format!("{code};"))
            };
            let oracle = CachingOracle::new(counting);

            let config = json!({"compress": {"a": true}});
            assert_eq!(oracle.transform("x", &config).expect("ok"), "x;");
            assert_eq!(oracle.transform("x", &config).expect("ok"), "x;");
            assert_eq!(calls.get(), 1);
            assert_eq!((oracle.hits(), oracle.misses()), (1, 1));

            oracle
                .transform("x", &json!({"compress": {"a": false}}))
                .expect("ok");
            assert_eq!(calls.get(), 2);
            assert_eq!(oracle.len(), 2);
        }

        #[test]
        fn failures_are_not_cached() {
            let calls = Cell::new(0);
            let flaky = |_code: &str, _config: &Value| -> Result<String, TransformError> {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    Err(TransformError::config("first call fails"))
                } else {
                    Ok("done".to_string())
                }
            };
            let oracle = CachingOracle::new(flaky);
            assert!(oracle.transform("x", &json!({})).is_err());
            assert_eq!(oracle.transform("x", &json!({})).expect("ok"), "done");
            assert!(!oracle.is_empty());
        }

        #[test]
        fn reset_empties_the_cache_and_keeps_counters() {
            let upper = |code: &str, _config: &Value| -> Result<String, TransformError> {
                Ok(code.to_uppercase())
            };
            let oracle = CachingOracle::new(upper);
            oracle.transform("a", &json!({})).expect("ok");
            oracle.transform("a", &json!({})).expect("ok");
            assert_eq!(oracle.len(), 1);

            TransformOracle::reset(&oracle);
            assert!(oracle.is_empty());
            assert_eq!((oracle.hits(), oracle.misses()), (1, 1));

            oracle.transform("a", &json!({})).expect("ok");
            assert_eq!(oracle.misses(), 2);
        }

        #[test]
        fn key_ignores_object_key_order() {
            let a: Value = serde_json::from_str(r#"{"b": 1, "a": 2}"#).expect("json");
            let b: Value = serde_json::from_str(r#"{"a": 2, "b": 1}"#).expect("json");
            assert_eq!(cache_key("code", &a), cache_key("code", &b));
            assert_ne!(cache_key("code", &a), cache_key("code2", &a));
            assert_eq!(cache_key("code", &a).len(), 64);
        }
    }

    #[cfg(unix)]
    mod commands {
        use super::*;

        fn shell(script: &str) -> CommandOracle {
            CommandOracle::from_template(
                "shell",
                vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            )
        }

        #[test]
        fn pipes_code_on_stdin_and_trims_output() {
            let oracle = shell("cat; echo");
            let output = oracle.transform("  let a = 1;  ", &json!({})).expect("runs");
            assert_eq!(output, "let a = 1;");
        }

        #[test]
        fn writes_input_and_config_files() {
            let oracle = shell("cat {input}; cat {config}");
            let output = oracle
                .transform("f();", &json!({"compress": {"inline": true}}))
                .expect("runs");
            assert!(output.starts_with("f();"));
            assert!(output.contains("\"inline\": true"));
        }

        #[test]
        fn expands_version_and_filename() {
            let oracle = CommandOracle::for_engine(&EngineSpec::new(Engine::Swc, "1.2.3"));
            let args = oracle.expand(Path::new("/tmp/c.json"), Path::new("/tmp/input.js"));
            assert!(args.contains(&"@swc/core@1.2.3".to_string()));
            assert!(args.contains(&"/tmp/c.json".to_string()));
            assert!(args.contains(&"input.js".to_string()));
        }

        #[test]
        fn non_zero_exit_is_rejected() {
            let err = shell("echo 'bad input' >&2; exit 3")
                .transform("x", &json!({}))
                .unwrap_err();
            match err {
                TransformError::Rejected { status, stderr, .. } => {
                    assert_eq!(status, Some(3));
                    assert_eq!(stderr, "bad input");
                }
                other => panic!("expected Rejected, got {other:?}"),
            }
        }

        #[test]
        fn slow_command_times_out() {
            let oracle = CommandOracle::from_template(
                "sleeper",
                vec!["sleep".to_string(), "5".to_string()],
            )
            .with_timeout(Duration::from_millis(100));
            let err = oracle.transform("x", &json!({})).unwrap_err();
            assert!(matches!(err, TransformError::Timeout { .. }), "got {err:?}");
        }

        #[test]
        fn missing_program_is_a_spawn_error() {
            let oracle = CommandOracle::from_template(
                "missing",
                vec!["minicheck-no-such-program".to_string()],
            );
            let err = oracle.transform("x", &json!({})).unwrap_err();
            assert!(matches!(err, TransformError::Spawn { .. }), "got {err:?}");
        }

        #[test]
        fn empty_template_is_a_config_error() {
            let oracle = CommandOracle::from_template("empty", Vec::new());
            let err = oracle.transform("x", &json!({})).unwrap_err();
            assert!(matches!(err, TransformError::Config { .. }));
        }

        #[test]
        fn cache_dir_is_exported_to_npm() {
            let oracle = shell("printf %s \"$npm_config_cache\"").with_cache_dir("/tmp/mc-cache");
            let output = oracle.transform("", &json!({})).expect("runs");
            assert_eq!(output, "/tmp/mc-cache");
        }
    }
}
