//! Tool settings with precedence tracking.
//!
//! Settings come from three layers, lowest to highest precedence:
//!
//! 1. built-in defaults
//! 2. environment variables
//! 3. command-line flags
//!
//! | Setting | Variable | Default |
//! |---------|----------|---------|
//! | engine | `MINICHECK_ENGINE` | `swc@1.6.7` |
//! | cache directory | `MINICHECK_CACHE_DIR` (or `MINIFY_RUNNER_CACHE_DIR`) | `~/.cache/minicheck` |
//! | transform timeout | `MINICHECK_TIMEOUT_SECS` | 60 |
//! | summary batch size | `MINICHECK_BATCH_SIZE` | 100 |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::oracle::{EngineSpec, DEFAULT_TIMEOUT};
use crate::summary::DEFAULT_BATCH_SIZE;

pub const ENGINE_VAR: &str = "MINICHECK_ENGINE";
pub const CACHE_DIR_VAR: &str = "MINICHECK_CACHE_DIR";
pub const LEGACY_CACHE_DIR_VAR: &str = "MINIFY_RUNNER_CACHE_DIR";
pub const TIMEOUT_VAR: &str = "MINICHECK_TIMEOUT_SECS";
pub const BATCH_SIZE_VAR: &str = "MINICHECK_BATCH_SIZE";

// ============================================================================
// Configuration Sources
// ============================================================================

/// Where a setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    /// Built-in default value.
    Default = 0,
    /// From environment variable.
    EnvVar = 1,
    /// From CLI flag (highest precedence).
    CliFlag = 2,
}

/// A setting together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Merge with another value, preferring higher precedence.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source {
            other
        } else {
            self
        }
    }
}

/// A setting value that could not be used.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value `{value}` for {origin}: {message}")]
pub struct SettingsError {
    /// Variable or flag name.
    pub origin: String,
    pub value: String,
    pub message: String,
}

// ============================================================================
// Resolution
// ============================================================================

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// `--engine`.
    pub engine: Option<EngineSpec>,
    /// `--cache-dir`.
    pub cache_dir: Option<PathBuf>,
    /// `--timeout` in seconds.
    pub timeout_secs: Option<u64>,
    /// `--batch-size`.
    pub batch_size: Option<usize>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub engine: ConfigValue<EngineSpec>,
    pub cache_dir: ConfigValue<PathBuf>,
    pub timeout: ConfigValue<Duration>,
    pub batch_size: ConfigValue<usize>,
}

/// Cache directory used when none is configured.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".cache").join("minicheck"))
        .or_else(|| dirs::cache_dir().map(|cache| cache.join("minicheck")))
        .unwrap_or_else(|| std::env::temp_dir().join("minicheck-cache"))
}

fn invalid(origin: &str, value: &str, message: impl Into<String>) -> SettingsError {
    SettingsError {
        origin: origin.to_string(),
        value: value.to_string(),
        message: message.into(),
    }
}

fn parse_count(origin: &str, raw: &str) -> Result<u64, SettingsError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(invalid(origin, raw, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(origin, raw, e.to_string())),
    }
}

impl ResolvedSettings {
    /// Built-in defaults only.
    pub fn defaults() -> Self {
        ResolvedSettings {
            engine: ConfigValue::new(EngineSpec::default(), ConfigSource::Default),
            cache_dir: ConfigValue::new(default_cache_dir(), ConfigSource::Default),
            timeout: ConfigValue::new(DEFAULT_TIMEOUT, ConfigSource::Default),
            batch_size: ConfigValue::new(DEFAULT_BATCH_SIZE, ConfigSource::Default),
        }
    }

    /// Resolve from the process environment and `cli`.
    pub fn resolve(cli: &CliOverrides) -> Result<Self, SettingsError> {
        ResolvedSettings::resolve_with(|name| std::env::var(name).ok(), cli)
    }

    /// Resolve using `env` to look up variables.
    pub fn resolve_with(
        env: impl Fn(&str) -> Option<String>,
        cli: &CliOverrides,
    ) -> Result<Self, SettingsError> {
        let mut settings = ResolvedSettings::defaults();
        settings.apply_env_vars(&env)?;
        settings.apply_cli_overrides(cli);
        debug!(
            "settings: engine={} ({:?}), cache_dir={} ({:?})",
            settings.engine.value,
            settings.engine.source,
            settings.cache_dir.value.display(),
            settings.cache_dir.source
        );
        Ok(settings)
    }

    fn apply_env_vars(
        &mut self,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        let lookup = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        if let Some(raw) = lookup(ENGINE_VAR) {
            let spec = raw
                .parse::<EngineSpec>()
                .map_err(|e| invalid(ENGINE_VAR, &raw, e.to_string()))?;
            self.engine = self
                .engine
                .clone()
                .merge(ConfigValue::new(spec, ConfigSource::EnvVar));
        }

        if let Some(dir) = lookup(CACHE_DIR_VAR).or_else(|| lookup(LEGACY_CACHE_DIR_VAR)) {
            self.cache_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::EnvVar);
        }

        if let Some(raw) = lookup(TIMEOUT_VAR) {
            let secs = parse_count(TIMEOUT_VAR, &raw)?;
            self.timeout = ConfigValue::new(Duration::from_secs(secs), ConfigSource::EnvVar);
        }

        if let Some(raw) = lookup(BATCH_SIZE_VAR) {
            let size = parse_count(BATCH_SIZE_VAR, &raw)?;
            let size = usize::try_from(size)
                .map_err(|e| invalid(BATCH_SIZE_VAR, &raw, e.to_string()))?;
            self.batch_size = ConfigValue::new(size, ConfigSource::EnvVar);
        }

        Ok(())
    }

    fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(ref engine) = cli.engine {
            self.engine = ConfigValue::new(engine.clone(), ConfigSource::CliFlag);
        }
        if let Some(ref dir) = cli.cache_dir {
            self.cache_dir = ConfigValue::new(dir.clone(), ConfigSource::CliFlag);
        }
        if let Some(secs) = cli.timeout_secs {
            self.timeout = ConfigValue::new(Duration::from_secs(secs), ConfigSource::CliFlag);
        }
        if let Some(size) = cli.batch_size {
            self.batch_size = ConfigValue::new(size, ConfigSource::CliFlag);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
