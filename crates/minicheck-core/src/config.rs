//! Transformer configuration records.
//!
//! A [`ConfigRecord`] wraps a transformer's JSON configuration together with
//! a JSON pointer naming the object that holds its boolean switches
//! (`/jsc/minify/compress` for SWC, `/compress` for Terser). The record is
//! never modified after construction; overrides always produce a new value.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

/// Error loading a configuration record.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The flags pointer is not a JSON pointer.
    #[error("invalid flags pointer `{pointer}`: must be empty or start with '/'")]
    InvalidPointer { pointer: String },
}

/// A transformer configuration and the location of its boolean flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRecord {
    value: Value,
    flags_pointer: String,
}

impl ConfigRecord {
    /// Wrap an in-memory configuration.
    pub fn new(value: Value, flags_pointer: impl Into<String>) -> Result<Self, ConfigError> {
        let flags_pointer = flags_pointer.into();
        if !flags_pointer.is_empty() && !flags_pointer.starts_with('/') {
            return Err(ConfigError::InvalidPointer {
                pointer: flags_pointer,
            });
        }
        Ok(ConfigRecord {
            value,
            flags_pointer,
        })
    }

    /// Read a JSON configuration file such as `.swcrc` or `.terserrc`.
    pub fn load(path: &Path, flags_pointer: impl Into<String>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        ConfigRecord::new(value, flags_pointer)
    }

    /// The full configuration.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Pointer to the object holding boolean flags.
    pub fn flags_pointer(&self) -> &str {
        &self.flags_pointer
    }

    /// Boolean entries of the flags object, in key order.
    ///
    /// Non-boolean entries are not candidates and are skipped. A missing or
    /// non-object flags location yields no flags.
    pub fn boolean_flags(&self) -> Vec<(String, bool)> {
        self.value
            .pointer(&self.flags_pointer)
            .and_then(Value::as_object)
            .map(|flags| {
                flags
                    .iter()
                    .filter_map(|(name, value)| value.as_bool().map(|b| (name.clone(), b)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current value of one boolean flag.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.value
            .pointer(&self.flags_pointer)
            .and_then(|flags| flags.get(name))
            .and_then(Value::as_bool)
    }

    /// A copy of the configuration with one flag overridden.
    pub fn with_flag(&self, name: &str, value: bool) -> Value {
        self.with_flags(&[(name, value)])
    }

    /// A copy of the configuration with several flags overridden.
    ///
    /// Missing intermediate objects along the flags pointer are created.
    pub fn with_flags<S: AsRef<str>>(&self, overrides: &[(S, bool)]) -> Value {
        let mut copy = self.value.clone();
        if overrides.is_empty() {
            return copy;
        }
        if let Some(flags) = object_at_mut(&mut copy, &self.flags_pointer) {
            for (name, value) in overrides {
                flags.insert(name.as_ref().to_string(), Value::Bool(*value));
            }
        }
        copy
    }
}

/// Walk `pointer`, creating empty objects where the path is missing.
///
/// Returns `None` when an existing value along the path is not an object.
fn object_at_mut<'a>(
    value: &'a mut Value,
    pointer: &str,
) -> Option<&'a mut serde_json::Map<String, Value>> {
    let mut current = value;
    for token in pointer.split('/').skip(1) {
        let key = token.replace("~1", "/").replace("~0", "~");
        current = current
            .as_object_mut()?
            .entry(key)
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    current.as_object_mut()
}

// ============================================================================
// Tests
// ============================================================================
