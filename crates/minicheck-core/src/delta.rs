//! Option delta-debugging.
//!
//! Given an input program, a transformer configuration, and an oracle, find
//! the boolean flags whose value changes the transformer's output. The
//! baseline output is produced once with the configuration as given; every
//! probe then runs on its own modified copy, so the caller's configuration
//! is never touched.
//!
//! Two strategies exist:
//!
//! - [`Strategy::Linear`] flips each candidate flag on its own and reports
//!   the ones whose flip changes the output.
//! - [`Strategy::PowerSet`] tries every assignment of the candidate flags and
//!   reports, for each assignment that changes the output, the set of flags
//!   that differ from the configuration. Cost is `2^n` transformer runs, so
//!   the candidate count is capped.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ConfigRecord;
use crate::oracle::{TransformError, TransformOracle};

/// Flags whose names start with this prefix are skipped unless requested.
pub const UNSAFE_PREFIX: &str = "unsafe";

/// Default cap on power-set candidates (65 536 probes).
pub const DEFAULT_MAX_POWER_SET_FLAGS: usize = 16;

/// Assignments are enumerated as bits of a `u64`.
const MAX_MASK_BITS: usize = 63;

// ============================================================================
// Options and Results
// ============================================================================

/// Search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One probe per flag.
    #[default]
    Linear,
    /// One probe per assignment of all candidate flags.
    PowerSet,
}

/// Knobs for [`find_triggered_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugOptions {
    /// Also consider flags named `unsafe*`.
    pub include_unsafe: bool,
    /// Search strategy.
    pub strategy: Strategy,
    /// Upper bound on candidates for [`Strategy::PowerSet`].
    pub max_power_set_flags: usize,
}

impl Default for DebugOptions {
    fn default() -> Self {
        DebugOptions {
            include_unsafe: false,
            strategy: Strategy::Linear,
            max_power_set_flags: DEFAULT_MAX_POWER_SET_FLAGS,
        }
    }
}

/// Flags found to change the output.
///
/// Serializes as a JSON array of names (linear) or an array of name arrays
/// (power set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggeredOptions {
    Linear(Vec<String>),
    PowerSet(Vec<BTreeSet<String>>),
}

impl TriggeredOptions {
    /// An empty result of the shape `strategy` produces.
    pub fn empty(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Linear => TriggeredOptions::Linear(Vec::new()),
            Strategy::PowerSet => TriggeredOptions::PowerSet(Vec::new()),
        }
    }

    /// Number of entries (flags or flag sets).
    pub fn len(&self) -> usize {
        match self {
            TriggeredOptions::Linear(flags) => flags.len(),
            TriggeredOptions::PowerSet(sets) => sets.len(),
        }
    }

    /// Whether nothing was found.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every flag mentioned anywhere in the result.
    pub fn flags(&self) -> BTreeSet<&str> {
        match self {
            TriggeredOptions::Linear(flags) => flags.iter().map(String::as_str).collect(),
            TriggeredOptions::PowerSet(sets) => {
                sets.iter().flatten().map(String::as_str).collect()
            }
        }
    }
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Output differs from the baseline; carries the new output.
    Changed(String),
    /// Output matches the baseline.
    Unchanged,
    /// The transformer failed; carries the error message.
    ProbeFailed(String),
}

/// Error from the delta-debugger itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeltaError {
    #[error("power-set search over {count} flags exceeds the limit of {limit}")]
    TooManyFlags { count: usize, limit: usize },
}

// ============================================================================
// Probing
// ============================================================================

/// Transform `code` under the unmodified configuration; output is trimmed.
pub fn baseline(
    code: &str,
    config: &ConfigRecord,
    oracle: &dyn TransformOracle,
) -> Result<String, TransformError> {
    oracle
        .transform(code, config.value())
        .map(|output| output.trim().to_string())
}

/// Transform `code` under `config` and compare with `baseline`.
///
/// Comparison is exact string equality after trimming.
pub fn probe(
    code: &str,
    config: &Value,
    oracle: &dyn TransformOracle,
    baseline: &str,
) -> ProbeOutcome {
    match oracle.transform(code, config) {
        Ok(output) => {
            let output = output.trim();
            if output == baseline {
                ProbeOutcome::Unchanged
            } else {
                ProbeOutcome::Changed(output.to_string())
            }
        }
        Err(err) => ProbeOutcome::ProbeFailed(err.to_string()),
    }
}

/// Boolean flags eligible for the search, in key order.
pub fn candidate_flags(config: &ConfigRecord, options: &DebugOptions) -> Vec<(String, bool)> {
    config
        .boolean_flags()
        .into_iter()
        .filter(|(name, _)| options.include_unsafe || !name.starts_with(UNSAFE_PREFIX))
        .collect()
}

// ============================================================================
// Search
// ============================================================================

/// Check that a search over `config` is within the power-set cap.
///
/// Linear searches always pass. Callers can run this before creating any
/// output so a refused search leaves nothing behind.
pub fn ensure_searchable(
    config: &ConfigRecord,
    options: &DebugOptions,
) -> Result<(), DeltaError> {
    check_candidate_count(candidate_flags(config, options).len(), options)
}

fn check_candidate_count(count: usize, options: &DebugOptions) -> Result<(), DeltaError> {
    let limit = options.max_power_set_flags.min(MAX_MASK_BITS);
    if options.strategy == Strategy::PowerSet && count > limit {
        return Err(DeltaError::TooManyFlags { count, limit });
    }
    Ok(())
}

/// Find the flags of `config` that change how `oracle` transforms `code`.
///
/// If the baseline transformation fails, the input is skipped: a warning is
/// logged and an empty result is returned. Failed probes are logged and left
/// out of the result.
pub fn find_triggered_options(
    code: &str,
    config: &ConfigRecord,
    oracle: &dyn TransformOracle,
    options: &DebugOptions,
) -> Result<TriggeredOptions, DeltaError> {
    let candidates = candidate_flags(config, options);
    check_candidate_count(candidates.len(), options)?;

    let baseline = match baseline(code, config, oracle) {
        Ok(output) => output,
        Err(err) => {
            warn!(
                "skipping input: baseline transform with {} failed: {}",
                oracle.describe(),
                err
            );
            return Ok(TriggeredOptions::empty(options.strategy));
        }
    };

    debug!(
        "searching {} candidate flags ({:?})",
        candidates.len(),
        options.strategy
    );
    Ok(match options.strategy {
        Strategy::Linear => linear(code, config, oracle, &candidates, &baseline),
        Strategy::PowerSet => power_set(code, config, oracle, &candidates, &baseline),
    })
}

fn linear(
    code: &str,
    config: &ConfigRecord,
    oracle: &dyn TransformOracle,
    candidates: &[(String, bool)],
    baseline: &str,
) -> TriggeredOptions {
    let mut triggered = Vec::new();
    for (name, value) in candidates {
        let flipped = config.with_flag(name, !value);
        match probe(code, &flipped, oracle, baseline) {
            ProbeOutcome::Changed(_) => {
                debug!("{} = {} changes output", name, !value);
                triggered.push(name.clone());
            }
            ProbeOutcome::Unchanged => {}
            ProbeOutcome::ProbeFailed(message) => {
                warn!("probe {} = {} failed: {}", name, !value, message);
            }
        }
    }
    TriggeredOptions::Linear(triggered)
}

fn power_set(
    code: &str,
    config: &ConfigRecord,
    oracle: &dyn TransformOracle,
    candidates: &[(String, bool)],
    baseline: &str,
) -> TriggeredOptions {
    let mut triggered = Vec::new();
    let assignments = 1u64 << candidates.len();
    for mask in 0..assignments {
        let overrides: Vec<(&str, bool)> = candidates
            .iter()
            .enumerate()
            .map(|(bit, (name, _))| (name.as_str(), mask & (1 << bit) != 0))
            .collect();
        let assignment = config.with_flags(&overrides);

        match probe(code, &assignment, oracle, baseline) {
            ProbeOutcome::Changed(_) => {
                let differing: BTreeSet<String> = candidates
                    .iter()
                    .zip(&overrides)
                    .filter(|((_, original), (_, assigned))| original != assigned)
                    .map(|((name, _), _)| name.clone())
                    .collect();
                debug!("assignment {:#b} changes output: {:?}", mask, differing);
                triggered.push(differing);
            }
            ProbeOutcome::Unchanged => {}
            ProbeOutcome::ProbeFailed(message) => {
                warn!("probe for assignment {:#b} failed: {}", mask, message);
            }
        }
    }
    TriggeredOptions::PowerSet(triggered)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn flag(config: &Value, name: &str) -> bool {
        config
            .pointer(&format!("/compress/{name}"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn record(flags: Value) -> ConfigRecord {
        ConfigRecord::new(json!({ "compress": flags, "mangle": false }), "/compress")
            .expect("valid pointer")
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    /// Appends a marker for each enabled flag listed in `sensitive`.
    fn sensitive_to(
        sensitive: &'static [&'static str],
    ) -> impl Fn(&str, &Value) -> Result<String, TransformError> {
        move |code: &str, config: &Value| -> Result<String, TransformError> {
            let mut output = code.to_string();
            for name in sensitive {
                if flag(config, name) {
                    output.push_str(&format!(" /*{name}*/"));
                }
            }
            Ok(output)
        }
    }

    mod probing {
        use super::*;

        #[test]
        fn probe_compares_trimmed_output() {
            let padded = |code: &str, _c: &Value| -> Result<String, TransformError> {
                Ok(format!("\n  {code}  \n"))
            };
            assert_eq!(probe("x", &json!({}), &padded, "x"), ProbeOutcome::Unchanged);
            assert_eq!(
                probe("y", &json!({}), &padded, "x"),
                ProbeOutcome::Changed("y".to_string())
            );
        }

        #[test]
        fn probe_reports_failures() {
            let failing = |_code: &str, _c: &Value| -> Result<String, TransformError> {
                Err(TransformError::config("boom"))
            };
            assert!(matches!(
                probe("x", &json!({}), &failing, "x"),
                ProbeOutcome::ProbeFailed(message) if message.contains("boom")
            ));
        }

        #[test]
        fn unsafe_flags_are_filtered_unless_requested() {
            let config = record(json!({"a": true, "unsafe_math": false, "passes": 2}));
            let names = |options: &DebugOptions| -> Vec<String> {
                candidate_flags(&config, options)
                    .into_iter()
                    .map(|(name, _)| name)
                    .collect()
            };
            assert_eq!(names(&DebugOptions::default()), vec!["a"]);
            let with_unsafe = DebugOptions {
                include_unsafe: true,
                ..DebugOptions::default()
            };
            assert_eq!(names(&with_unsafe), vec!["a", "unsafe_math"]);
        }
    }

    mod linear_search {
        use super::*;

        #[test]
        fn reports_flags_whose_flip_changes_output() {
            let config = record(json!({"a": false, "b": false, "c": true}));
            let oracle = sensitive_to(&["a", "c"]);
            let result =
                find_triggered_options("f()", &config, &oracle, &DebugOptions::default())
                    .expect("search runs");
            assert_eq!(
                result,
                TriggeredOptions::Linear(vec!["a".to_string(), "c".to_string()])
            );
        }

        #[test]
        fn config_is_unchanged_after_search() {
            let config = record(json!({"a": false, "b": true, "unsafe_x": false}));
            let before = config.clone();
            let oracle = sensitive_to(&["a", "b"]);
            for strategy in [Strategy::Linear, Strategy::PowerSet] {
                let options = DebugOptions {
                    strategy,
                    include_unsafe: true,
                    ..DebugOptions::default()
                };
                find_triggered_options("f()", &config, &oracle, &options).expect("runs");
                assert_eq!(config, before);
            }
        }

        #[test]
        fn failed_probes_are_skipped() {
            let config = record(json!({"a": false, "b": false}));
            let oracle = |code: &str, config: &Value| -> Result<String, TransformError> {
                if flag(config, "b") {
                    return Err(TransformError::config("b breaks the transformer"));
                }
                sensitive_to(&["a"])(code, config)
            };
            let result =
                find_triggered_options("f()", &config, &oracle, &DebugOptions::default())
                    .expect("runs");
            assert_eq!(result, TriggeredOptions::Linear(vec!["a".to_string()]));
        }

        #[test]
        fn baseline_failure_yields_empty_result() {
            let config = record(json!({"a": false}));
            let calls = Cell::new(0);
            let broken = |_code: &str, _c: &Value| -> Result<String, TransformError> {
                calls.set(calls.get() + 1);
                Err(TransformError::config("cannot parse input"))
            };
            for strategy in [Strategy::Linear, Strategy::PowerSet] {
                let options = DebugOptions {
                    strategy,
                    ..DebugOptions::default()
                };
                let result =
                    find_triggered_options("f(", &config, &broken, &options).expect("runs");
                assert_eq!(result, TriggeredOptions::empty(strategy));
            }
            assert_eq!(calls.get(), 2, "only the baselines should run");
        }

        #[test]
        fn no_boolean_flags_means_nothing_to_report() {
            let config = record(json!({"passes": 3}));
            let result = find_triggered_options(
                "f()",
                &config,
                &sensitive_to(&[]),
                &DebugOptions::default(),
            )
            .expect("runs");
            assert!(result.is_empty());
        }
    }

    mod power_set_search {
        use super::*;

        fn power_set_options() -> DebugOptions {
            DebugOptions {
                strategy: Strategy::PowerSet,
                ..DebugOptions::default()
            }
        }

        #[test]
        fn reports_every_changing_assignment() {
            let config = record(json!({"a": false, "b": false}));
            let oracle = sensitive_to(&["a"]);
            let result =
                find_triggered_options("f()", &config, &oracle, &power_set_options())
                    .expect("runs");
            assert_eq!(
                result,
                TriggeredOptions::PowerSet(vec![set(&["a"]), set(&["a", "b"])])
            );
        }

        #[test]
        fn linear_flags_appear_in_power_set_result() {
            let config = record(json!({"a": false, "b": true, "c": false}));
            let oracle = sensitive_to(&["b", "c"]);
            let linear = find_triggered_options("f()", &config, &oracle, &DebugOptions::default())
                .expect("runs");
            let power = find_triggered_options("f()", &config, &oracle, &power_set_options())
                .expect("runs");
            assert!(linear.flags().is_subset(&power.flags()));
            assert!(power.len() >= linear.len());
        }

        #[test]
        fn dependent_flag_only_shows_in_power_set() {
            // `b` matters only while `a` is on.
            let config = record(json!({"a": false, "b": false}));
            let oracle = |code: &str, config: &Value| -> Result<String, TransformError> {
                let marker = match (flag(config, "a"), flag(config, "b")) {
                    (true, true) => "AB",
                    (true, false) => "A",
                    _ => "",
                };
                Ok(format!("{code}{marker}"))
            };

            let linear = find_triggered_options("f()", &config, &oracle, &DebugOptions::default())
                .expect("runs");
            assert_eq!(linear, TriggeredOptions::Linear(vec!["a".to_string()]));

            let power = find_triggered_options("f()", &config, &oracle, &power_set_options())
                .expect("runs");
            match &power {
                TriggeredOptions::PowerSet(sets) => assert!(sets.contains(&set(&["a", "b"]))),
                other => panic!("expected a power-set result, got {other:?}"),
            }
            assert_eq!(
                power,
                TriggeredOptions::PowerSet(vec![set(&["a"]), set(&["a", "b"])])
            );
        }

        #[test]
        fn probes_every_assignment_once() {
            let config = record(json!({"a": false, "b": false, "c": false}));
            let calls = Cell::new(0);
            let counting = |code: &str, _c: &Value| -> Result<String, TransformError> {
                calls.set(calls.get() + 1);
                Ok(code.to_string())
            };
            find_triggered_options("f()", &config, &counting, &power_set_options())
                .expect("runs");
            assert_eq!(calls.get(), 1 + 8);
        }

        #[test]
        fn unsafe_filter_applies_to_power_set() {
            let config = record(json!({"a": false, "unsafe_b": false}));
            let oracle = sensitive_to(&["unsafe_b"]);
            let result =
                find_triggered_options("f()", &config, &oracle, &power_set_options())
                    .expect("runs");
            assert!(result.is_empty());
        }

        #[test]
        fn too_many_flags_is_an_error() {
            let config = record(json!({"a": false, "b": false, "c": false}));
            let options = DebugOptions {
                max_power_set_flags: 2,
                ..power_set_options()
            };
            let err = find_triggered_options("f()", &config, &sensitive_to(&[]), &options)
                .unwrap_err();
            assert_eq!(err, DeltaError::TooManyFlags { count: 3, limit: 2 });
            assert_eq!(ensure_searchable(&config, &options), Err(err));
            assert_eq!(
                ensure_searchable(&config, &DebugOptions::default()),
                Ok(())
            );
        }
    }

    mod serialization {
        use super::*;

        #[test]
        fn linear_result_is_a_name_array() {
            let result = TriggeredOptions::Linear(vec!["dead_code".to_string()]);
            assert_eq!(serde_json::to_value(&result).expect("json"), json!(["dead_code"]));
        }

        #[test]
        fn power_set_result_is_an_array_of_name_arrays() {
            let result = TriggeredOptions::PowerSet(vec![set(&["b", "a"]), set(&["c"])]);
            assert_eq!(
                serde_json::to_value(&result).expect("json"),
                json!([["a", "b"], ["c"]])
            );
        }
    }
}
