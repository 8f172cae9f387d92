//! Structural equivalence of syntax trees.
//!
//! Two programs are considered equivalent when their trees have the same
//! shape once lexical detail is erased: identifier names, literal spellings
//! and template text never count, but a removed, reordered, or restructured
//! statement does, and so does a changed operator.
//!
//! The walk is order-preserving and stops at the first difference. The
//! [`Divergence`] it reports carries the path to that difference, which the
//! batch tools print next to failing files.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::{Node, Tree};
use crate::parse::{JsParser, ParseOptions, ParseResult};

// ============================================================================
// Strict-Mode Normalization
// ============================================================================

const STRICT_DIRECTIVE: &str = "\"use strict\";\n";

fn starts_strict(source: &str) -> bool {
    let trimmed = source.trim();
    trimmed.starts_with("\"use strict\"") || trimmed.starts_with("'use strict'")
}

/// Align the `"use strict"` prologue of two sources.
///
/// If exactly one of them begins with the directive, it is prepended to the
/// other so that inserting or dropping the directive is not a difference.
pub fn normalize_strict_mode(original: &str, transformed: &str) -> (String, String) {
    match (starts_strict(original), starts_strict(transformed)) {
        (true, false) => (
            original.to_string(),
            format!("{STRICT_DIRECTIVE}{transformed}"),
        ),
        (false, true) => (
            format!("{STRICT_DIRECTIVE}{original}"),
            transformed.to_string(),
        ),
        _ => (original.to_string(), transformed.to_string()),
    }
}

// ============================================================================
// Divergence
// ============================================================================

/// Why two trees were found to differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceReason {
    /// One side is a lexical node and the other is not.
    LexicalMismatch,
    /// Node kinds differ.
    KindMismatch,
    /// Nodes have different field names.
    FieldMismatch,
    /// Sequences have different lengths.
    LengthMismatch,
    /// Scalar strings differ.
    TextMismatch,
    /// A node was compared with a list or a scalar.
    ShapeMismatch,
}

/// First point at which two trees differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Path from the root, e.g. `Program.children[1].ExpressionStatement`.
    pub path: String,
    /// What differed there.
    pub reason: DivergenceReason,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            DivergenceReason::LexicalMismatch => "lexical node on one side only",
            DivergenceReason::KindMismatch => "node kinds differ",
            DivergenceReason::FieldMismatch => "field names differ",
            DivergenceReason::LengthMismatch => "sequence lengths differ",
            DivergenceReason::TextMismatch => "tokens differ",
            DivergenceReason::ShapeMismatch => "value shapes differ",
        };
        if self.path.is_empty() {
            write!(f, "{reason}")
        } else {
            write!(f, "{reason} at {}", self.path)
        }
    }
}

/// Path segments are collected leaf-first while unwinding.
struct Trail {
    segments: Vec<String>,
    reason: DivergenceReason,
}

impl Trail {
    fn new(reason: DivergenceReason) -> Self {
        Trail {
            segments: Vec::new(),
            reason,
        }
    }

    fn within(mut self, segment: String) -> Self {
        self.segments.push(segment);
        self
    }

    fn into_divergence(self) -> Divergence {
        let mut path = String::new();
        for segment in self.segments.iter().rev() {
            if !path.is_empty() && !segment.starts_with('[') {
                path.push('.');
            }
            path.push_str(segment);
        }
        Divergence {
            path,
            reason: self.reason,
        }
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Whether two trees are distinguishable once lexical detail is erased.
pub fn is_structurally_different(a: &Tree, b: &Tree) -> bool {
    tree_trail(a, b).is_some()
}

/// Whether two nodes are distinguishable once lexical detail is erased.
pub fn nodes_differ(a: &Node, b: &Node) -> bool {
    node_trail(a, b).is_some()
}

/// First difference between two nodes, if any.
pub fn first_divergence(a: &Node, b: &Node) -> Option<Divergence> {
    node_trail(a, b).map(Trail::into_divergence)
}

fn tree_trail(a: &Tree, b: &Tree) -> Option<Trail> {
    match (a, b) {
        (Tree::Node(x), Tree::Node(y)) => node_trail(x, y),
        (Tree::List(xs), Tree::List(ys)) => sequence_trail(xs, ys),
        (Tree::Text(x), Tree::Text(y)) => {
            (x != y).then(|| Trail::new(DivergenceReason::TextMismatch))
        }
        (Tree::Node(node), _) | (_, Tree::Node(node)) if node.kind.is_lexical() => {
            Some(Trail::new(DivergenceReason::LexicalMismatch))
        }
        (Tree::Node(_), Tree::List(_) | Tree::Text(_))
        | (Tree::List(_), Tree::Node(_) | Tree::Text(_))
        | (Tree::Text(_), Tree::Node(_) | Tree::List(_)) => {
            Some(Trail::new(DivergenceReason::ShapeMismatch))
        }
    }
}

fn node_trail(a: &Node, b: &Node) -> Option<Trail> {
    match (a.kind.is_lexical(), b.kind.is_lexical()) {
        (true, true) => return None,
        (true, false) | (false, true) => {
            return Some(Trail::new(DivergenceReason::LexicalMismatch));
        }
        (false, false) => {}
    }

    if a.kind != b.kind {
        return Some(Trail::new(DivergenceReason::KindMismatch).within(a.kind.to_string()));
    }

    // Fields are kept sorted by name, so set equality is sequence equality.
    if !a.fields.keys().eq(b.fields.keys()) {
        return Some(Trail::new(DivergenceReason::FieldMismatch).within(a.kind.to_string()));
    }

    a.fields
        .iter()
        .zip(b.fields.values())
        .find_map(|((name, xs), ys)| {
            sequence_trail(xs, ys).map(|trail| trail.within((*name).to_string()))
        })
        .map(|trail| trail.within(a.kind.to_string()))
}

fn sequence_trail(xs: &[Tree], ys: &[Tree]) -> Option<Trail> {
    if xs.len() != ys.len() {
        return Some(Trail::new(DivergenceReason::LengthMismatch));
    }
    xs.iter()
        .zip(ys)
        .enumerate()
        .find_map(|(index, (x, y))| tree_trail(x, y).map(|trail| trail.within(format!("[{index}]"))))
}

// ============================================================================
// Source-Level Check
// ============================================================================

/// Outcome of comparing an original program with its transformed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// True when the two programs are structurally distinguishable.
    pub different: bool,
    /// Where they first differ.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence: Option<Divergence>,
}

impl Verdict {
    /// A verdict reporting no difference.
    pub fn same() -> Self {
        Verdict {
            different: false,
            divergence: None,
        }
    }
}

/// Parse both sources and compare them structurally.
///
/// Strict-mode prologues are aligned first. Parse failures on either side
/// propagate to the caller; nothing is recovered here.
pub fn check(original: &str, transformed: &str, options: &ParseOptions) -> ParseResult<Verdict> {
    let (original, transformed) = normalize_strict_mode(original, transformed);

    let mut parser = JsParser::new(*options)?;
    let original_ast = parser.parse(&original)?;
    let transformed_ast = parser.parse(&transformed)?;

    let divergence = first_divergence(&original_ast, &transformed_ast);
    if let Some(divergence) = &divergence {
        debug!("structural difference: {}", divergence);
    }
    Ok(Verdict {
        different: divergence.is_some(),
        divergence,
    })
}

// ============================================================================
// Tests
// ============================================================================
