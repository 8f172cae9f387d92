//! Core library for minicheck.
//!
//! This crate provides:
//! - A syntax tree model and a tree-sitter based JavaScript parser adapter
//! - Structural equivalence checking of programs modulo lexical detail
//! - Transformer configuration records and transform oracles
//! - Delta-debugging of boolean transformer flags
//! - Incremental summary output and input discovery
//! - Settings, error types, and JSON output types for the CLI

pub mod ast;
pub mod config;
pub mod delta;
pub mod equiv;
pub mod error;
pub mod files;
pub mod oracle;
pub mod output;
pub mod parse;
pub mod settings;
pub mod summary;
