//! JavaScript parser adapter.
//!
//! Parses source text with tree-sitter and lowers the concrete tree into the
//! [`crate::ast`] model. Lowering erases what a minifier is free to change
//! without touching program structure:
//!
//! - comments and punctuation are dropped;
//! - parentheses and computed-key brackets are unwrapped;
//! - `a.b` and `a["b"]` become the same `MemberExpression` shape;
//! - shorthand properties `{a}` become `{a: a}`;
//! - `x => x` gets the same parameter list as `(x) => x`;
//! - `new Foo` gets the same (empty) argument list as `new Foo()`.
//!
//! Operators, declaration keywords (`var`/`let`/`const`) and accessor
//! keywords (`get`/`set`) are kept as [`Tree::Text`] values so that changing
//! them is visible. Modifier tokens (`async`, `static`, generator `*`,
//! `for await`) are dropped like the boolean flags they amount to. Array
//! holes are kept as [`NodeKind::Elision`] entries.

use thiserror::Error;
use tree_sitter::Node as SyntaxNode;

use crate::ast::{Node, NodeKind, CHILDREN_FIELD, TOKENS_FIELD};

// ============================================================================
// Options
// ============================================================================

/// How the source should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceType {
    /// Classic script: `import`/`export` declarations are rejected.
    #[default]
    Script,
    /// ES module.
    Module,
}

/// Parse options. Both sides of a comparison must use the same options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Script or module goal.
    pub source_type: SourceType,
    /// Accept a leading `#!` line.
    pub allow_hash_bang: bool,
    /// Accept JSX syntax.
    pub allow_jsx: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            source_type: SourceType::Script,
            allow_hash_bang: true,
            allow_jsx: false,
        }
    }
}

impl ParseOptions {
    /// Options for ES module sources.
    pub fn module() -> Self {
        ParseOptions {
            source_type: SourceType::Module,
            ..ParseOptions::default()
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error from parsing or lowering.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Malformed source.
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// Well-formed syntax the model does not cover (or that the options disable).
    #[error("unsupported syntax `{kind}` at {line}:{column}")]
    Unsupported {
        kind: String,
        line: usize,
        column: usize,
    },

    /// `import`/`export` in script code.
    #[error("import/export declarations are only valid in module code ({line}:{column})")]
    ModuleSyntax { line: usize, column: usize },

    /// The grammar could not be loaded into the parser.
    #[error("failed to load the JavaScript grammar: {message}")]
    Language { message: String },

    /// tree-sitter returned no tree.
    #[error("parser produced no syntax tree")]
    Aborted,
}

/// Result type for parsing.
pub type ParseResult<T> = Result<T, ParseError>;

fn position(node: SyntaxNode<'_>) -> (usize, usize) {
    let point = node.start_position();
    (point.row + 1, point.column + 1)
}

// ============================================================================
// Parser
// ============================================================================

/// A reusable JavaScript parser.
pub struct JsParser {
    parser: tree_sitter::Parser,
    options: ParseOptions,
}

impl JsParser {
    /// Create a parser with the given options.
    pub fn new(options: ParseOptions) -> ParseResult<Self> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(tree_sitter_javascript::language())
            .map_err(|e| ParseError::Language {
                message: e.to_string(),
            })?;
        Ok(JsParser { parser, options })
    }

    /// Options this parser was created with.
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Parse `source` into a `Program` node.
    ///
    /// Leading and trailing whitespace is ignored.
    pub fn parse(&mut self, source: &str) -> ParseResult<Node> {
        let source = source.trim();
        let tree = self
            .parser
            .parse(source, None)
            .ok_or(ParseError::Aborted)?;
        let root = tree.root_node();

        if root.has_error() {
            return Err(syntax_error(root, source.as_bytes()));
        }

        let lowering = Lowering {
            source: source.as_bytes(),
            options: &self.options,
        };
        match lowering.lower(root)? {
            Some(program) => Ok(program),
            None => Ok(Node::new(NodeKind::Program)),
        }
    }
}

/// Parse `source` with a fresh parser.
pub fn parse_program(source: &str, options: &ParseOptions) -> ParseResult<Node> {
    JsParser::new(*options)?.parse(source)
}

fn syntax_error(root: SyntaxNode<'_>, source: &[u8]) -> ParseError {
    let Some(bad) = first_error(root) else {
        let (line, column) = position(root);
        return ParseError::Syntax {
            line,
            column,
            message: "invalid syntax".to_string(),
        };
    };
    let (line, column) = position(bad);
    let message = if bad.is_missing() {
        format!("missing `{}`", bad.kind())
    } else {
        let text = bad.utf8_text(source).unwrap_or("");
        let snippet: String = text.chars().take(24).collect();
        format!("unexpected `{}`", snippet.trim())
    };
    ParseError::Syntax {
        line,
        column,
        message,
    }
}

fn first_error(node: SyntaxNode<'_>) -> Option<SyntaxNode<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

/// Children of `node` paired with the grammar field each one sits in.
fn fielded_children(node: SyntaxNode<'_>) -> Vec<(Option<&'static str>, SyntaxNode<'_>)> {
    let mut children = Vec::new();
    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            children.push((cursor.field_name(), cursor.node()));
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    children
}

/// Modifier tokens that only toggle a flag on their node.
const MODIFIER_TOKENS: &[&str] = &["async", "static", "await", "*"];

/// Anonymous tokens worth keeping when they are not in a grammar field.
fn is_keyword_token(kind: &str) -> bool {
    !kind.is_empty()
        && kind.bytes().all(|b| b.is_ascii_alphabetic())
        && !MODIFIER_TOKENS.contains(&kind)
}

// ============================================================================
// Lowering
// ============================================================================

struct Lowering<'a> {
    source: &'a [u8],
    options: &'a ParseOptions,
}

impl Lowering<'_> {
    fn text(&self, node: SyntaxNode<'_>) -> String {
        node.utf8_text(self.source).unwrap_or("").to_string()
    }

    fn lower(&self, node: SyntaxNode<'_>) -> ParseResult<Option<Node>> {
        match node.kind() {
            "comment" | "html_comment" => return Ok(None),
            "hash_bang_line" => {
                if self.options.allow_hash_bang {
                    return Ok(None);
                }
                let (line, column) = position(node);
                return Err(ParseError::Syntax {
                    line,
                    column,
                    message: "hashbang line is not allowed".to_string(),
                });
            }
            "parenthesized_expression" | "computed_property_name" => {
                return self.lower_inner(node);
            }
            "template_string" => return self.lower_template(node).map(Some),
            "private_property_identifier" => {
                let name = self.text(node);
                return Ok(Some(
                    Node::new(NodeKind::PrivateIdentifier).with("name", name),
                ));
            }
            _ => {}
        }

        let (line, column) = position(node);
        let kind = NodeKind::from_grammar(node.kind()).ok_or_else(|| ParseError::Unsupported {
            kind: node.kind().to_string(),
            line,
            column,
        })?;

        if kind.is_jsx() && !self.options.allow_jsx {
            return Err(ParseError::Unsupported {
                kind: node.kind().to_string(),
                line,
                column,
            });
        }
        if matches!(
            kind,
            NodeKind::ImportDeclaration | NodeKind::ExportDeclaration
        ) && self.options.source_type == SourceType::Script
        {
            return Err(ParseError::ModuleSyntax { line, column });
        }
        if kind.is_lexical() {
            return Ok(Some(Node::leaf(kind, self.text(node))));
        }
        if kind == NodeKind::JsxText {
            return Ok(Some(Node::new(kind)));
        }

        let mut lowered = Node::new(kind);
        let in_object = matches!(node.kind(), "object" | "object_pattern");
        let in_array = matches!(node.kind(), "array" | "array_pattern");
        // Set while no element has been seen since `[` or the last comma.
        let mut awaiting_element = true;
        for (field, child) in fielded_children(node) {
            if child.is_extra() {
                continue;
            }
            if in_array && !child.is_named() {
                if child.kind() == "," {
                    if awaiting_element {
                        lowered.push(CHILDREN_FIELD, Node::new(NodeKind::Elision));
                    }
                    awaiting_element = true;
                }
                continue;
            }
            if child.is_named() {
                awaiting_element = false;
                let value = if in_object && child.kind().starts_with("shorthand_property_identifier")
                {
                    Some(self.shorthand_property(child))
                } else {
                    self.lower(child)?
                };
                if let Some(value) = value {
                    lowered.push(field.unwrap_or(CHILDREN_FIELD), value);
                }
            } else if let Some(field) = field {
                if field_is_modifier(field, child.kind()) {
                    continue;
                }
                lowered.push(field, child.kind());
            } else if is_keyword_token(child.kind()) {
                lowered.push(TOKENS_FIELD, child.kind());
            }
        }

        normalize_fields(node.kind(), &mut lowered);
        Ok(Some(lowered))
    }

    /// Lower the single expression wrapped by parentheses or `[ ]` keys.
    fn lower_inner(&self, node: SyntaxNode<'_>) -> ParseResult<Option<Node>> {
        let inner = fielded_children(node)
            .into_iter()
            .map(|(_, child)| child)
            .find(|child| child.is_named() && !child.is_extra());
        match inner {
            Some(child) => self.lower(child),
            None => Ok(None),
        }
    }

    fn shorthand_property(&self, node: SyntaxNode<'_>) -> Node {
        let name = self.text(node);
        Node::new(NodeKind::Property)
            .with("key", Node::leaf(NodeKind::Identifier, name.clone()))
            .with("value", Node::leaf(NodeKind::Identifier, name))
    }

    /// Split a template string into quasis and substituted expressions.
    ///
    /// There is always one more quasi than there are expressions.
    fn lower_template(&self, node: SyntaxNode<'_>) -> ParseResult<Node> {
        let mut template = Node::new(NodeKind::TemplateLiteral);
        let mut quasi = String::new();

        for (_, child) in fielded_children(node) {
            match child.kind() {
                "`" => {}
                "template_substitution" => {
                    template.push(
                        "quasis",
                        Node::leaf(NodeKind::TemplateElement, std::mem::take(&mut quasi)),
                    );
                    if let Some(expression) = self.lower_inner(child)? {
                        template.push("expressions", expression);
                    }
                }
                _ if child.is_extra() => {}
                _ => quasi.push_str(&self.text(child)),
            }
        }
        template.push("quasis", Node::leaf(NodeKind::TemplateElement, quasi));
        Ok(template)
    }
}

/// Whether a fielded anonymous token is a modifier rather than an operator.
fn field_is_modifier(field: &str, token: &str) -> bool {
    match token {
        "*" => field != "operator",
        _ => MODIFIER_TOKENS.contains(&token),
    }
}

/// Reconcile grammar shapes that ESTree treats as one.
fn normalize_fields(grammar_kind: &str, node: &mut Node) {
    match grammar_kind {
        "subscript_expression" => {
            if let Some(index) = node.fields.remove("index") {
                node.fields.insert("property", index);
            }
        }
        "arrow_function" => {
            if let Some(parameter) = node.fields.remove("parameter") {
                let mut parameters = Node::new(NodeKind::FormalParameters);
                for value in parameter {
                    parameters.push(CHILDREN_FIELD, value);
                }
                node.push("parameters", parameters);
            }
        }
        "variable_declaration" => {
            if let Some(tokens) = node.fields.get_mut(TOKENS_FIELD) {
                tokens.retain(|token| token.as_text() != Some("var"));
                if tokens.is_empty() {
                    node.fields.remove(TOKENS_FIELD);
                }
            }
            if !node.fields.contains_key("kind") {
                node.push("kind", "var");
            }
        }
        "new_expression" => {
            if !node.fields.contains_key("arguments") {
                node.push("arguments", Node::new(NodeKind::Arguments));
            }
        }
        _ => {}
    }
}

// ============================================================================
// Tests
// ============================================================================
