//! Syntax tree model used for structural comparison.
//!
//! The parser adapter lowers a concrete syntax tree into this model. Each node
//! carries a [`NodeKind`] drawn from a closed set, a map of named fields, and
//! (for lexical nodes only) the source text it covered. Source positions are
//! never stored, so nothing downstream can compare them.
//!
//! ## Field Layout
//!
//! Every field holds an ordered sequence of [`Tree`] values, even when the
//! grammar allows only one child there. Field names come from the grammar;
//! unnamed children land in [`CHILDREN_FIELD`] and keyword tokens that carry
//! meaning (`var`/`let`, `async`, `static`, `*`) land in [`TOKENS_FIELD`].

use std::collections::BTreeMap;
use std::fmt;

/// Field holding named children that the grammar does not label.
pub const CHILDREN_FIELD: &str = "children";

/// Field holding keyword tokens that distinguish otherwise identical nodes.
pub const TOKENS_FIELD: &str = "tokens";

// ============================================================================
// Node Kinds
// ============================================================================

/// Closed set of syntax node kinds.
///
/// Names follow ESTree where a counterpart exists. Grammar constructs that
/// ESTree folds together (for example `a.b` and `a["b"]`) share one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    Program,

    // Statements
    ExpressionStatement,
    BlockStatement,
    EmptyStatement,
    DebuggerStatement,
    WithStatement,
    ReturnStatement,
    LabeledStatement,
    BreakStatement,
    ContinueStatement,
    IfStatement,
    ElseClause,
    SwitchStatement,
    SwitchBody,
    SwitchCase,
    SwitchDefault,
    ThrowStatement,
    TryStatement,
    CatchClause,
    FinallyClause,
    WhileStatement,
    DoWhileStatement,
    ForStatement,
    ForInStatement,

    // Declarations
    FunctionDeclaration,
    VariableDeclaration,
    VariableDeclarator,
    ClassDeclaration,
    ClassBody,
    ClassHeritage,
    MethodDefinition,
    PropertyDefinition,
    StaticBlock,
    Decorator,

    // Functions
    FunctionExpression,
    ArrowFunctionExpression,
    FormalParameters,
    Arguments,

    // Expressions
    ThisExpression,
    Super,
    ArrayExpression,
    ObjectExpression,
    Property,
    SpreadElement,
    ClassExpression,
    UnaryExpression,
    UpdateExpression,
    BinaryExpression,
    AssignmentExpression,
    ConditionalExpression,
    CallExpression,
    NewExpression,
    MemberExpression,
    OptionalChain,
    SequenceExpression,
    YieldExpression,
    AwaitExpression,
    TemplateLiteral,
    MetaProperty,
    ImportExpression,

    // Patterns
    ObjectPattern,
    ArrayPattern,
    /// A hole in an array literal or pattern, as in `[a, , b]`.
    Elision,
    RestElement,
    AssignmentPattern,

    // Modules
    ImportDeclaration,
    ImportClause,
    NamedImports,
    ImportSpecifier,
    NamespaceImport,
    ImportAttribute,
    ExportDeclaration,
    ExportClause,
    ExportSpecifier,
    NamespaceExport,

    // JSX (only produced when enabled in the parse options)
    JsxElement,
    JsxSelfClosingElement,
    JsxOpeningElement,
    JsxClosingElement,
    JsxAttribute,
    JsxExpression,
    JsxText,
    JsxNamespaceName,
    JsxMemberExpression,

    // Names whose spelling matters
    PrivateIdentifier,

    // Lexical nodes
    Identifier,
    Literal,
    TemplateElement,
}

impl NodeKind {
    /// Whether the content of this node is irrelevant to equivalence.
    ///
    /// Renaming a variable or respelling a literal must not register as a
    /// difference, so only the presence of these nodes is compared.
    pub fn is_lexical(self) -> bool {
        matches!(
            self,
            NodeKind::Identifier | NodeKind::Literal | NodeKind::TemplateElement
        )
    }

    /// Whether this kind belongs to the JSX extension.
    pub fn is_jsx(self) -> bool {
        matches!(
            self,
            NodeKind::JsxElement
                | NodeKind::JsxSelfClosingElement
                | NodeKind::JsxOpeningElement
                | NodeKind::JsxClosingElement
                | NodeKind::JsxAttribute
                | NodeKind::JsxExpression
                | NodeKind::JsxText
                | NodeKind::JsxNamespaceName
                | NodeKind::JsxMemberExpression
        )
    }

    /// Map a tree-sitter-javascript node kind onto the model.
    ///
    /// Returns `None` for grammar kinds the model does not cover. Kinds that
    /// the parser adapter unwraps or drops (parentheses, comments, template
    /// pieces) are handled before this lookup and are not listed here.
    pub fn from_grammar(kind: &str) -> Option<NodeKind> {
        let mapped = match kind {
            "program" => NodeKind::Program,

            "expression_statement" => NodeKind::ExpressionStatement,
            "statement_block" => NodeKind::BlockStatement,
            "empty_statement" => NodeKind::EmptyStatement,
            "debugger_statement" => NodeKind::DebuggerStatement,
            "with_statement" => NodeKind::WithStatement,
            "return_statement" => NodeKind::ReturnStatement,
            "labeled_statement" => NodeKind::LabeledStatement,
            "break_statement" => NodeKind::BreakStatement,
            "continue_statement" => NodeKind::ContinueStatement,
            "if_statement" => NodeKind::IfStatement,
            "else_clause" => NodeKind::ElseClause,
            "switch_statement" => NodeKind::SwitchStatement,
            "switch_body" => NodeKind::SwitchBody,
            "switch_case" => NodeKind::SwitchCase,
            "switch_default" => NodeKind::SwitchDefault,
            "throw_statement" => NodeKind::ThrowStatement,
            "try_statement" => NodeKind::TryStatement,
            "catch_clause" => NodeKind::CatchClause,
            "finally_clause" => NodeKind::FinallyClause,
            "while_statement" => NodeKind::WhileStatement,
            "do_statement" => NodeKind::DoWhileStatement,
            "for_statement" => NodeKind::ForStatement,
            "for_in_statement" => NodeKind::ForInStatement,

            "function_declaration" | "generator_function_declaration" => {
                NodeKind::FunctionDeclaration
            }
            "variable_declaration" | "lexical_declaration" | "using_declaration" => {
                NodeKind::VariableDeclaration
            }
            "variable_declarator" => NodeKind::VariableDeclarator,
            "class_declaration" => NodeKind::ClassDeclaration,
            "class_body" => NodeKind::ClassBody,
            "class_heritage" => NodeKind::ClassHeritage,
            "method_definition" => NodeKind::MethodDefinition,
            "field_definition" | "public_field_definition" => NodeKind::PropertyDefinition,
            "class_static_block" => NodeKind::StaticBlock,
            "decorator" => NodeKind::Decorator,

            "function" | "function_expression" | "generator_function" => {
                NodeKind::FunctionExpression
            }
            "arrow_function" => NodeKind::ArrowFunctionExpression,
            "formal_parameters" => NodeKind::FormalParameters,
            "arguments" => NodeKind::Arguments,

            "this" => NodeKind::ThisExpression,
            "super" => NodeKind::Super,
            "array" => NodeKind::ArrayExpression,
            "object" => NodeKind::ObjectExpression,
            "pair" | "pair_pattern" => NodeKind::Property,
            "spread_element" => NodeKind::SpreadElement,
            "class" => NodeKind::ClassExpression,
            "unary_expression" => NodeKind::UnaryExpression,
            "update_expression" => NodeKind::UpdateExpression,
            "binary_expression" => NodeKind::BinaryExpression,
            "assignment_expression" | "augmented_assignment_expression" => {
                NodeKind::AssignmentExpression
            }
            "ternary_expression" => NodeKind::ConditionalExpression,
            "call_expression" => NodeKind::CallExpression,
            "new_expression" => NodeKind::NewExpression,
            "member_expression" | "subscript_expression" => NodeKind::MemberExpression,
            "optional_chain" => NodeKind::OptionalChain,
            "sequence_expression" => NodeKind::SequenceExpression,
            "yield_expression" => NodeKind::YieldExpression,
            "await_expression" => NodeKind::AwaitExpression,
            "meta_property" => NodeKind::MetaProperty,
            "import" => NodeKind::ImportExpression,

            "object_pattern" => NodeKind::ObjectPattern,
            "array_pattern" => NodeKind::ArrayPattern,
            "rest_pattern" | "rest_element" => NodeKind::RestElement,
            "assignment_pattern" | "object_assignment_pattern" => NodeKind::AssignmentPattern,

            "import_statement" => NodeKind::ImportDeclaration,
            "import_clause" => NodeKind::ImportClause,
            "named_imports" => NodeKind::NamedImports,
            "import_specifier" => NodeKind::ImportSpecifier,
            "namespace_import" => NodeKind::NamespaceImport,
            "import_attribute" => NodeKind::ImportAttribute,
            "export_statement" => NodeKind::ExportDeclaration,
            "export_clause" => NodeKind::ExportClause,
            "export_specifier" => NodeKind::ExportSpecifier,
            "namespace_export" => NodeKind::NamespaceExport,

            "jsx_element" => NodeKind::JsxElement,
            "jsx_self_closing_element" => NodeKind::JsxSelfClosingElement,
            "jsx_opening_element" => NodeKind::JsxOpeningElement,
            "jsx_closing_element" => NodeKind::JsxClosingElement,
            "jsx_attribute" => NodeKind::JsxAttribute,
            "jsx_expression" => NodeKind::JsxExpression,
            "jsx_text" => NodeKind::JsxText,
            "jsx_namespace_name" => NodeKind::JsxNamespaceName,
            "nested_identifier" => NodeKind::JsxMemberExpression,

            "private_property_identifier" => NodeKind::PrivateIdentifier,

            "identifier"
            | "property_identifier"
            | "shorthand_property_identifier"
            | "shorthand_property_identifier_pattern"
            | "statement_identifier"
            | "undefined" => NodeKind::Identifier,
            "number" | "string" | "regex" | "true" | "false" | "null" => NodeKind::Literal,

            _ => return None,
        };
        Some(mapped)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Tree Values
// ============================================================================

/// A value stored in a node field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tree {
    /// A syntax node.
    Node(Node),
    /// An ordered sequence of values.
    List(Vec<Tree>),
    /// A structural discriminator that is not itself a node (operator, keyword).
    Text(String),
}

impl Tree {
    /// Borrow the node if this value is one.
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Tree::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Borrow the text if this value is a token.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Tree::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<Node> for Tree {
    fn from(node: Node) -> Self {
        Tree::Node(node)
    }
}

/// A syntax node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Node kind.
    pub kind: NodeKind,
    /// Named fields, ordered by name.
    pub fields: BTreeMap<&'static str, Vec<Tree>>,
    /// Source text, kept for lexical nodes and diagnostics only.
    pub text: Option<String>,
}

impl Node {
    /// Create a node with no fields.
    pub fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            fields: BTreeMap::new(),
            text: None,
        }
    }

    /// Create a lexical node carrying its source text.
    pub fn leaf(kind: NodeKind, text: impl Into<String>) -> Self {
        Node {
            kind,
            fields: BTreeMap::new(),
            text: Some(text.into()),
        }
    }

    /// Append a value to a field, creating the field if needed.
    pub fn push(&mut self, field: &'static str, value: impl Into<Tree>) {
        self.fields.entry(field).or_default().push(value.into());
    }

    /// Builder form of [`Node::push`].
    pub fn with(mut self, field: &'static str, value: impl Into<Tree>) -> Self {
        self.push(field, value);
        self
    }

    /// Values stored under `field`, empty if the field is absent.
    pub fn field(&self, field: &str) -> &[Tree] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes stored under `field`, skipping scalar values.
    pub fn child_nodes<'a>(&'a self, field: &str) -> impl Iterator<Item = &'a Node> + 'a {
        self.field(field).iter().filter_map(Tree::as_node)
    }

    /// Nodes stored under the unlabeled children field.
    pub fn children(&self) -> impl Iterator<Item = &Node> + '_ {
        self.child_nodes(CHILDREN_FIELD)
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self
            .fields
            .values()
            .flatten()
            .map(tree_node_count)
            .sum::<usize>()
    }
}

fn tree_node_count(tree: &Tree) -> usize {
    match tree {
        Tree::Node(node) => node.node_count(),
        Tree::List(items) => items.iter().map(tree_node_count).sum(),
        Tree::Text(_) => 0,
    }
}

impl From<String> for Tree {
    fn from(text: String) -> Self {
        Tree::Text(text)
    }
}

impl From<Vec<Tree>> for Tree {
    fn from(items: Vec<Tree>) -> Self {
        Tree::List(items)
    }
}

impl From<&str> for Tree {
    fn from(text: &str) -> Self {
        Tree::Text(text.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
