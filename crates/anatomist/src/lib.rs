//! # The Anatomist: Contract Source -> Syntax Tree
//!
//! **Role**: Parses contract source with tree-sitter and lowers the concrete
//! syntax tree into the closed [`NodeKind`] tree the linter consumes.
//!
//! **Core Types**:
//! - [`Node`]: one syntax node (kind, 1-based line, optional identifier,
//!   decorators, children in Python `ast` field order).
//! - [`ParserHost`]: owns the tree-sitter parser.
//!
//! **Design**:
//! - The lowered tree mirrors Python's `ast` module: `Name` carries a
//!   `Load`/`Store`/`Del` child, `not x` is `UnaryOp(Not)`, chained `and`/`or`
//!   flatten into one `BoolOp`, `a = b = v` is a single `Assign`.
//! - Source that does not parse cleanly is an error here; the linter is only
//!   ever handed complete trees.

pub mod lower;
pub mod parser;

pub use common::NodeKind;
pub use parser::ParserHost;

/// A lowered syntax node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    /// Source line (1-indexed). Operators and contexts carry their parent's line.
    pub line: u32,
    /// Name, attribute, argument, alias or function name, depending on `kind`.
    pub ident: Option<String>,
    /// Decorator expressions (definitions only), in source order.
    pub decorators: Vec<Node>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind, line: u32) -> Self {
        Self {
            kind,
            line,
            ident: None,
            decorators: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn named(kind: NodeKind, line: u32, ident: impl Into<String>) -> Self {
        Self {
            ident: Some(ident.into()),
            ..Self::new(kind, line)
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_decorators(mut self, decorators: Vec<Node>) -> Self {
        self.decorators = decorators;
        self
    }

    pub fn ident(&self) -> Option<&str> {
        self.ident.as_deref()
    }

    /// Splits an `Assign` into its targets and value.
    pub fn assign_parts(&self) -> Option<(&[Node], &Node)> {
        if self.kind != NodeKind::Assign {
            return None;
        }
        let (value, targets) = self.children.split_last()?;
        Some((targets, value))
    }

    /// Dotted text of a `Name`/`Attribute` chain (`pytest.fixture`); a `Call`
    /// renders its callee followed by `()`.
    pub fn dotted_name(&self) -> Option<String> {
        match self.kind {
            NodeKind::Name => self.ident.clone(),
            NodeKind::Attribute => {
                let base = self.children.first()?.dotted_name()?;
                Some(format!("{}.{}", base, self.ident.as_deref()?))
            }
            NodeKind::Call => Some(format!("{}()", self.children.first()?.dotted_name()?)),
            _ => None,
        }
    }

    /// Number of nodes in this subtree, decorators included.
    pub fn size(&self) -> usize {
        1 + self
            .decorators
            .iter()
            .chain(self.children.iter())
            .map(Node::size)
            .sum::<usize>()
    }

    /// Top-level `FunctionDef` statements of a module. `async def` is not
    /// included.
    pub fn functions(&self) -> impl Iterator<Item = &Node> {
        self.children
            .iter()
            .filter(|n| n.kind == NodeKind::FunctionDef)
    }
}

/// Errors produced by the Anatomist crate.
#[derive(Debug, thiserror::Error)]
pub enum AnatomistError {
    /// Tree-sitter could not be initialized or returned no tree.
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// The source is not valid dialect syntax.
    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: u32, message: String },

    /// I/O error (file read).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Byte range exceeds u32::MAX (file too large).
    #[error("Byte range overflow: file size exceeds 4GB limit")]
    ByteRangeOverflow,
}
