//! # Policy Tables
//!
//! Read-only admission configuration: the syntax whitelist, the decorator set,
//! permitted import roots, storage-cell constructor names and the safe-name
//! registry.
//!
//! [`PolicyTables::standard`] hands out a process-wide instance built once.
//! Callers that need a different configuration (tests, staging networks) build
//! their own with [`PolicyTables::default`] and the `with_*` builders and pass
//! it by reference; nothing here is global mutable state.

use crate::builtins::SafeNameRegistry;
use crate::syntax::NodeKind;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

/// Errors from policy lookups.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("import root not permitted: {0}")]
    UnknownImportRoot(String),
}

/// Syntax kinds a contract may contain. Everything else is rejected with S1.
const WHITELIST: &[NodeKind] = &[
    NodeKind::Module,
    NodeKind::Eq,
    NodeKind::Call,
    NodeKind::Dict,
    NodeKind::Attribute,
    NodeKind::Pow,
    NodeKind::Index,
    NodeKind::Not,
    NodeKind::Alias,
    NodeKind::If,
    NodeKind::FunctionDef,
    // Used for setting up resources in the constructor during compilation.
    NodeKind::Global,
    NodeKind::GtE,
    NodeKind::LtE,
    NodeKind::Load,
    NodeKind::Arg,
    NodeKind::Add,
    NodeKind::Import,
    // Whitelisted so that S4 reports it instead of S1.
    NodeKind::ImportFrom,
    NodeKind::Name,
    NodeKind::Num,
    NodeKind::BinOp,
    NodeKind::Store,
    NodeKind::Assert,
    NodeKind::Assign,
    NodeKind::AugAssign,
    NodeKind::Subscript,
    NodeKind::Compare,
    NodeKind::Return,
    NodeKind::NameConstant,
    NodeKind::Expr,
    NodeKind::Keyword,
    NodeKind::Sub,
    NodeKind::Arguments,
    NodeKind::List,
    NodeKind::Set,
    NodeKind::Str,
    NodeKind::UnaryOp,
    NodeKind::Pass,
    NodeKind::Tuple,
    NodeKind::Div,
    NodeKind::In,
    NodeKind::NotIn,
    NodeKind::Gt,
    NodeKind::Lt,
    NodeKind::Starred,
    NodeKind::Mod,
    NodeKind::NotEq,
    // Loops
    NodeKind::For,
    NodeKind::While,
    // Comprehensions
    NodeKind::ListComp,
    NodeKind::Comprehension,
    NodeKind::Slice,
    NodeKind::USub,
    // Conditionals
    NodeKind::BoolOp,
    NodeKind::And,
    NodeKind::Or,
    NodeKind::Mult,
];

/// Standard-library contracts live here.
pub const STANDARD_ROOT: &str = "seneca.contracts";
/// Fixtures registered by test suites.
pub const TEST_ROOT: &str = "test_contracts";

const STORAGE_CELLS: &[&str] = &["Hash", "Variable", "ForeignHash", "ForeignVariable"];

// Bound by the compiler when it instantiates a storage cell.
const RESERVED_CELL_KEYWORDS: &[&str] = &["contract", "name"];

/// A namespace prefix under which registered contracts resolve.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ImportRoot(String);

impl ImportRoot {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fully qualified module path of `name` under this root.
    pub fn qualify(&self, name: &str) -> String {
        format!("{}.{}", self.0, name)
    }
}

impl fmt::Display for ImportRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The decorator names a contract function may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecoratorSet {
    /// Marks an externally callable entry point.
    pub export: String,
    /// Marks the single one-time initialization function.
    pub construct: String,
}

impl DecoratorSet {
    pub fn contains(&self, name: &str) -> bool {
        name == self.export || name == self.construct
    }
}

impl Default for DecoratorSet {
    fn default() -> Self {
        Self {
            export: "export".to_string(),
            construct: "construct".to_string(),
        }
    }
}

/// Immutable admission configuration consumed by the linter.
#[derive(Debug, Clone)]
pub struct PolicyTables {
    whitelist: BTreeSet<NodeKind>,
    decorators: DecoratorSet,
    import_roots: Vec<ImportRoot>,
    storage_cells: BTreeSet<String>,
    reserved_cell_keywords: BTreeSet<String>,
    safe_names: SafeNameRegistry,
}

static STANDARD: OnceLock<PolicyTables> = OnceLock::new();

impl PolicyTables {
    /// The process-wide standard policy, built on first use.
    pub fn standard() -> &'static PolicyTables {
        STANDARD.get_or_init(PolicyTables::default)
    }

    /// Permits an additional syntax kind.
    pub fn allow(mut self, kind: NodeKind) -> Self {
        self.whitelist.insert(kind);
        self
    }

    /// Removes a syntax kind from the whitelist.
    pub fn deny(mut self, kind: NodeKind) -> Self {
        self.whitelist.remove(&kind);
        self
    }

    pub fn with_decorators(mut self, export: &str, construct: &str) -> Self {
        self.decorators = DecoratorSet {
            export: export.to_string(),
            construct: construct.to_string(),
        };
        self
    }

    pub fn with_import_root(mut self, root: ImportRoot) -> Self {
        if !self.import_roots.contains(&root) {
            self.import_roots.push(root);
        }
        self
    }

    pub fn with_safe_names(mut self, safe_names: SafeNameRegistry) -> Self {
        self.safe_names = safe_names;
        self
    }

    /// Whitelist decision for `kind`.
    pub fn is_allowed(&self, kind: NodeKind) -> bool {
        self.whitelist.contains(&kind)
    }

    /// Whitelisted kinds in declaration order.
    pub fn whitelist(&self) -> impl Iterator<Item = NodeKind> + '_ {
        self.whitelist.iter().copied()
    }

    pub fn decorators(&self) -> &DecoratorSet {
        &self.decorators
    }

    pub fn is_export(&self, decorator: &str) -> bool {
        decorator == self.decorators.export
    }

    pub fn is_constructor(&self, decorator: &str) -> bool {
        decorator == self.decorators.construct
    }

    pub fn import_roots(&self) -> &[ImportRoot] {
        &self.import_roots
    }

    /// Resolves `root` against the permitted import roots.
    pub fn import_root(&self, root: &str) -> Result<&ImportRoot, PolicyError> {
        self.import_roots
            .iter()
            .find(|r| r.as_str() == root)
            .ok_or_else(|| PolicyError::UnknownImportRoot(root.to_string()))
    }

    /// `true` if `name` is a storage-cell constructor (`Hash`, `Variable`, ...).
    pub fn is_storage_cell(&self, name: &str) -> bool {
        self.storage_cells.contains(name)
    }

    /// `true` if `keyword` is bound by the compiler on storage cells.
    pub fn is_reserved_cell_keyword(&self, keyword: &str) -> bool {
        self.reserved_cell_keywords.contains(keyword)
    }

    pub fn safe_names(&self) -> &SafeNameRegistry {
        &self.safe_names
    }
}

impl Default for PolicyTables {
    fn default() -> Self {
        Self {
            whitelist: WHITELIST.iter().copied().collect(),
            decorators: DecoratorSet::default(),
            import_roots: vec![ImportRoot::new(STANDARD_ROOT), ImportRoot::new(TEST_ROOT)],
            storage_cells: STORAGE_CELLS.iter().map(|s| s.to_string()).collect(),
            reserved_cell_keywords: RESERVED_CELL_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            safe_names: SafeNameRegistry::standard(),
        }
    }
}
