//! # Syntax Node Kinds
//!
//! The closed set of grammar productions the contract dialect recognizes.
//! Variant labels match the Python `ast` class names so that violation
//! messages read the same as the reference toolchain (`AsyncFunctionDef`,
//! `alias`, `arg`, ...).
//!
//! The front end (`anatomist`) can only emit these kinds, and every kind has
//! an explicit whitelist decision in [`crate::policy`].

use serde::Serialize;
use std::fmt;

macro_rules! node_kinds {
    ($($(#[$doc:meta])* $variant:ident => $label:literal,)+) => {
        /// A syntax-node kind produced by the contract front end.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(into = "&'static str")]
        pub enum NodeKind {
            $($(#[$doc])* $variant,)+
        }

        impl NodeKind {
            /// Every kind, in declaration order.
            pub const ALL: &'static [NodeKind] = &[$(NodeKind::$variant,)+];

            /// Display label (the Python `ast` class name).
            pub fn label(self) -> &'static str {
                match self {
                    $(NodeKind::$variant => $label,)+
                }
            }

            /// Looks a kind up by its display label.
            pub fn from_label(label: &str) -> Option<NodeKind> {
                match label {
                    $($label => Some(NodeKind::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

node_kinds! {
    // Module & statements
    Module => "Module",
    FunctionDef => "FunctionDef",
    AsyncFunctionDef => "AsyncFunctionDef",
    ClassDef => "ClassDef",
    Return => "Return",
    Delete => "Delete",
    Assign => "Assign",
    AugAssign => "AugAssign",
    /// `x: int = 1`
    AnnAssign => "AnnAssign",
    For => "For",
    AsyncFor => "AsyncFor",
    While => "While",
    If => "If",
    With => "With",
    AsyncWith => "AsyncWith",
    WithItem => "withitem",
    Match => "Match",
    Raise => "Raise",
    Try => "Try",
    ExceptHandler => "ExceptHandler",
    Assert => "Assert",
    Import => "Import",
    ImportFrom => "ImportFrom",
    Alias => "alias",
    Global => "Global",
    Nonlocal => "Nonlocal",
    Expr => "Expr",
    Pass => "Pass",
    Break => "Break",
    Continue => "Continue",
    /// `type X = int`
    TypeAlias => "TypeAlias",

    // Expressions
    BoolOp => "BoolOp",
    /// `(x := y)`
    NamedExpr => "NamedExpr",
    BinOp => "BinOp",
    UnaryOp => "UnaryOp",
    Lambda => "Lambda",
    IfExp => "IfExp",
    Dict => "Dict",
    Set => "Set",
    ListComp => "ListComp",
    SetComp => "SetComp",
    DictComp => "DictComp",
    GeneratorExp => "GeneratorExp",
    Comprehension => "comprehension",
    Await => "Await",
    Yield => "Yield",
    YieldFrom => "YieldFrom",
    Compare => "Compare",
    Call => "Call",
    Keyword => "keyword",
    /// f-string
    JoinedStr => "JoinedStr",
    FormattedValue => "FormattedValue",
    Num => "Num",
    Str => "Str",
    Bytes => "Bytes",
    /// `True`, `False`, `None`
    NameConstant => "NameConstant",
    Ellipsis => "Ellipsis",
    Attribute => "Attribute",
    Subscript => "Subscript",
    Index => "Index",
    Slice => "Slice",
    Starred => "Starred",
    Name => "Name",
    List => "List",
    Tuple => "Tuple",
    Arguments => "arguments",
    Arg => "arg",

    // Expression contexts
    Load => "Load",
    Store => "Store",
    Del => "Del",

    // Operators
    Add => "Add",
    Sub => "Sub",
    Mult => "Mult",
    MatMult => "MatMult",
    Div => "Div",
    Mod => "Mod",
    Pow => "Pow",
    LShift => "LShift",
    RShift => "RShift",
    BitOr => "BitOr",
    BitXor => "BitXor",
    BitAnd => "BitAnd",
    FloorDiv => "FloorDiv",
    And => "And",
    Or => "Or",
    Invert => "Invert",
    Not => "Not",
    UAdd => "UAdd",
    USub => "USub",
    Eq => "Eq",
    NotEq => "NotEq",
    Lt => "Lt",
    LtE => "LtE",
    Gt => "Gt",
    GtE => "GtE",
    Is => "Is",
    IsNot => "IsNot",
    In => "In",
    NotIn => "NotIn",
}

impl NodeKind {
    /// `true` for function, class and async-function definitions.
    pub fn is_definition(self) -> bool {
        matches!(
            self,
            NodeKind::FunctionDef | NodeKind::AsyncFunctionDef | NodeKind::ClassDef
        )
    }

    /// `true` for the Load/Store/Del context markers.
    pub fn is_context(self) -> bool {
        matches!(self, NodeKind::Load | NodeKind::Store | NodeKind::Del)
    }
}

impl From<NodeKind> for &'static str {
    fn from(kind: NodeKind) -> Self {
        kind.label()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
