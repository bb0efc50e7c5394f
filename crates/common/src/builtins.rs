//! # Safe-Name Registry
//!
//! The entire ambient namespace visible to a compiled contract. Nothing
//! outside this table is reachable by an unqualified name. The table is a
//! plain static enumeration; it is never derived from a host namespace.

use serde::Serialize;
use std::collections::BTreeMap;

/// Constants reachable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Constant {
    None,
    True,
    False,
}

/// Permitted ambient functions and type constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Builtin {
    /// Import hook used by the compiler to resolve registered contracts.
    Import,
    Callable,
    IsInstance,
    IsSubclass,
    Abs,
    Bool,
    Chr,
    Complex,
    Divmod,
    Hash,
    Hex,
    Id,
    Len,
    Oct,
    Ord,
    Pow,
    Range,
    Repr,
    Round,
    Slice,
    Str,
    Bytes,
    Tuple,
    Zip,
    Map,
    List,
    Print,
}

/// Exception types a contract may raise or name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExceptionType {
    ArithmeticError,
    AssertionError,
    AttributeError,
    BaseException,
    BufferError,
    BytesWarning,
    DeprecationWarning,
    EOFError,
    EnvironmentError,
    Exception,
    FloatingPointError,
    FutureWarning,
    GeneratorExit,
    IOError,
    ImportError,
    ImportWarning,
    IndentationError,
    IndexError,
    KeyError,
    KeyboardInterrupt,
    LookupError,
    MemoryError,
    NameError,
    NotImplementedError,
    OSError,
    OverflowError,
    PendingDeprecationWarning,
    ReferenceError,
    RuntimeError,
    RuntimeWarning,
    StopIteration,
    SyntaxError,
    SyntaxWarning,
    SystemError,
    SystemExit,
    TabError,
    TypeError,
    UnboundLocalError,
    UnicodeDecodeError,
    UnicodeEncodeError,
    UnicodeError,
    UnicodeTranslateError,
    UnicodeWarning,
    UserWarning,
    ValueError,
    Warning,
    ZeroDivisionError,
}

/// What a safe name denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum SafeName {
    Constant(Constant),
    Function(Builtin),
    Exception(ExceptionType),
}

// `float`, `int`, `dir`, `help`, `globals`, `locals` and `type` stay out.
const FUNCTIONS: &[(&str, SafeName)] = &[
    ("__import__", SafeName::Function(Builtin::Import)),
    ("None", SafeName::Constant(Constant::None)),
    ("False", SafeName::Constant(Constant::False)),
    ("True", SafeName::Constant(Constant::True)),
    ("callable", SafeName::Function(Builtin::Callable)),
    ("isinstance", SafeName::Function(Builtin::IsInstance)),
    ("issubclass", SafeName::Function(Builtin::IsSubclass)),
    ("abs", SafeName::Function(Builtin::Abs)),
    ("bool", SafeName::Function(Builtin::Bool)),
    ("chr", SafeName::Function(Builtin::Chr)),
    ("complex", SafeName::Function(Builtin::Complex)),
    ("divmod", SafeName::Function(Builtin::Divmod)),
    ("hash", SafeName::Function(Builtin::Hash)),
    ("hex", SafeName::Function(Builtin::Hex)),
    ("id", SafeName::Function(Builtin::Id)),
    ("len", SafeName::Function(Builtin::Len)),
    ("oct", SafeName::Function(Builtin::Oct)),
    ("ord", SafeName::Function(Builtin::Ord)),
    ("pow", SafeName::Function(Builtin::Pow)),
    ("range", SafeName::Function(Builtin::Range)),
    ("repr", SafeName::Function(Builtin::Repr)),
    ("round", SafeName::Function(Builtin::Round)),
    ("slice", SafeName::Function(Builtin::Slice)),
    ("str", SafeName::Function(Builtin::Str)),
    ("bytes", SafeName::Function(Builtin::Bytes)),
    ("tuple", SafeName::Function(Builtin::Tuple)),
    ("zip", SafeName::Function(Builtin::Zip)),
    ("map", SafeName::Function(Builtin::Map)),
    ("list", SafeName::Function(Builtin::List)),
    ("print", SafeName::Function(Builtin::Print)),
];

const EXCEPTIONS: &[(&str, ExceptionType)] = &[
    ("ArithmeticError", ExceptionType::ArithmeticError),
    ("AssertionError", ExceptionType::AssertionError),
    ("AttributeError", ExceptionType::AttributeError),
    ("BaseException", ExceptionType::BaseException),
    ("BufferError", ExceptionType::BufferError),
    ("BytesWarning", ExceptionType::BytesWarning),
    ("DeprecationWarning", ExceptionType::DeprecationWarning),
    ("EOFError", ExceptionType::EOFError),
    ("EnvironmentError", ExceptionType::EnvironmentError),
    ("Exception", ExceptionType::Exception),
    ("FloatingPointError", ExceptionType::FloatingPointError),
    ("FutureWarning", ExceptionType::FutureWarning),
    ("GeneratorExit", ExceptionType::GeneratorExit),
    ("IOError", ExceptionType::IOError),
    ("ImportError", ExceptionType::ImportError),
    ("ImportWarning", ExceptionType::ImportWarning),
    ("IndentationError", ExceptionType::IndentationError),
    ("IndexError", ExceptionType::IndexError),
    ("KeyError", ExceptionType::KeyError),
    ("KeyboardInterrupt", ExceptionType::KeyboardInterrupt),
    ("LookupError", ExceptionType::LookupError),
    ("MemoryError", ExceptionType::MemoryError),
    ("NameError", ExceptionType::NameError),
    ("NotImplementedError", ExceptionType::NotImplementedError),
    ("OSError", ExceptionType::OSError),
    ("OverflowError", ExceptionType::OverflowError),
    ("PendingDeprecationWarning", ExceptionType::PendingDeprecationWarning),
    ("ReferenceError", ExceptionType::ReferenceError),
    ("RuntimeError", ExceptionType::RuntimeError),
    ("RuntimeWarning", ExceptionType::RuntimeWarning),
    ("StopIteration", ExceptionType::StopIteration),
    ("SyntaxError", ExceptionType::SyntaxError),
    ("SyntaxWarning", ExceptionType::SyntaxWarning),
    ("SystemError", ExceptionType::SystemError),
    ("SystemExit", ExceptionType::SystemExit),
    ("TabError", ExceptionType::TabError),
    ("TypeError", ExceptionType::TypeError),
    ("UnboundLocalError", ExceptionType::UnboundLocalError),
    ("UnicodeDecodeError", ExceptionType::UnicodeDecodeError),
    ("UnicodeEncodeError", ExceptionType::UnicodeEncodeError),
    ("UnicodeError", ExceptionType::UnicodeError),
    ("UnicodeTranslateError", ExceptionType::UnicodeTranslateError),
    ("UnicodeWarning", ExceptionType::UnicodeWarning),
    ("UserWarning", ExceptionType::UserWarning),
    ("ValueError", ExceptionType::ValueError),
    ("Warning", ExceptionType::Warning),
    ("ZeroDivisionError", ExceptionType::ZeroDivisionError),
];

/// Identifier -> primitive mapping for the sandboxed namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeNameRegistry {
    names: BTreeMap<&'static str, SafeName>,
}

impl SafeNameRegistry {
    /// Builds the standard table.
    pub fn standard() -> Self {
        let mut names = BTreeMap::new();
        for (name, value) in FUNCTIONS {
            names.insert(*name, *value);
        }
        for (name, exc) in EXCEPTIONS {
            names.insert(*name, SafeName::Exception(*exc));
        }
        Self { names }
    }

    /// Resolves an identifier, `None` if it is not part of the namespace.
    pub fn get(&self, name: &str) -> Option<SafeName> {
        self.names.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Removes a name; used to build narrower namespaces.
    pub fn remove(&mut self, name: &str) -> Option<SafeName> {
        self.names.remove(name)
    }

    /// Iterates names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, SafeName)> + '_ {
        self.names.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for SafeNameRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_size() {
        let registry = SafeNameRegistry::standard();
        assert_eq!(registry.len(), FUNCTIONS.len() + EXCEPTIONS.len());
        assert_eq!(EXCEPTIONS.len(), 47);
    }

    #[test]
    fn test_resolves_functions_and_exceptions() {
        let registry = SafeNameRegistry::standard();
        assert_eq!(registry.get("len"), Some(SafeName::Function(Builtin::Len)));
        assert_eq!(registry.get("None"), Some(SafeName::Constant(Constant::None)));
        assert_eq!(
            registry.get("ValueError"),
            Some(SafeName::Exception(ExceptionType::ValueError))
        );
    }

    #[test]
    fn test_introspection_names_absent() {
        let registry = SafeNameRegistry::standard();
        for name in ["float", "int", "dir", "help", "globals", "locals", "type", "eval", "exec", "open"] {
            assert!(!registry.contains(name), "{name} must not be reachable");
        }
    }

    #[test]
    fn test_remove_narrows_namespace() {
        let mut registry = SafeNameRegistry::standard();
        assert!(registry.remove("print").is_some());
        assert!(!registry.contains("print"));
        assert!(SafeNameRegistry::standard().contains("print"));
    }
}
