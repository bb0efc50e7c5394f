//! # The Warden: Contract Admission Linter
//!
//! **Role**: Decides whether a parsed contract may be admitted. Walks the
//! lowered tree once and reports every policy breach, in source order, as a
//! [`Violation`].
//!
//! **Core Types**:
//! - [`Linter`]: borrows the [`PolicyTables`]; holds no other state.
//! - [`Outcome`]: `Pass`, or `Fail` with the rendered violation strings.
//! - [`EntryPoints`]: exported names and the constructor, for the compiler.
//!
//! Violations are data. A registry lookup failure becomes an S5 violation and
//! a `warn` log line; `check` itself never fails.

pub mod violation;
mod visit;

use anatomist::Node;
use common::{ContractRegistry, PolicyTables};
use serde::Serialize;

pub use violation::{Template, Violation, Violations};
use visit::LinterState;

/// Result of admitting one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "violations", rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail(Vec<String>),
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }

    /// Rendered violations; empty on `Pass`.
    pub fn violations(&self) -> &[String] {
        match self {
            Outcome::Pass => &[],
            Outcome::Fail(v) => v,
        }
    }
}

/// Entry points of an admitted contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryPoints {
    /// Export-decorated top-level functions, source order.
    pub exports: Vec<String>,
    /// The first constructor-decorated top-level function.
    pub constructor: Option<String>,
}

/// Static admission checker.
///
/// # Example
/// ```no_run
/// use anatomist::ParserHost;
/// use common::{registry::MemoryRegistry, PolicyTables};
/// use warden::Linter;
///
/// let module = ParserHost::new().unwrap()
///     .parse_str("@export\ndef a():\n    return 1\n")
///     .unwrap();
/// let outcome = Linter::new(PolicyTables::standard()).check(&module, &MemoryRegistry::new());
/// assert!(outcome.is_pass());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Linter<'p> {
    policy: &'p PolicyTables,
}

impl<'p> Linter<'p> {
    pub fn new(policy: &'p PolicyTables) -> Self {
        Self { policy }
    }

    /// Admits or rejects `module`.
    pub fn check(&self, module: &Node, registry: &dyn ContractRegistry) -> Outcome {
        let violations = self.run(module, registry).violations;
        if violations.is_empty() {
            Outcome::Pass
        } else {
            Outcome::Fail(violations.render())
        }
    }

    /// Structured violations, in the order `check` renders them.
    pub fn inspect(&self, module: &Node, registry: &dyn ContractRegistry) -> Vec<Violation> {
        self.run(module, registry).violations.into_vec()
    }

    /// Names of export-decorated top-level functions, source order.
    pub fn collect_function_defs(&self, module: &Node) -> Vec<String> {
        self.entry_points(module).exports
    }

    /// Exports and constructor, gathered without consulting a registry.
    pub fn entry_points(&self, module: &Node) -> EntryPoints {
        let mut points = EntryPoints::default();
        for func in module.functions() {
            let Some(name) = func.ident() else {
                continue;
            };
            for marker in func
                .decorators
                .iter()
                .filter_map(|d| visit::decorator_marker(self.policy, d))
            {
                if self.policy.is_export(marker) && !points.exports.iter().any(|e| e == name) {
                    points.exports.push(name.to_string());
                } else if self.policy.is_constructor(marker) && points.constructor.is_none() {
                    points.constructor = Some(name.to_string());
                }
            }
        }
        points
    }

    fn run<'a>(&'a self, module: &Node, registry: &'a dyn ContractRegistry) -> LinterState<'a> {
        let mut state = LinterState::new(self.policy, registry);
        state.run(module);
        tracing::debug!(
            violations = state.violations.len(),
            exports = state.functions.len(),
            constructor = state.constructor.as_deref().unwrap_or("-"),
            export_seen = state.export_seen,
            "contract checked"
        );
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anatomist::{NodeKind, ParserHost};
    use common::registry::{MemoryRegistry, RegistryError};
    use common::ViolationCode;

    fn parse(source: &str) -> Node {
        ParserHost::new().unwrap().parse_str(source).unwrap()
    }

    fn check(source: &str) -> Outcome {
        Linter::new(PolicyTables::standard()).check(&parse(source), &MemoryRegistry::new())
    }

    fn check_with(source: &str, registry: &dyn ContractRegistry) -> Vec<String> {
        Linter::new(PolicyTables::standard())
            .check(&parse(source), registry)
            .violations()
            .to_vec()
    }

    fn codes(source: &str) -> Vec<ViolationCode> {
        Linter::new(PolicyTables::standard())
            .inspect(&parse(source), &MemoryRegistry::new())
            .into_iter()
            .map(|v| v.code)
            .collect()
    }

    /// A one-node tree for kind-table checks.
    fn lone(kind: NodeKind) -> Node {
        Node::new(NodeKind::Module, 1).with_children(vec![Node::new(kind, 1)])
    }

    struct FailingRegistry;

    impl ContractRegistry for FailingRegistry {
        fn exists(&self, name: &str) -> Result<bool, RegistryError> {
            Err(RegistryError::InvalidName(name.to_string()))
        }
    }

    #[test]
    fn test_simple_export_passes() {
        let outcome = check("@export\ndef a():\n    b = 10\n    return b\n");
        assert_eq!(outcome, Outcome::Pass);
        assert!(outcome.violations().is_empty());
    }

    #[test]
    fn test_augassign_passes() {
        assert!(check("@export\ndef a():\n    b = 0\n    b += 1\n").is_pass());
    }

    #[test]
    fn test_every_whitelisted_kind_passes_s1() {
        let policy = PolicyTables::default();
        let linter = Linter::new(&policy);
        for kind in policy.whitelist() {
            let found = linter.inspect(&lone(kind), &MemoryRegistry::new());
            assert!(
                found.iter().all(|v| v.code != ViolationCode::S1),
                "{} should be allowed",
                kind
            );
        }
    }

    #[test]
    fn test_every_blacklisted_kind_reports_s1() {
        let policy = PolicyTables::default();
        let linter = Linter::new(&policy);
        for &kind in NodeKind::ALL {
            if policy.is_allowed(kind) || kind.is_definition() {
                continue;
            }
            let found = linter.inspect(&lone(kind), &MemoryRegistry::new());
            let s1: Vec<_> = found.iter().filter(|v| v.code == ViolationCode::S1).collect();
            assert_eq!(s1.len(), 1, "{} should be rejected once", kind);
            assert_eq!(
                s1[0].to_string(),
                format!("Line 1 : S1- Illegal seneca syntax type used : {}", kind)
            );
        }
    }

    #[test]
    fn test_underscore_assignment_reported_first() {
        let outcome = check("\n@export\ndef a():\n    __ruh_roh__ = 'shaggy'\n");
        assert_eq!(
            outcome.violations()[0],
            "Line 4 : S2- Illicit use of '_' before variable : __ruh_roh__"
        );
        assert_eq!(outcome.violations().len(), 1);

        assert!(check("\n@export\ndef a():\n    ruh_roh = 'shaggy'\n").is_pass());
    }

    #[test]
    fn test_underscore_identifier_shapes() {
        assert_eq!(codes("@export\ndef _a():\n    pass\n"), vec![ViolationCode::S2]);
        assert_eq!(codes("@export\ndef a(_x):\n    pass\n"), vec![ViolationCode::S2]);
        assert_eq!(codes("@export\ndef a():\n    f(_k=1)\n"), vec![ViolationCode::S2]);
        assert_eq!(codes("@export\ndef a(x):\n    f(k=x)\n"), vec![]);
    }

    #[test]
    fn test_attribute_access() {
        let outcome = check("@export\ndef a():\n    ruh_roh = 'shaggy'\n    ruh_roh.__dir__()\n");
        assert_eq!(
            outcome.violations(),
            ["Error : Incorrect use of <_> access denied for var : __dir__".to_string()]
        );
        assert!(check("@export\ndef a():\n    ruh_roh = 'shaggy'\n    ruh_roh.capitalize()\n").is_pass());
    }

    #[test]
    fn test_async_function_rejected_first() {
        let outcome = check("\n@export\nasync def a():\n    ruh_roh = 'shaggy'\n");
        assert_eq!(outcome.violations()[0], "Error : Illegal AST type: AsyncFunctionDef");
        // async functions never count as exports
        assert_eq!(
            outcome.violations().last().map(String::as_str),
            Some("S13- no valid export found")
        );
    }

    #[test]
    fn test_class_rejected_without_descent() {
        let source = "class Scooby:\n    _x = 1\n\n@export\ndef a():\n    return 1\n";
        assert_eq!(
            check(source).violations(),
            ["Error : Illegal AST type: ClassDef".to_string()]
        );
    }

    #[test]
    fn test_nested_import() {
        let outcome = check("@export\ndef a():\n    import something\n");
        assert_eq!(
            outcome.violations(),
            ["Line 3: S3- Illicit use of Nested imports: something".to_string()]
        );
    }

    #[test]
    fn test_top_level_import_lookup() {
        let source = "import something\n@export\ndef a():\n    b = 0\n    b += 1\n";
        assert_eq!(
            check_with(source, &MemoryRegistry::new()),
            vec!["Line 1: S5- Contract not found in lib: something".to_string()]
        );

        let registry: MemoryRegistry = ["something"].into_iter().collect();
        assert!(check_with(source, &registry).is_empty());
        assert!(!codes(source).contains(&ViolationCode::S3));
    }

    #[test]
    fn test_import_binding_underscore() {
        let registry: MemoryRegistry = ["_secret"].into_iter().collect();
        let source = "import _secret\n@export\ndef a():\n    return 1\n";
        assert_eq!(
            check_with(source, &registry),
            vec!["Line 1 : S2- Illicit use of '_' before variable : _secret".to_string()]
        );

        let aliased = "import _secret as s\n@export\ndef a():\n    return 1\n";
        assert!(check_with(aliased, &registry).is_empty());

        let registry: MemoryRegistry = ["token"].into_iter().collect();
        let hidden = "import token as _t\n@export\ndef a():\n    return 1\n";
        assert_eq!(
            check_with(hidden, &registry),
            vec!["Line 1 : S2- Illicit use of '_' before variable : _t".to_string()]
        );
    }

    #[test]
    fn test_import_under_top_level_if_is_nested() {
        let outcome = check("if x:\n    import y\n@export\ndef a():\n    pass\n");
        assert_eq!(
            outcome.violations(),
            ["Line 2: S3- Illicit use of Nested imports: y".to_string()]
        );
    }

    #[test]
    fn test_registry_failure_is_s5() {
        let source = "import something\n@export\ndef a():\n    return 1\n";
        assert_eq!(
            check_with(source, &FailingRegistry),
            vec!["Line 1: S5- Contract not found in lib: something".to_string()]
        );
    }

    #[test]
    fn test_import_from() {
        let source = "\nfrom something import _a\n@export\ndef a():\n    b = 0\n    b += 1\n";
        assert_eq!(
            check(source).violations(),
            ["Line 2: S4- ImportFrom ast nodes not yet supported".to_string()]
        );
    }

    #[test]
    fn test_no_export() {
        assert_eq!(
            check("def a():\n    b = 0\n    b += 1\n").violations(),
            ["S13- no valid export found".to_string()]
        );
    }

    #[test]
    fn test_terminal_check_is_last() {
        let found = codes("def a():\n    x = lambda: 1\n");
        assert_eq!(found, vec![ViolationCode::S1, ViolationCode::S13]);
    }

    #[test]
    fn test_decorator_rules() {
        // unknown decorator
        let outcome = check("@export\ndef a():\n    pass\n@pytest.fixture\ndef b():\n    pass\n");
        assert_eq!(
            outcome.violations(),
            ["Line 4: S8- Invalid decorator used: pytest.fixture".to_string()]
        );

        // two decorators
        let found = codes("@export\n@construct\ndef a():\n    pass\n");
        assert_eq!(found, vec![ViolationCode::S10]);

        // two constructors
        let source = "@construct\ndef seed():\n    pass\n@construct\ndef seed2():\n    pass\n@export\ndef a():\n    pass\n";
        assert_eq!(
            check(source).violations(),
            ["Line 5: S9- Multiple use of constructors detected: seed2".to_string()]
        );
    }

    #[test]
    fn test_storage_rules() {
        let multiple = "balances = owners = Hash(default_value=0)\n@export\ndef a():\n    pass\n";
        assert_eq!(
            check(multiple).violations(),
            ["Line 1: S12- Multiple targets to ORM definition detected: Hash".to_string()]
        );

        let unpacked = "a, b = Hash()\n@export\ndef f():\n    pass\n";
        assert_eq!(
            check(unpacked).violations(),
            ["Line 1: S12- Multiple targets to ORM definition detected: Hash".to_string()]
        );

        let reserved = "v = Variable(contract='x')\n@export\ndef a():\n    pass\n";
        assert_eq!(
            check(reserved).violations(),
            ["Line 1: S11- Illicit keyword overloading: contract".to_string()]
        );

        let rebound = "Hash = 1\n@export\ndef a():\n    pass\n";
        assert_eq!(
            check(rebound).violations(),
            ["Line 1: S11- Illicit keyword overloading: Hash".to_string()]
        );

        assert!(check("balances = Hash(default_value=0)\n@export\ndef a():\n    pass\n").is_pass());
    }

    #[test]
    fn test_collect_function_defs_order() {
        let source = "\
@export
def a():
    return 42

def helper():
    return 0

@export
def b():
    return 1000000

@export
def x():
    return 64

@export
def y():
    return 24
";
        let linter = Linter::new(PolicyTables::standard());
        assert_eq!(linter.collect_function_defs(&parse(source)), vec!["a", "b", "x", "y"]);
    }

    #[test]
    fn test_entry_points() {
        let source = "@construct\ndef seed():\n    pass\n@export\ndef transfer():\n    pass\n";
        let points = Linter::new(PolicyTables::standard()).entry_points(&parse(source));
        assert_eq!(points.exports, vec!["transfer"]);
        assert_eq!(points.constructor.as_deref(), Some("seed"));
    }

    #[test]
    fn test_async_functions_are_not_entry_points() {
        let linter = Linter::new(PolicyTables::standard());
        let module = parse("@export\nasync def a():\n    return 1\n");
        assert!(linter.collect_function_defs(&module).is_empty());
        assert_eq!(linter.check(&module, &MemoryRegistry::new()), Outcome::Fail(vec![
            "Error : Illegal AST type: AsyncFunctionDef".to_string(),
            "S13- no valid export found".to_string(),
        ]));

        let module = parse("@construct\nasync def seed():\n    pass\n@export\ndef b():\n    pass\n");
        let points = linter.entry_points(&module);
        assert_eq!(points.exports, vec!["b"]);
        assert_eq!(points.constructor, None);
    }

    #[test]
    fn test_custom_decorators() {
        let policy = PolicyTables::default().with_decorators("seneca_export", "seed");
        let module = parse("@seneca_export\ndef a():\n    return 1\n");
        assert!(Linter::new(&policy).check(&module, &MemoryRegistry::new()).is_pass());
        assert!(!check("@seneca_export\ndef a():\n    return 1\n").is_pass());
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(check("def a():\n    pass\n")).unwrap();
        assert_eq!(json["status"], "fail");
        assert_eq!(json["violations"][0], "S13- no valid export found");
    }
}
