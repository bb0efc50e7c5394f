//! Single pre-order traversal applying every admission rule.

use anatomist::Node;
use common::{ContractRegistry, NodeKind, PolicyTables, ViolationCode};

use crate::violation::{Violation, Violations};

/// Per-check scratch. Created for one `check` call and dropped after it.
pub(crate) struct LinterState<'a> {
    policy: &'a PolicyTables,
    registry: &'a dyn ContractRegistry,
    pub(crate) violations: Violations,
    pub(crate) export_seen: bool,
    /// Export-decorated top-level functions, source order.
    pub(crate) functions: Vec<String>,
    pub(crate) constructor: Option<String>,
}

impl<'a> LinterState<'a> {
    pub(crate) fn new(policy: &'a PolicyTables, registry: &'a dyn ContractRegistry) -> Self {
        Self {
            policy,
            registry,
            violations: Violations::new(),
            export_seen: false,
            functions: Vec::new(),
            constructor: None,
        }
    }

    /// Walks `module` and appends the terminal export check.
    pub(crate) fn run(&mut self, module: &Node) {
        self.visit(module, false);
        if !self.export_seen {
            self.violations.push(Violation::no_export());
        }
    }

    /// `top_level` is true for direct children of the module.
    fn visit(&mut self, node: &Node, top_level: bool) {
        if matches!(node.kind, NodeKind::ClassDef | NodeKind::AsyncFunctionDef) {
            self.violations.push(Violation::illegal_definition(node.kind));
            return;
        }
        if !self.policy.is_allowed(node.kind) {
            self.violations
                .push(Violation::illegal_syntax(node.kind, node.line));
            return;
        }

        match node.kind {
            NodeKind::Name | NodeKind::Arg | NodeKind::Keyword => self.check_ident(node),
            NodeKind::Attribute => {
                if let Some(attr) = node.ident().filter(|a| a.starts_with('_')) {
                    self.violations
                        .push(Violation::attribute_access(attr, node.line));
                }
            }
            NodeKind::FunctionDef => {
                self.check_ident(node);
                self.check_decorators(node, top_level);
            }
            NodeKind::Import => self.check_import(node, top_level),
            // `import a.b` binds `a`; an `as` binding is a child `Name`.
            NodeKind::Alias if node.children.is_empty() => {
                if let Some(bound) = node
                    .ident()
                    .and_then(|module| module.split('.').next())
                    .filter(|b| b.starts_with('_'))
                {
                    self.violations.push(Violation::underscore(bound, node.line));
                }
            }
            NodeKind::ImportFrom => {
                self.violations.push(Violation::import_from(node.line));
                return;
            }
            NodeKind::Assign => self.check_storage(node),
            _ => {}
        }

        let children_top_level = node.kind == NodeKind::Module;
        for child in &node.children {
            self.visit(child, children_top_level);
        }
        for decorator in &node.decorators {
            self.visit(decorator, false);
        }
    }

    fn check_ident(&mut self, node: &Node) {
        if let Some(ident) = node.ident().filter(|i| i.starts_with('_')) {
            self.violations.push(Violation::underscore(ident, node.line));
        }
    }

    fn check_import(&mut self, node: &Node, top_level: bool) {
        for alias in &node.children {
            let Some(module) = alias.ident() else {
                continue;
            };
            if !top_level {
                self.violations
                    .push(Violation::statement(ViolationCode::S3, node.line, module));
                continue;
            }
            let found = match self.registry.exists(module) {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(module, error = %e, "registry lookup failed");
                    false
                }
            };
            if !found {
                self.violations
                    .push(Violation::statement(ViolationCode::S5, node.line, module));
            }
        }
    }

    fn check_decorators(&mut self, func: &Node, top_level: bool) {
        let name = func.ident().unwrap_or_default();
        if func.decorators.len() > 1 {
            self.violations
                .push(Violation::statement(ViolationCode::S10, func.line, name));
        }

        for decorator in &func.decorators {
            let marker = match decorator_marker(self.policy, decorator) {
                Some(marker) => marker,
                None => {
                    let text = decorator
                        .dotted_name()
                        .unwrap_or_else(|| decorator.kind.label().to_string());
                    self.violations
                        .push(Violation::statement(ViolationCode::S8, decorator.line, text));
                    continue;
                }
            };
            if !top_level {
                continue;
            }
            if self.policy.is_export(marker) {
                self.export_seen = true;
                if !self.functions.iter().any(|f| f == name) {
                    self.functions.push(name.to_string());
                }
            } else if self.policy.is_constructor(marker) {
                if self.constructor.is_some() {
                    self.violations
                        .push(Violation::statement(ViolationCode::S9, func.line, name));
                } else {
                    self.constructor = Some(name.to_string());
                }
            }
        }
    }

    /// Storage-cell rules for `target = Hash(...)` style definitions.
    fn check_storage(&mut self, assign: &Node) {
        let Some((targets, value)) = assign.assign_parts() else {
            return;
        };

        if let Some(cell) = self.storage_call(value) {
            let multiple = targets.len() > 1
                || targets
                    .iter()
                    .any(|t| matches!(t.kind, NodeKind::Tuple | NodeKind::List));
            if multiple {
                self.violations
                    .push(Violation::statement(ViolationCode::S12, assign.line, cell));
            }
            for keyword in value.children.iter().filter(|c| c.kind == NodeKind::Keyword) {
                if let Some(kw) = keyword.ident() {
                    if self.policy.is_reserved_cell_keyword(kw) {
                        self.violations
                            .push(Violation::statement(ViolationCode::S11, keyword.line, kw));
                    }
                }
            }
        }

        for name in targets.iter().flat_map(bound_names) {
            if self.policy.is_storage_cell(name) {
                self.violations
                    .push(Violation::statement(ViolationCode::S11, assign.line, name));
            }
        }
    }

    /// Name of the storage-cell constructor called by `value`, if any.
    fn storage_call<'n>(&self, value: &'n Node) -> Option<&'n str> {
        if value.kind != NodeKind::Call {
            return None;
        }
        let callee = value.children.first()?;
        if callee.kind != NodeKind::Name {
            return None;
        }
        callee.ident().filter(|name| self.policy.is_storage_cell(name))
    }
}

/// The policy marker named by a bare-name decorator, if it is one.
pub(crate) fn decorator_marker<'n>(policy: &PolicyTables, decorator: &'n Node) -> Option<&'n str> {
    match (decorator.kind, decorator.ident()) {
        (NodeKind::Name, Some(ident)) if policy.decorators().contains(ident) => Some(ident),
        _ => None,
    }
}

/// Plain names bound by an assignment target (`a`, `a, b`, `[a, *b]`).
fn bound_names(target: &Node) -> Vec<&str> {
    match target.kind {
        NodeKind::Name => target.ident().into_iter().collect(),
        NodeKind::Tuple | NodeKind::List | NodeKind::Starred => {
            target.children.iter().flat_map(bound_names).collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::registry::MemoryRegistry;

    fn load(kind: NodeKind) -> Node {
        Node::new(kind, 1)
    }

    fn name(id: &str, line: u32) -> Node {
        Node::named(NodeKind::Name, line, id).with_children(vec![Node::new(NodeKind::Load, line)])
    }

    #[test]
    fn test_bound_names() {
        let tuple = Node::new(NodeKind::Tuple, 1).with_children(vec![
            name("a", 1),
            name("Hash", 1),
            load(NodeKind::Store),
        ]);
        assert_eq!(bound_names(&tuple), vec!["a", "Hash"]);
        assert!(bound_names(&load(NodeKind::Num)).is_empty());
    }

    #[test]
    fn test_blacklisted_subtree_not_descended() {
        let policy = PolicyTables::default();
        let registry = MemoryRegistry::new();
        let mut state = LinterState::new(&policy, &registry);

        // lambda: _hidden  -> one S1, no S2 from inside the lambda
        let lambda = Node::new(NodeKind::Lambda, 2).with_children(vec![
            Node::new(NodeKind::Arguments, 2),
            name("_hidden", 2),
        ]);
        let module = Node::new(NodeKind::Module, 1).with_children(vec![
            Node::new(NodeKind::Expr, 2).with_children(vec![lambda]),
            Node::new(NodeKind::Expr, 3).with_children(vec![name("_later", 3)]),
        ]);
        state.visit(&module, false);

        let codes: Vec<_> = state.violations.iter().map(|v| v.code).collect();
        assert_eq!(codes, vec![ViolationCode::S1, ViolationCode::S2]);
        assert_eq!(state.violations.iter().nth(1).unwrap().line, Some(3));
    }

    #[test]
    fn test_run_appends_terminal_last() {
        let policy = PolicyTables::default();
        let registry = MemoryRegistry::new();
        let mut state = LinterState::new(&policy, &registry);
        let module = Node::new(NodeKind::Module, 1)
            .with_children(vec![Node::new(NodeKind::Expr, 1).with_children(vec![name("_x", 1)])]);
        state.run(&module);

        let rendered = state.violations.render();
        assert_eq!(rendered.last().map(String::as_str), Some("S13- no valid export found"));
        assert_eq!(rendered.len(), 2);
    }
}
