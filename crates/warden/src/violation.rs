//! Structured policy violations and their rendered forms.
//!
//! Rendering is deliberately irregular: each rule family keeps the exact text
//! downstream tooling matches on, spacing around `:` included.

use std::fmt;

use common::{NodeKind, ViolationCode};
use serde::Serialize;

/// Which fixed output shape a violation is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// `Line <n> : Sx- <desc> : <detail>`
    Spaced,
    /// `Line <n>: Sx- <desc>: <detail>`
    Compact,
    /// `Line <n>: Sx- <desc>`
    LineOnly,
    /// `Error : Incorrect use of <_> access denied for var : <attr>`
    AccessDenied,
    /// `Error : Illegal AST type: <kind>`
    IllegalType,
    /// `Sx- <desc>`
    Terminal,
}

/// One policy breach found in a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub code: ViolationCode,
    pub line: Option<u32>,
    /// Offending token: kind label, identifier, module or decorator text.
    pub detail: Option<String>,
    pub template: Template,
}

impl Violation {
    fn new(code: ViolationCode, line: Option<u32>, detail: Option<String>, template: Template) -> Self {
        Self {
            code,
            line,
            detail,
            template,
        }
    }

    /// S1: node kind outside the whitelist.
    pub fn illegal_syntax(kind: NodeKind, line: u32) -> Self {
        Self::new(ViolationCode::S1, Some(line), Some(kind.label().to_string()), Template::Spaced)
    }

    /// S2: identifier starting with `_`.
    pub fn underscore(ident: &str, line: u32) -> Self {
        Self::new(ViolationCode::S2, Some(line), Some(ident.to_string()), Template::Spaced)
    }

    /// S2 on an attribute access. The line is kept for reports but not rendered.
    pub fn attribute_access(attr: &str, line: u32) -> Self {
        Self::new(ViolationCode::S2, Some(line), Some(attr.to_string()), Template::AccessDenied)
    }

    /// S4: `from X import Y`.
    pub fn import_from(line: u32) -> Self {
        Self::new(ViolationCode::S4, Some(line), None, Template::LineOnly)
    }

    /// S6/S7: class or async function definition.
    pub fn illegal_definition(kind: NodeKind) -> Self {
        let code = if kind == NodeKind::ClassDef {
            ViolationCode::S6
        } else {
            ViolationCode::S7
        };
        Self::new(code, None, Some(kind.label().to_string()), Template::IllegalType)
    }

    /// S13: the contract exposes nothing.
    pub fn no_export() -> Self {
        Self::new(ViolationCode::S13, None, None, Template::Terminal)
    }

    /// Statement-level rules (S3, S5, S8-S12).
    pub fn statement(code: ViolationCode, line: u32, detail: impl Into<String>) -> Self {
        Self::new(code, Some(line), Some(detail.into()), Template::Compact)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.line.unwrap_or_default();
        let detail = self.detail.as_deref().unwrap_or_default();
        let trigger = self.code.trigger();
        match self.template {
            Template::Spaced => write!(f, "Line {} : {} : {}", line, trigger, detail),
            Template::Compact => write!(f, "Line {}: {}: {}", line, trigger, detail),
            Template::LineOnly => write!(f, "Line {}: {}", line, trigger),
            Template::AccessDenied => {
                write!(f, "Error : Incorrect use of <_> access denied for var : {}", detail)
            }
            Template::IllegalType => write!(f, "Error : Illegal AST type: {}", detail),
            Template::Terminal => f.write_str(&trigger),
        }
    }
}

/// Ordered accumulator threaded through one check.
#[derive(Debug, Default, Clone)]
pub struct Violations {
    items: Vec<Violation>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        tracing::trace!(code = %violation.code, line = ?violation.line, "violation");
        self.items.push(violation);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.items.iter()
    }

    /// Rendered strings, in recording order.
    pub fn render(&self) -> Vec<String> {
        self.items.iter().map(Violation::to_string).collect()
    }

    pub fn into_vec(self) -> Vec<Violation> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates() {
        assert_eq!(
            Violation::illegal_syntax(NodeKind::Lambda, 3).to_string(),
            "Line 3 : S1- Illegal seneca syntax type used : Lambda"
        );
        assert_eq!(
            Violation::underscore("__package__", 1).to_string(),
            "Line 1 : S2- Illicit use of '_' before variable : __package__"
        );
        assert_eq!(
            Violation::attribute_access("__dir__", 5).to_string(),
            "Error : Incorrect use of <_> access denied for var : __dir__"
        );
        assert_eq!(
            Violation::import_from(2).to_string(),
            "Line 2: S4- ImportFrom ast nodes not yet supported"
        );
        assert_eq!(
            Violation::statement(ViolationCode::S5, 2, "something").to_string(),
            "Line 2: S5- Contract not found in lib: something"
        );
        assert_eq!(
            Violation::illegal_definition(NodeKind::AsyncFunctionDef).to_string(),
            "Error : Illegal AST type: AsyncFunctionDef"
        );
        assert_eq!(Violation::no_export().to_string(), "S13- no valid export found");
    }

    #[test]
    fn test_definition_codes() {
        assert_eq!(Violation::illegal_definition(NodeKind::ClassDef).code, ViolationCode::S6);
        assert_eq!(
            Violation::illegal_definition(NodeKind::AsyncFunctionDef).code,
            ViolationCode::S7
        );
    }

    #[test]
    fn test_accumulator_keeps_order() {
        let mut violations = Violations::new();
        assert!(violations.is_empty());
        violations.push(Violation::import_from(7));
        violations.push(Violation::no_export());
        assert_eq!(violations.len(), 2);
        assert_eq!(
            violations.render(),
            vec![
                "Line 7: S4- ImportFrom ast nodes not yet supported".to_string(),
                "S13- no valid export found".to_string(),
            ]
        );
    }
}
