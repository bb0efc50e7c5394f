//! # CST Lowering
//!
//! Converts a tree-sitter Python concrete syntax tree into [`Node`]s.
//!
//! Child order follows Python `ast` field order (e.g. `Compare` is `left`,
//! all operators, then all comparators) so that a pre-order walk reports
//! violations in the same order as the reference toolchain.
//!
//! Every tree-sitter production maps to exactly one [`NodeKind`] or to an
//! [`AnatomistError::Syntax`]; there is no catch-all kind.

use std::cell::Cell;

use crate::{AnatomistError, Node};
use common::NodeKind;
use tree_sitter::Node as TsNode;

type Result<T> = std::result::Result<T, AnatomistError>;

/// Deepest statement/expression nesting accepted before lowering gives up.
pub const MAX_NESTING: usize = 200;

/// Lowers tree-sitter nodes backed by `source`.
pub struct Lowerer<'s> {
    source: &'s [u8],
    depth: Cell<usize>,
}

/// One level of lowering recursion; dropping it pops the level.
struct Nesting<'l> {
    depth: &'l Cell<usize>,
}

impl Drop for Nesting<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

fn line_of(node: TsNode<'_>) -> u32 {
    node.start_position().row as u32 + 1 // tree-sitter uses 0-based rows
}

/// Named children, comments and line continuations removed.
fn named<'t>(node: TsNode<'t>) -> Vec<TsNode<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| !c.is_extra())
        .collect()
}

fn fields<'t>(node: TsNode<'t>, field: &str) -> Vec<TsNode<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor)
        .filter(|c| !c.is_extra())
        .collect()
}

/// `true` if `node` has an anonymous child token of kind `token`.
fn has_token(node: TsNode<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|c| !c.is_named() && c.kind() == token);
    found
}

fn unsupported(node: TsNode<'_>) -> AnatomistError {
    AnatomistError::Syntax {
        line: line_of(node),
        message: format!("unsupported construct `{}`", node.kind()),
    }
}

fn required<'t>(node: TsNode<'t>, field: &str) -> Result<TsNode<'t>> {
    node.child_by_field_name(field)
        .ok_or_else(|| AnatomistError::Syntax {
            line: line_of(node),
            message: format!("`{}` is missing its {}", node.kind(), field),
        })
}

fn binary_op(token: &str) -> Option<NodeKind> {
    Some(match token {
        "+" => NodeKind::Add,
        "-" => NodeKind::Sub,
        "*" => NodeKind::Mult,
        "@" => NodeKind::MatMult,
        "/" => NodeKind::Div,
        "%" => NodeKind::Mod,
        "**" => NodeKind::Pow,
        "<<" => NodeKind::LShift,
        ">>" => NodeKind::RShift,
        "|" => NodeKind::BitOr,
        "^" => NodeKind::BitXor,
        "&" => NodeKind::BitAnd,
        "//" => NodeKind::FloorDiv,
        _ => return None,
    })
}

fn compare_op(token: &str) -> Option<NodeKind> {
    Some(match token {
        "==" => NodeKind::Eq,
        "!=" | "<>" => NodeKind::NotEq,
        "<" => NodeKind::Lt,
        "<=" => NodeKind::LtE,
        ">" => NodeKind::Gt,
        ">=" => NodeKind::GtE,
        "is" => NodeKind::Is,
        "is not" => NodeKind::IsNot,
        "in" => NodeKind::In,
        "not in" => NodeKind::NotIn,
        _ => return None,
    })
}

impl<'s> Lowerer<'s> {
    pub fn new(source: &'s [u8]) -> Self {
        Self {
            source,
            depth: Cell::new(0),
        }
    }

    fn nest(&self, node: TsNode<'_>) -> Result<Nesting<'_>> {
        let depth = self.depth.get() + 1;
        if depth > MAX_NESTING {
            return Err(AnatomistError::Syntax {
                line: line_of(node),
                message: format!("too many nested levels (limit {})", MAX_NESTING),
            });
        }
        self.depth.set(depth);
        Ok(Nesting { depth: &self.depth })
    }

    fn text(&self, node: TsNode<'_>) -> Result<&'s str> {
        std::str::from_utf8(&self.source[node.start_byte()..node.end_byte()])
            .map_err(|_| AnatomistError::ParseFailure("Non-UTF-8 source".to_string()))
    }

    /// Lowers the tree-sitter `module` root.
    pub fn module(&self, root: TsNode<'_>) -> Result<Node> {
        Ok(Node::new(NodeKind::Module, 1).with_children(self.block(root)?))
    }

    fn block(&self, node: TsNode<'_>) -> Result<Vec<Node>> {
        named(node)
            .into_iter()
            .map(|stmt| self.statement(stmt))
            .collect()
    }

    /// Body of a clause whose statements live under a `body`/`consequence` block.
    fn body(&self, node: TsNode<'_>, field: &str) -> Result<Vec<Node>> {
        self.block(required(node, field)?)
    }

    fn statement(&self, node: TsNode<'_>) -> Result<Node> {
        let _nesting = self.nest(node)?;
        let line = line_of(node);
        match node.kind() {
            "expression_statement" => {
                let parts = named(node);
                match parts.as_slice() {
                    [single] if single.kind() == "assignment" => self.assignment(*single, line),
                    [single] if single.kind() == "augmented_assignment" => {
                        self.aug_assignment(*single, line)
                    }
                    [single] => Ok(Node::new(NodeKind::Expr, line)
                        .with_children(vec![self.expr(*single, NodeKind::Load)?])),
                    many => {
                        let elts = self.exprs(many, NodeKind::Load)?;
                        Ok(Node::new(NodeKind::Expr, line)
                            .with_children(vec![self.sequence(NodeKind::Tuple, line, elts, NodeKind::Load)]))
                    }
                }
            }
            "return_statement" => {
                let value = named(node);
                Ok(Node::new(NodeKind::Return, line).with_children(self.exprs(&value, NodeKind::Load)?))
            }
            "pass_statement" => Ok(Node::new(NodeKind::Pass, line)),
            "break_statement" => Ok(Node::new(NodeKind::Break, line)),
            "continue_statement" => Ok(Node::new(NodeKind::Continue, line)),
            "if_statement" => self.if_statement(node),
            "for_statement" => {
                let kind = if has_token(node, "async") {
                    NodeKind::AsyncFor
                } else {
                    NodeKind::For
                };
                let mut children = vec![
                    self.expr(required(node, "left")?, NodeKind::Store)?,
                    self.expr(required(node, "right")?, NodeKind::Load)?,
                ];
                children.extend(self.body(node, "body")?);
                children.extend(self.else_clause(node)?);
                Ok(Node::new(kind, line).with_children(children))
            }
            "while_statement" => {
                let mut children = vec![self.expr(required(node, "condition")?, NodeKind::Load)?];
                children.extend(self.body(node, "body")?);
                children.extend(self.else_clause(node)?);
                Ok(Node::new(NodeKind::While, line).with_children(children))
            }
            "function_definition" => self.function(node, Vec::new()),
            "class_definition" => self.class(node, Vec::new()),
            "decorated_definition" => {
                let decorators = named(node)
                    .into_iter()
                    .filter(|c| c.kind() == "decorator")
                    .map(|d| {
                        let expr = named(d).into_iter().next().ok_or_else(|| unsupported(d))?;
                        self.expr(expr, NodeKind::Load)
                    })
                    .collect::<Result<Vec<_>>>()?;
                let definition = required(node, "definition")?;
                match definition.kind() {
                    "function_definition" => self.function(definition, decorators),
                    "class_definition" => self.class(definition, decorators),
                    _ => Err(unsupported(definition)),
                }
            }
            "import_statement" => {
                let aliases = fields(node, "name")
                    .into_iter()
                    .map(|n| self.alias(n))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Node::new(NodeKind::Import, line).with_children(aliases))
            }
            "import_from_statement" => {
                let module = self.text(required(node, "module_name")?)?;
                let mut aliases = fields(node, "name")
                    .into_iter()
                    .map(|n| self.alias(n))
                    .collect::<Result<Vec<_>>>()?;
                if named(node).iter().any(|c| c.kind() == "wildcard_import") {
                    aliases.push(Node::named(NodeKind::Alias, line, "*"));
                }
                Ok(Node::named(NodeKind::ImportFrom, line, module).with_children(aliases))
            }
            "future_import_statement" => {
                let aliases = fields(node, "name")
                    .into_iter()
                    .map(|n| self.alias(n))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Node::named(NodeKind::ImportFrom, line, "__future__").with_children(aliases))
            }
            "global_statement" | "nonlocal_statement" => {
                let kind = if node.kind() == "global_statement" {
                    NodeKind::Global
                } else {
                    NodeKind::Nonlocal
                };
                let names = named(node)
                    .into_iter()
                    .map(|n| self.expr(n, NodeKind::Store))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Node::new(kind, line).with_children(names))
            }
            "assert_statement" => {
                let parts = named(node);
                Ok(Node::new(NodeKind::Assert, line).with_children(self.exprs(&parts, NodeKind::Load)?))
            }
            "delete_statement" => {
                let mut targets = Vec::new();
                for target in named(node) {
                    if target.kind() == "expression_list" {
                        targets.extend(self.exprs(&named(target), NodeKind::Del)?);
                    } else {
                        targets.push(self.expr(target, NodeKind::Del)?);
                    }
                }
                Ok(Node::new(NodeKind::Delete, line).with_children(targets))
            }
            "raise_statement" => {
                let parts = named(node);
                Ok(Node::new(NodeKind::Raise, line).with_children(self.exprs(&parts, NodeKind::Load)?))
            }
            "try_statement" => {
                let mut children = self.body(node, "body")?;
                for clause in named(node) {
                    match clause.kind() {
                        "except_clause" | "except_group_clause" => {
                            let mut handler = Vec::new();
                            for part in named(clause) {
                                if part.kind() == "block" {
                                    handler.extend(self.block(part)?);
                                } else {
                                    handler.push(self.expr(part, NodeKind::Load)?);
                                }
                            }
                            children.push(
                                Node::new(NodeKind::ExceptHandler, line_of(clause)).with_children(handler),
                            );
                        }
                        "else_clause" | "finally_clause" => {
                            for part in named(clause) {
                                if part.kind() == "block" {
                                    children.extend(self.block(part)?);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Node::new(NodeKind::Try, line).with_children(children))
            }
            "with_statement" => {
                let kind = if has_token(node, "async") {
                    NodeKind::AsyncWith
                } else {
                    NodeKind::With
                };
                let mut children = Vec::new();
                for part in named(node) {
                    if part.kind() == "with_clause" {
                        for item in named(part) {
                            let value = required(item, "value")?;
                            let exprs = if value.kind() == "as_pattern" {
                                let inner = named(value);
                                let mut lowered = Vec::new();
                                if let Some(first) = inner.first() {
                                    lowered.push(self.expr(*first, NodeKind::Load)?);
                                }
                                if let Some(alias) = value.child_by_field_name("alias") {
                                    lowered.push(self.expr(alias, NodeKind::Store)?);
                                }
                                lowered
                            } else {
                                vec![self.expr(value, NodeKind::Load)?]
                            };
                            children.push(Node::new(NodeKind::WithItem, line_of(item)).with_children(exprs));
                        }
                    }
                }
                children.extend(self.body(node, "body")?);
                Ok(Node::new(kind, line).with_children(children))
            }
            "match_statement" => {
                let subjects = fields(node, "subject");
                Ok(Node::new(NodeKind::Match, line).with_children(self.exprs(&subjects, NodeKind::Load)?))
            }
            "type_alias_statement" => Ok(Node::new(NodeKind::TypeAlias, line)),
            // tree-sitter keeps the Python 2 `print` production. Only the
            // single parenthesized form is also valid call syntax.
            "print_statement" => {
                let parts = named(node);
                let [arg] = parts.as_slice() else {
                    return Err(unsupported(node));
                };
                let parenthesized = matches!(arg.kind(), "parenthesized_expression" | "tuple")
                    && self.text(*arg)?.starts_with('(');
                if !parenthesized {
                    return Err(unsupported(node));
                }
                let args = self.exprs(&named(*arg), NodeKind::Load)?;
                let mut call = vec![Node::named(NodeKind::Name, line, "print")
                    .with_children(vec![Node::new(NodeKind::Load, line)])];
                call.extend(args);
                Ok(Node::new(NodeKind::Expr, line)
                    .with_children(vec![Node::new(NodeKind::Call, line).with_children(call)]))
            }
            _ => Err(unsupported(node)),
        }
    }

    fn else_clause(&self, node: TsNode<'_>) -> Result<Vec<Node>> {
        match node.child_by_field_name("alternative") {
            Some(clause) => self.body(clause, "body"),
            None => Ok(Vec::new()),
        }
    }

    fn if_statement(&self, node: TsNode<'_>) -> Result<Node> {
        let mut children = vec![self.expr(required(node, "condition")?, NodeKind::Load)?];
        children.extend(self.body(node, "consequence")?);
        children.extend(self.or_else(&fields(node, "alternative"))?);
        Ok(Node::new(NodeKind::If, line_of(node)).with_children(children))
    }

    /// `elif` chains nest as `If` nodes in the `orelse` position.
    fn or_else(&self, alternatives: &[TsNode<'_>]) -> Result<Vec<Node>> {
        let Some((first, rest)) = alternatives.split_first() else {
            return Ok(Vec::new());
        };
        match first.kind() {
            "else_clause" => self.body(*first, "body"),
            "elif_clause" => {
                let _nesting = self.nest(*first)?;
                let mut children = vec![self.expr(required(*first, "condition")?, NodeKind::Load)?];
                children.extend(self.body(*first, "consequence")?);
                children.extend(self.or_else(rest)?);
                Ok(vec![Node::new(NodeKind::If, line_of(*first)).with_children(children)])
            }
            _ => Err(unsupported(*first)),
        }
    }

    fn function(&self, node: TsNode<'_>, decorators: Vec<Node>) -> Result<Node> {
        let line = line_of(node);
        let kind = if has_token(node, "async") {
            NodeKind::AsyncFunctionDef
        } else {
            NodeKind::FunctionDef
        };
        let name = self.text(required(node, "name")?)?;
        let mut children = vec![self.parameters(node.child_by_field_name("parameters"), line)?];
        children.extend(self.body(node, "body")?);
        if let Some(returns) = node.child_by_field_name("return_type") {
            children.push(self.expr(returns, NodeKind::Load)?);
        }
        Ok(Node::named(kind, line, name)
            .with_decorators(decorators)
            .with_children(children))
    }

    fn class(&self, node: TsNode<'_>, decorators: Vec<Node>) -> Result<Node> {
        let line = line_of(node);
        let name = self.text(required(node, "name")?)?;
        let mut children = match node.child_by_field_name("superclasses") {
            Some(bases) => self.arguments(bases)?,
            None => Vec::new(),
        };
        children.extend(self.body(node, "body")?);
        Ok(Node::named(NodeKind::ClassDef, line, name)
            .with_decorators(decorators)
            .with_children(children))
    }

    /// Lowers `parameters`/`lambda_parameters` into an `arguments` node:
    /// every `arg` first, then default values.
    fn parameters(&self, params: Option<TsNode<'_>>, line: u32) -> Result<Node> {
        let mut args = Vec::new();
        let mut defaults = Vec::new();
        let Some(params) = params else {
            return Ok(Node::new(NodeKind::Arguments, line));
        };
        for param in named(params) {
            match param.kind() {
                "identifier" => args.push(Node::named(NodeKind::Arg, line_of(param), self.text(param)?)),
                "typed_parameter" => {
                    let target = named(param).into_iter().next().ok_or_else(|| unsupported(param))?;
                    let mut arg = self.param_name(target)?;
                    if let Some(ty) = param.child_by_field_name("type") {
                        arg.children.push(self.expr(ty, NodeKind::Load)?);
                    }
                    args.push(arg);
                }
                "default_parameter" | "typed_default_parameter" => {
                    let mut arg = self.param_name(required(param, "name")?)?;
                    if let Some(ty) = param.child_by_field_name("type") {
                        arg.children.push(self.expr(ty, NodeKind::Load)?);
                    }
                    args.push(arg);
                    defaults.push(self.expr(required(param, "value")?, NodeKind::Load)?);
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => args.push(self.param_name(param)?),
                "keyword_separator" | "positional_separator" => {}
                _ => return Err(unsupported(param)),
            }
        }
        args.extend(defaults);
        Ok(Node::new(NodeKind::Arguments, line_of(params)).with_children(args))
    }

    fn param_name(&self, node: TsNode<'_>) -> Result<Node> {
        match node.kind() {
            "identifier" => Ok(Node::named(NodeKind::Arg, line_of(node), self.text(node)?)),
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                let inner = named(node).into_iter().next().ok_or_else(|| unsupported(node))?;
                self.param_name(inner)
            }
            _ => Err(unsupported(node)),
        }
    }

    fn alias(&self, node: TsNode<'_>) -> Result<Node> {
        let line = line_of(node);
        match node.kind() {
            "dotted_name" => Ok(Node::named(NodeKind::Alias, line, self.text(node)?)),
            "aliased_import" => {
                let name = self.text(required(node, "name")?)?;
                let binding = self.expr(required(node, "alias")?, NodeKind::Store)?;
                Ok(Node::named(NodeKind::Alias, line, name).with_children(vec![binding]))
            }
            _ => Err(unsupported(node)),
        }
    }

    fn assignment(&self, node: TsNode<'_>, line: u32) -> Result<Node> {
        let target = self.expr(required(node, "left")?, NodeKind::Store)?;
        if let Some(annotation) = node.child_by_field_name("type") {
            let mut children = vec![target, self.expr(annotation, NodeKind::Load)?];
            if let Some(value) = node.child_by_field_name("right") {
                children.push(self.expr(value, NodeKind::Load)?);
            }
            return Ok(Node::new(NodeKind::AnnAssign, line).with_children(children));
        }

        let mut children = vec![target];
        let mut right = required(node, "right")?;
        while right.kind() == "assignment" {
            children.push(self.expr(required(right, "left")?, NodeKind::Store)?);
            right = required(right, "right")?;
        }
        children.push(self.expr(right, NodeKind::Load)?);
        Ok(Node::new(NodeKind::Assign, line).with_children(children))
    }

    fn aug_assignment(&self, node: TsNode<'_>, line: u32) -> Result<Node> {
        let operator = required(node, "operator")?;
        let op = binary_op(operator.kind().trim_end_matches('=')).ok_or_else(|| unsupported(operator))?;
        Ok(Node::new(NodeKind::AugAssign, line).with_children(vec![
            self.expr(required(node, "left")?, NodeKind::Store)?,
            Node::new(op, line),
            self.expr(required(node, "right")?, NodeKind::Load)?,
        ]))
    }

    fn exprs(&self, nodes: &[TsNode<'_>], ctx: NodeKind) -> Result<Vec<Node>> {
        nodes.iter().map(|n| self.expr(*n, ctx)).collect()
    }

    fn sequence(&self, kind: NodeKind, line: u32, mut elts: Vec<Node>, ctx: NodeKind) -> Node {
        elts.push(Node::new(ctx, line));
        Node::new(kind, line).with_children(elts)
    }

    /// Positional arguments first, then keywords (Python `Call` field order).
    fn arguments(&self, node: TsNode<'_>) -> Result<Vec<Node>> {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        for arg in named(node) {
            let line = line_of(arg);
            match arg.kind() {
                "keyword_argument" => {
                    let name = self.text(required(arg, "name")?)?;
                    let value = self.expr(required(arg, "value")?, NodeKind::Load)?;
                    keywords.push(Node::named(NodeKind::Keyword, line, name).with_children(vec![value]));
                }
                "dictionary_splat" => {
                    let inner = named(arg).into_iter().next().ok_or_else(|| unsupported(arg))?;
                    keywords.push(
                        Node::new(NodeKind::Keyword, line).with_children(vec![self.expr(inner, NodeKind::Load)?]),
                    );
                }
                _ => positional.push(self.expr(arg, NodeKind::Load)?),
            }
        }
        positional.extend(keywords);
        Ok(positional)
    }

    /// Lowers an expression in context `ctx` (`Load`, `Store` or `Del`).
    pub fn expr(&self, node: TsNode<'_>, ctx: NodeKind) -> Result<Node> {
        let _nesting = self.nest(node)?;
        let line = line_of(node);
        let context = || Node::new(ctx, line);
        match node.kind() {
            "identifier" | "keyword_identifier" => {
                Ok(Node::named(NodeKind::Name, line, self.text(node)?).with_children(vec![context()]))
            }
            "attribute" => {
                let value = self.expr(required(node, "object")?, NodeKind::Load)?;
                let attr = self.text(required(node, "attribute")?)?;
                Ok(Node::named(NodeKind::Attribute, line, attr).with_children(vec![value, context()]))
            }
            "subscript" => {
                let value = self.expr(required(node, "value")?, NodeKind::Load)?;
                let subscripts = fields(node, "subscript");
                let slice = match subscripts.as_slice() {
                    [single] if single.kind() == "slice" => self.slice(*single)?,
                    [single] => Node::new(NodeKind::Index, line)
                        .with_children(vec![self.expr(*single, NodeKind::Load)?]),
                    many => {
                        let mut elts = Vec::new();
                        for part in many {
                            elts.push(if part.kind() == "slice" {
                                self.slice(*part)?
                            } else {
                                self.expr(*part, NodeKind::Load)?
                            });
                        }
                        Node::new(NodeKind::Index, line)
                            .with_children(vec![self.sequence(NodeKind::Tuple, line, elts, NodeKind::Load)])
                    }
                };
                Ok(Node::new(NodeKind::Subscript, line).with_children(vec![value, slice, context()]))
            }
            "call" => {
                let mut children = vec![self.expr(required(node, "function")?, NodeKind::Load)?];
                let args = required(node, "arguments")?;
                if args.kind() == "generator_expression" {
                    children.push(self.expr(args, NodeKind::Load)?);
                } else {
                    children.extend(self.arguments(args)?);
                }
                Ok(Node::new(NodeKind::Call, line).with_children(children))
            }
            "binary_operator" => {
                let operator = required(node, "operator")?;
                let op = binary_op(operator.kind()).ok_or_else(|| unsupported(operator))?;
                Ok(Node::new(NodeKind::BinOp, line).with_children(vec![
                    self.expr(required(node, "left")?, NodeKind::Load)?,
                    Node::new(op, line),
                    self.expr(required(node, "right")?, NodeKind::Load)?,
                ]))
            }
            "unary_operator" => {
                let operator = required(node, "operator")?;
                let op = match operator.kind() {
                    "-" => NodeKind::USub,
                    "+" => NodeKind::UAdd,
                    "~" => NodeKind::Invert,
                    _ => return Err(unsupported(operator)),
                };
                Ok(Node::new(NodeKind::UnaryOp, line).with_children(vec![
                    Node::new(op, line),
                    self.expr(required(node, "argument")?, NodeKind::Load)?,
                ]))
            }
            "not_operator" => Ok(Node::new(NodeKind::UnaryOp, line).with_children(vec![
                Node::new(NodeKind::Not, line),
                self.expr(required(node, "argument")?, NodeKind::Load)?,
            ])),
            "boolean_operator" => {
                let operator = required(node, "operator")?.kind();
                let op = if operator == "and" { NodeKind::And } else { NodeKind::Or };
                let mut children = vec![Node::new(op, line)];
                self.flatten_bool(node, operator, &mut children)?;
                Ok(Node::new(NodeKind::BoolOp, line).with_children(children))
            }
            "comparison_operator" => {
                let operands = named(node);
                let ops = fields(node, "operators")
                    .into_iter()
                    .map(|op| {
                        compare_op(op.kind())
                            .map(|kind| Node::new(kind, line))
                            .ok_or_else(|| unsupported(op))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let (left, comparators) = operands.split_first().ok_or_else(|| unsupported(node))?;
                let mut children = vec![self.expr(*left, NodeKind::Load)?];
                children.extend(ops);
                children.extend(self.exprs(comparators, NodeKind::Load)?);
                Ok(Node::new(NodeKind::Compare, line).with_children(children))
            }
            "integer" | "float" => Ok(Node::named(NodeKind::Num, line, self.text(node)?)),
            "string" => Ok(Node::new(self.string_kind(node)?, line)),
            "concatenated_string" => {
                let mut kind = NodeKind::Str;
                for part in named(node) {
                    match self.string_kind(part)? {
                        NodeKind::JoinedStr => kind = NodeKind::JoinedStr,
                        NodeKind::Bytes if kind == NodeKind::Str => kind = NodeKind::Bytes,
                        _ => {}
                    }
                }
                Ok(Node::new(kind, line))
            }
            "true" => Ok(Node::named(NodeKind::NameConstant, line, "True")),
            "false" => Ok(Node::named(NodeKind::NameConstant, line, "False")),
            "none" => Ok(Node::named(NodeKind::NameConstant, line, "None")),
            "ellipsis" => Ok(Node::new(NodeKind::Ellipsis, line)),
            "list" | "list_pattern" => {
                let elts = self.exprs(&named(node), ctx)?;
                Ok(self.sequence(NodeKind::List, line, elts, ctx))
            }
            "tuple" | "expression_list" | "pattern_list" | "tuple_pattern" => {
                let elts = self.exprs(&named(node), ctx)?;
                Ok(self.sequence(NodeKind::Tuple, line, elts, ctx))
            }
            "set" => Ok(Node::new(NodeKind::Set, line).with_children(self.exprs(&named(node), NodeKind::Load)?)),
            "dictionary" => {
                let mut keys = Vec::new();
                let mut values = Vec::new();
                for entry in named(node) {
                    match entry.kind() {
                        "pair" => {
                            keys.push(self.expr(required(entry, "key")?, NodeKind::Load)?);
                            values.push(self.expr(required(entry, "value")?, NodeKind::Load)?);
                        }
                        "dictionary_splat" => {
                            for inner in named(entry) {
                                values.push(self.expr(inner, NodeKind::Load)?);
                            }
                        }
                        _ => return Err(unsupported(entry)),
                    }
                }
                keys.extend(values);
                Ok(Node::new(NodeKind::Dict, line).with_children(keys))
            }
            "list_comprehension" => self.comprehension(node, NodeKind::ListComp),
            "set_comprehension" => self.comprehension(node, NodeKind::SetComp),
            "generator_expression" => self.comprehension(node, NodeKind::GeneratorExp),
            "dictionary_comprehension" => self.comprehension(node, NodeKind::DictComp),
            "parenthesized_expression" => {
                let inner = named(node).into_iter().next().ok_or_else(|| unsupported(node))?;
                self.expr(inner, ctx)
            }
            "list_splat" | "list_splat_pattern" => {
                let inner = named(node).into_iter().next().ok_or_else(|| unsupported(node))?;
                Ok(Node::new(NodeKind::Starred, line).with_children(vec![self.expr(inner, ctx)?, context()]))
            }
            "conditional_expression" => {
                let parts = named(node);
                let [body, test, orelse] = parts.as_slice() else {
                    return Err(unsupported(node));
                };
                Ok(Node::new(NodeKind::IfExp, line).with_children(vec![
                    self.expr(*test, NodeKind::Load)?,
                    self.expr(*body, NodeKind::Load)?,
                    self.expr(*orelse, NodeKind::Load)?,
                ]))
            }
            "lambda" => {
                let args = self.parameters(node.child_by_field_name("parameters"), line)?;
                let body = self.expr(required(node, "body")?, NodeKind::Load)?;
                Ok(Node::new(NodeKind::Lambda, line).with_children(vec![args, body]))
            }
            "named_expression" => Ok(Node::new(NodeKind::NamedExpr, line).with_children(vec![
                self.expr(required(node, "name")?, NodeKind::Store)?,
                self.expr(required(node, "value")?, NodeKind::Load)?,
            ])),
            "await" => {
                let inner = named(node).into_iter().next().ok_or_else(|| unsupported(node))?;
                Ok(Node::new(NodeKind::Await, line).with_children(vec![self.expr(inner, NodeKind::Load)?]))
            }
            "yield" => {
                let kind = if has_token(node, "from") {
                    NodeKind::YieldFrom
                } else {
                    NodeKind::Yield
                };
                Ok(Node::new(kind, line).with_children(self.exprs(&named(node), NodeKind::Load)?))
            }
            "type" | "as_pattern" | "as_pattern_target" => {
                let inner = named(node).into_iter().next().ok_or_else(|| unsupported(node))?;
                self.expr(inner, ctx)
            }
            _ => Err(unsupported(node)),
        }
    }

    /// `lower:upper:step`; absent bounds are simply omitted.
    fn slice(&self, node: TsNode<'_>) -> Result<Node> {
        let bounds = self.exprs(&named(node), NodeKind::Load)?;
        Ok(Node::new(NodeKind::Slice, line_of(node)).with_children(bounds))
    }

    fn flatten_bool(&self, node: TsNode<'_>, operator: &str, out: &mut Vec<Node>) -> Result<()> {
        // Explicit stack: long `a and b and c ...` chains nest on the left.
        let mut pending = vec![node];
        while let Some(current) = pending.pop() {
            let same_op = current.kind() == "boolean_operator"
                && current
                    .child_by_field_name("operator")
                    .is_some_and(|op| op.kind() == operator);
            if same_op {
                pending.push(required(current, "right")?);
                pending.push(required(current, "left")?);
            } else {
                out.push(self.expr(current, NodeKind::Load)?);
            }
        }
        Ok(())
    }

    /// `[elt for target in iter if cond ...]`: element(s) first, then one
    /// `comprehension` per `for` clause holding its `if` filters.
    fn comprehension(&self, node: TsNode<'_>, kind: NodeKind) -> Result<Node> {
        let line = line_of(node);
        let body = required(node, "body")?;
        let mut children = if body.kind() == "pair" {
            vec![
                self.expr(required(body, "key")?, NodeKind::Load)?,
                self.expr(required(body, "value")?, NodeKind::Load)?,
            ]
        } else {
            vec![self.expr(body, NodeKind::Load)?]
        };
        let mut clauses: Vec<Node> = Vec::new();
        for clause in named(node).into_iter().skip(1) {
            match clause.kind() {
                "for_in_clause" => {
                    let target = self.expr(required(clause, "left")?, NodeKind::Store)?;
                    let sources = fields(clause, "right");
                    let iter = match sources.as_slice() {
                        [single] => self.expr(*single, NodeKind::Load)?,
                        many => {
                            let elts = self.exprs(many, NodeKind::Load)?;
                            self.sequence(NodeKind::Tuple, line_of(clause), elts, NodeKind::Load)
                        }
                    };
                    clauses.push(
                        Node::new(NodeKind::Comprehension, line_of(clause)).with_children(vec![target, iter]),
                    );
                }
                "if_clause" => {
                    let cond = named(clause).into_iter().next().ok_or_else(|| unsupported(clause))?;
                    let cond = self.expr(cond, NodeKind::Load)?;
                    match clauses.last_mut() {
                        Some(last) => last.children.push(cond),
                        None => return Err(unsupported(clause)),
                    }
                }
                _ => return Err(unsupported(clause)),
            }
        }
        children.extend(clauses);
        Ok(Node::new(kind, line).with_children(children))
    }

    /// Classifies a string literal by its prefix.
    fn string_kind(&self, node: TsNode<'_>) -> Result<NodeKind> {
        let text = self.text(node)?;
        let prefix: String = text
            .chars()
            .take_while(|c| *c != '"' && *c != '\'')
            .collect::<String>()
            .to_ascii_lowercase();
        Ok(if prefix.contains('f') || prefix.contains('t') {
            NodeKind::JoinedStr
        } else if prefix.contains('b') {
            NodeKind::Bytes
        } else {
            NodeKind::Str
        })
    }
}
