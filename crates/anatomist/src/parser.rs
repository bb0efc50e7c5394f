//! Tree-sitter front end: source bytes -> lowered [`Node`] tree.
//!
//! A tree containing any `ERROR` or `MISSING` node is rejected with the line
//! of the first offending node. The linter never sees partial trees.
//!
//! Lowering recurses once per nesting level, bounded by
//! [`MAX_NESTING`](crate::lower::MAX_NESTING), and runs on a worker thread
//! whose stack fits that bound regardless of the caller's stack size.

use std::fs::File;
use std::path::Path;
use std::thread;

use memmap2::MmapOptions;
use tree_sitter::{Parser, Tree};

use crate::lower::Lowerer;
use crate::{AnatomistError, Node};
use common::NodeKind;

/// Stack reserved for the lowering thread.
const LOWERING_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Owns the tree-sitter parser with the Python grammar loaded.
///
/// # Example
/// ```no_run
/// use anatomist::ParserHost;
/// use std::path::Path;
///
/// let mut host = ParserHost::new().unwrap();
/// let module = host.parse_file(Path::new("currency.py")).unwrap();
/// println!("{} nodes", module.size());
/// ```
pub struct ParserHost {
    parser: Parser,
}

impl ParserHost {
    /// Creates a new parser host with the Python grammar loaded.
    ///
    /// # Errors
    /// Returns `AnatomistError::ParseFailure` if the grammar cannot be loaded.
    pub fn new() -> Result<Self, AnatomistError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| {
                AnatomistError::ParseFailure(format!("Failed to load Python grammar: {}", e))
            })?;
        Ok(Self { parser })
    }

    /// Parses and lowers a source buffer.
    ///
    /// # Errors
    /// - `Syntax`: the buffer contains a syntax error or an unsupported construct
    /// - `ParseFailure`: tree-sitter returned no tree
    pub fn parse_bytes(&mut self, source: &[u8]) -> Result<Node, AnatomistError> {
        if source.len() > u32::MAX as usize {
            return Err(AnatomistError::ByteRangeOverflow);
        }
        let tree = self.parse_tree(source)?;
        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(1);
            return Err(AnatomistError::Syntax {
                line,
                message: "invalid syntax".to_string(),
            });
        }
        let module = lower(&tree, source)?;
        tracing::debug!(nodes = module.size(), "lowered module");
        Ok(module)
    }

    pub fn parse_str(&mut self, source: &str) -> Result<Node, AnatomistError> {
        self.parse_bytes(source.as_bytes())
    }

    /// Parses a contract file using memory-mapped I/O.
    ///
    /// # Errors
    /// - `IoError`: file not found, permission denied, mmap failure
    /// - `ByteRangeOverflow`: file larger than 4GB (tree-sitter u32 limit)
    /// - everything [`ParserHost::parse_bytes`] returns
    pub fn parse_file(&mut self, path: &Path) -> Result<Node, AnatomistError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        if file_len > u32::MAX as u64 {
            return Err(AnatomistError::ByteRangeOverflow);
        }
        if file_len == 0 {
            return Ok(Node::new(NodeKind::Module, 1));
        }

        // SAFETY: The file handle is held for the duration of the mmap lifetime.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        self.parse_bytes(&mmap[..])
    }

    fn parse_tree(&mut self, source: &[u8]) -> Result<Tree, AnatomistError> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| AnatomistError::ParseFailure("Parse returned None".to_string()))
    }
}

fn lower(tree: &Tree, source: &[u8]) -> Result<Node, AnatomistError> {
    thread::scope(|scope| {
        let worker = thread::Builder::new()
            .name("anatomist-lower".to_string())
            .stack_size(LOWERING_STACK_BYTES)
            .spawn_scoped(scope, || Lowerer::new(source).module(tree.root_node()))?;
        worker
            .join()
            .map_err(|_| AnatomistError::ParseFailure("Lowering thread panicked".to_string()))?
    })
}

/// 1-based line of the first `ERROR`/`MISSING` node in document order.
fn first_error_line(root: tree_sitter::Node<'_>) -> Option<u32> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row as u32 + 1);
        }
        // Only subtrees that contain an error are entered.
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(source: &str) -> Node {
        ParserHost::new().unwrap().parse_str(source).unwrap()
    }

    fn kinds(node: &Node) -> Vec<NodeKind> {
        let mut out = vec![node.kind];
        for child in node.decorators.iter().chain(node.children.iter()) {
            out.extend(kinds(child));
        }
        out
    }

    #[test]
    fn test_simple_function() {
        let module = parse("def hello():\n    pass\n");
        assert_eq!(module.kind, NodeKind::Module);
        assert_eq!(module.children.len(), 1);

        let func = &module.children[0];
        assert_eq!(func.kind, NodeKind::FunctionDef);
        assert_eq!(func.ident(), Some("hello"));
        assert_eq!(func.line, 1);
        assert_eq!(func.children[0].kind, NodeKind::Arguments);
        assert_eq!(func.children[1].kind, NodeKind::Pass);
        assert_eq!(func.children[1].line, 2);
    }

    #[test]
    fn test_async_function_and_class() {
        let module = parse("async def fetch():\n    pass\nclass Foo(Base):\n    pass\n");
        assert_eq!(module.children[0].kind, NodeKind::AsyncFunctionDef);
        assert_eq!(module.children[1].kind, NodeKind::ClassDef);
        assert_eq!(module.children[1].ident(), Some("Foo"));
    }

    #[test]
    fn test_decorated_function() {
        let module = parse("@export\ndef a():\n    pass\n");
        let func = &module.children[0];
        assert_eq!(func.kind, NodeKind::FunctionDef);
        assert_eq!(func.decorators.len(), 1);
        assert_eq!(func.decorators[0].dotted_name().as_deref(), Some("export"));
        assert_eq!(module.functions().count(), 1);
    }

    #[test]
    fn test_assignment_shapes() {
        let module = parse("a = b = 1\nx, y = 1, 2\nv += 1\nw: int = 3\n");
        let (targets, value) = module.children[0].assign_parts().unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(value.kind, NodeKind::Num);
        assert_eq!(targets[0].children[0].kind, NodeKind::Store);

        let (targets, value) = module.children[1].assign_parts().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].kind, NodeKind::Tuple);
        assert_eq!(value.kind, NodeKind::Tuple);

        assert_eq!(module.children[2].kind, NodeKind::AugAssign);
        assert_eq!(module.children[2].children[1].kind, NodeKind::Add);
        assert_eq!(module.children[3].kind, NodeKind::AnnAssign);
    }

    #[test]
    fn test_expression_lowering() {
        let module = parse("x = not a and b and c\ny = a < b <= c\nz = -q ** 2\n");
        let all = kinds(&module);
        assert!(all.contains(&NodeKind::BoolOp));
        assert!(all.contains(&NodeKind::Not));
        assert!(all.contains(&NodeKind::UnaryOp));
        assert!(all.contains(&NodeKind::Lt));
        assert!(all.contains(&NodeKind::LtE));
        assert!(all.contains(&NodeKind::USub));
        assert!(all.contains(&NodeKind::Pow));

        // `and` chains flatten: op + three operands
        let (_, boolop) = module.children[0].assign_parts().unwrap();
        assert_eq!(boolop.children.len(), 4);

        // Compare: left, ops, comparators
        let (_, compare) = module.children[1].assign_parts().unwrap();
        assert_eq!(compare.children[1].kind, NodeKind::Lt);
        assert_eq!(compare.children[2].kind, NodeKind::LtE);
    }

    #[test]
    fn test_call_orders_keywords_last() {
        let module = parse("Hash(default_value=0, contract='x')\nf(a, k=1, *rest)\n");
        let call = &module.children[0].children[0];
        assert_eq!(call.kind, NodeKind::Call);
        assert_eq!(call.children[0].dotted_name().as_deref(), Some("Hash"));
        assert_eq!(call.children[1].kind, NodeKind::Keyword);
        assert_eq!(call.children[2].ident(), Some("contract"));

        let call = &module.children[1].children[0];
        let order: Vec<_> = call.children.iter().map(|c| c.kind).collect();
        assert_eq!(
            order,
            vec![NodeKind::Name, NodeKind::Name, NodeKind::Starred, NodeKind::Keyword]
        );
    }

    #[test]
    fn test_imports() {
        let module = parse("import currency\nimport a.b as _c\nfrom x import y\n");
        let import = &module.children[0];
        assert_eq!(import.kind, NodeKind::Import);
        assert_eq!(import.children[0].kind, NodeKind::Alias);
        assert_eq!(import.children[0].ident(), Some("currency"));

        let aliased = &module.children[1].children[0];
        assert_eq!(aliased.ident(), Some("a.b"));
        assert_eq!(aliased.children[0].kind, NodeKind::Name);
        assert_eq!(aliased.children[0].ident(), Some("_c"));

        assert_eq!(module.children[2].kind, NodeKind::ImportFrom);
        assert_eq!(module.children[2].ident(), Some("x"));
    }

    #[test]
    fn test_control_flow() {
        let source = "\
if a:
    pass
elif b:
    pass
else:
    pass
for i in range(3):
    continue
while x:
    break
try:
    pass
except Exception:
    pass
with open(f) as g:
    pass
";
        let module = parse(source);
        let all = kinds(&module);
        for kind in [
            NodeKind::If,
            NodeKind::For,
            NodeKind::While,
            NodeKind::Try,
            NodeKind::ExceptHandler,
            NodeKind::With,
            NodeKind::WithItem,
            NodeKind::Continue,
            NodeKind::Break,
        ] {
            assert!(all.contains(&kind), "missing {:?}", kind);
        }
        // elif nests as an If in the else position
        let outer = &module.children[0];
        assert_eq!(outer.children.last().unwrap().kind, NodeKind::If);
    }

    #[test]
    fn test_comprehensions_and_literals() {
        let module = parse("a = [i for i in x if i]\nb = {k: v for k, v in d}\nc = f'{a}'\nd = b'x'\ne = None\n");
        let all = kinds(&module);
        assert!(all.contains(&NodeKind::ListComp));
        assert!(all.contains(&NodeKind::DictComp));
        assert!(all.contains(&NodeKind::Comprehension));
        assert!(all.contains(&NodeKind::JoinedStr));
        assert!(all.contains(&NodeKind::Bytes));
        assert!(all.contains(&NodeKind::NameConstant));
    }

    #[test]
    fn test_attribute_and_subscript() {
        let module = parse("x = a.__dict__\ny = h['k']\nz = h[1:2]\n");
        let (_, attr) = module.children[0].assign_parts().unwrap();
        assert_eq!(attr.kind, NodeKind::Attribute);
        assert_eq!(attr.ident(), Some("__dict__"));

        let (_, sub) = module.children[1].assign_parts().unwrap();
        assert_eq!(sub.kind, NodeKind::Subscript);
        assert_eq!(sub.children[1].kind, NodeKind::Index);

        let (_, sub) = module.children[2].assign_parts().unwrap();
        assert_eq!(sub.children[1].kind, NodeKind::Slice);
    }

    #[test]
    fn test_comments_are_ignored() {
        let module = parse("# header\nx = 1  # trailing\n");
        assert_eq!(module.children.len(), 1);
        assert_eq!(module.children[0].line, 2);
    }

    #[test]
    fn test_empty_source() {
        let module = parse("");
        assert_eq!(module.kind, NodeKind::Module);
        assert!(module.children.is_empty());
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let mut host = ParserHost::new().unwrap();
        let err = host.parse_str("x = 1\ndef broken(:\n    pass\n").unwrap_err();
        match err {
            AnatomistError::Syntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    fn syntax_line(source: &str) -> u32 {
        match ParserHost::new().unwrap().parse_str(source) {
            Err(AnatomistError::Syntax { line, .. }) => line,
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let brackets = format!("x = {}1{}\n", "[".repeat(1000), "]".repeat(1000));
        assert_eq!(syntax_line(&brackets), 1);

        let parens = format!("y = 0\nx = {}1{}\n", "(".repeat(1000), ")".repeat(1000));
        assert_eq!(syntax_line(&parens), 2);

        let unary = format!("x = {}1\n", "-".repeat(1000));
        assert_eq!(syntax_line(&unary), 1);

        let mut elifs = String::from("if a:\n    pass\n");
        for _ in 0..500 {
            elifs.push_str("elif a:\n    pass\n");
        }
        assert!(matches!(
            ParserHost::new().unwrap().parse_str(&elifs),
            Err(AnatomistError::Syntax { .. })
        ));
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let source = format!(
            "@export\ndef f():\n    return {}1{}\n",
            "[".repeat(50),
            "]".repeat(50)
        );
        let module = parse(&source);
        assert_eq!(kinds(&module).iter().filter(|k| **k == NodeKind::List).count(), 50);

        // long boolean chains flatten instead of nesting
        let chain = format!("x = {}\n", vec!["a"; 2000].join(" and "));
        let module = parse(&chain);
        let bool_op = &module.children[0].children[1];
        assert_eq!(bool_op.kind, NodeKind::BoolOp);
        assert_eq!(bool_op.children.len(), 2001);
    }

    #[test]
    fn test_print_statement_form_is_rejected() {
        assert_eq!(syntax_line("def f():\n    print 'hi'\n"), 2);
        assert_eq!(syntax_line("print 'a', 'b'\n"), 1);

        let module = parse("print('hi')\n");
        let call = &module.children[0].children[0];
        assert_eq!(call.kind, NodeKind::Call);
        assert_eq!(call.children[0].ident(), Some("print"));
    }

    #[test]
    fn test_parse_file_mmap() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"@export\ndef transfer(amount):\n    return amount\n")
            .unwrap();
        let mut host = ParserHost::new().unwrap();
        let module = host.parse_file(file.path()).unwrap();
        assert_eq!(module.functions().count(), 1);

        let empty = tempfile::NamedTempFile::new().unwrap();
        let module = host.parse_file(empty.path()).unwrap();
        assert!(module.children.is_empty());
    }
}
