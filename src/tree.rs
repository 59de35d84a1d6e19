//! Read-only view of a syntax tree.
//!
//! The matcher and the planner never talk to tree-sitter directly; they walk
//! any tree whose nodes implement [`SyntaxNode`]. tree-sitter's `Node` is the
//! implementation used by the binary.

use std::ops::Range;
use std::path::{Path, PathBuf};

/// Node kinds of the C and C++ grammars that instrumentation cares about.
pub mod kinds {
    pub const FUNCTION_DEFINITION: &str = "function_definition";
    pub const COMPOUND_STATEMENT: &str = "compound_statement";
    pub const FOR_STATEMENT: &str = "for_statement";
    pub const WHILE_STATEMENT: &str = "while_statement";
    pub const DO_STATEMENT: &str = "do_statement";
    pub const RETURN_STATEMENT: &str = "return_statement";
    pub const COMMENT: &str = "comment";

    /// Counted, pre-test and post-test loops.
    pub const LOOPS: &[&str] = &[FOR_STATEMENT, WHILE_STATEMENT, DO_STATEMENT];
}

pub trait SyntaxNode: Copy {
    /// Grammar kind of the node, e.g. `for_statement`.
    fn kind(&self) -> &'static str;

    /// Named children in source order.
    fn named_children(&self) -> Vec<Self>;

    /// Child stored under a grammar field, e.g. `body` or `declarator`.
    fn field(&self, name: &str) -> Option<Self>;

    /// Byte range covered by the node; `end` is one past the last byte.
    fn byte_range(&self) -> Range<usize>;

    /// 1-based line of the node's first byte.
    fn start_line(&self) -> usize;

    fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.byte_range()]
    }
}

impl<'tree> SyntaxNode for tree_sitter::Node<'tree> {
    fn kind(&self) -> &'static str {
        tree_sitter::Node::kind(self)
    }

    fn named_children(&self) -> Vec<Self> {
        let mut cursor = self.walk();
        let children: Vec<_> = tree_sitter::Node::named_children(self, &mut cursor).collect();
        children
    }

    fn field(&self, name: &str) -> Option<Self> {
        self.child_by_field_name(name)
    }

    fn byte_range(&self) -> Range<usize> {
        tree_sitter::Node::byte_range(self)
    }

    fn start_line(&self) -> usize {
        self.start_position().row + 1
    }
}

/// Resolved location of a node: file, 1-based line, and byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourcePosition {
    pub file: PathBuf,
    pub line: usize,
    pub offset: usize,
}

impl SourcePosition {
    pub fn of<N: SyntaxNode>(file: &Path, node: N) -> Self {
        Self {
            file: file.to_path_buf(),
            line: node.start_line(),
            offset: node.byte_range().start,
        }
    }
}

/// Name declared by a function definition.
///
/// Follows the `declarator` chain (pointer, parenthesized and function
/// declarators) down to the identifier. Qualified names such as `Foo::main`
/// yield `None`.
pub fn declared_name<N: SyntaxNode>(function: N, source: &str) -> Option<&str> {
    let mut declarator = function.field("declarator")?;
    loop {
        if matches!(declarator.kind(), "identifier" | "field_identifier") {
            return Some(declarator.text(source));
        }
        declarator = declarator
            .field("declarator")
            .or_else(|| declarator.named_children().into_iter().next())?;
    }
}

/// Statements of a block, skipping comments.
pub fn statements<N: SyntaxNode>(block: N) -> Vec<N> {
    block
        .named_children()
        .into_iter()
        .filter(|child| child.kind() != kinds::COMMENT)
        .collect()
}
