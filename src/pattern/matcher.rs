use crate::pattern::Pattern;
use crate::tree::SyntaxNode;
use std::collections::VecDeque;

/// A node bound to the label of the pattern it satisfied.
#[derive(Debug, Clone, Copy)]
pub struct Match<N> {
    pub label: &'static str,
    pub node: N,
    /// Direct parent of `node`, `None` for the root
    pub parent: Option<N>,
    /// Number of ancestors
    pub depth: usize,
}

/// Lazy pre-order walk yielding every pattern match in the tree.
///
/// Each node is visited once. A node satisfying several patterns yields one
/// match per pattern, in the order the patterns were given.
pub struct Matches<'p, 's, N> {
    patterns: &'p [Pattern],
    source: &'s str,
    /// Pending nodes with their depth; children are pushed in reverse.
    stack: Vec<(N, usize)>,
    /// Ancestors of the node being visited, root first.
    ancestors: Vec<N>,
    ready: VecDeque<Match<N>>,
}

impl<'p, 's, N: SyntaxNode> Matches<'p, 's, N> {
    pub fn new(root: N, patterns: &'p [Pattern], source: &'s str) -> Self {
        Self {
            patterns,
            source,
            stack: vec![(root, 0)],
            ancestors: Vec::new(),
            ready: VecDeque::new(),
        }
    }
}

impl<N: SyntaxNode> Iterator for Matches<'_, '_, N> {
    type Item = Match<N>;

    fn next(&mut self) -> Option<Match<N>> {
        loop {
            if let Some(found) = self.ready.pop_front() {
                return Some(found);
            }

            let (node, depth) = self.stack.pop()?;
            self.ancestors.truncate(depth);

            for pattern in self.patterns {
                if pattern.predicate.eval(node, &self.ancestors, self.source) {
                    self.ready.push_back(Match {
                        label: pattern.label,
                        node,
                        parent: self.ancestors.last().copied(),
                        depth,
                    });
                }
            }

            self.ancestors.push(node);
            for child in node.named_children().into_iter().rev() {
                self.stack.push((child, depth + 1));
            }
        }
    }
}

/// Run `patterns` over the tree rooted at `root`.
pub fn find_matches<'p, 's, N: SyntaxNode>(
    root: N,
    patterns: &'p [Pattern],
    source: &'s str,
) -> Matches<'p, 's, N> {
    Matches::new(root, patterns, source)
}
