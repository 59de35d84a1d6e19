use crate::tree::{declared_name, SyntaxNode};

/// Declarative shape constraint on a node and its ancestor chain.
///
/// Predicates are evaluated against a node together with the stack of its
/// ancestors (root first, direct parent last), which the matcher maintains
/// during its walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Node has exactly this kind.
    Kind(&'static str),
    /// Node has one of these kinds.
    AnyKind(&'static [&'static str]),
    /// Node is a function definition declaring this name.
    Named(String),
    /// The direct parent satisfies the inner predicate.
    HasParent(Box<Predicate>),
    /// Some ancestor, at any depth, satisfies the inner predicate.
    HasAncestor(Box<Predicate>),
    /// Every inner predicate holds.
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn has_parent(inner: Predicate) -> Self {
        Predicate::HasParent(Box::new(inner))
    }

    pub fn has_ancestor(inner: Predicate) -> Self {
        Predicate::HasAncestor(Box::new(inner))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Predicate::Named(name.into())
    }

    /// Evaluate against `node`, whose ancestors are `ancestors` (root first).
    pub fn eval<N: SyntaxNode>(&self, node: N, ancestors: &[N], source: &str) -> bool {
        match self {
            Predicate::Kind(kind) => node.kind() == *kind,
            Predicate::AnyKind(kinds) => kinds.contains(&node.kind()),
            Predicate::Named(name) => declared_name(node, source) == Some(name.as_str()),
            Predicate::HasParent(inner) => match ancestors.split_last() {
                Some((parent, rest)) => inner.eval(*parent, rest, source),
                None => false,
            },
            Predicate::HasAncestor(inner) => (0..ancestors.len())
                .rev()
                .any(|i| inner.eval(ancestors[i], &ancestors[..i], source)),
            Predicate::And(all) => all.iter().all(|p| p.eval(node, ancestors, source)),
        }
    }
}
