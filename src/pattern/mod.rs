//! Structural pattern matching over C/C++ syntax trees.
//!
//! Patterns are small predicate trees over node kinds and ancestor chains,
//! evaluated during a single pre-order walk. The set of patterns is fixed to
//! the shapes instrumentation needs: the `main` function, loops, and returns
//! reachable from `main`.

pub mod matcher;
pub mod predicate;

pub use matcher::{find_matches, Match, Matches};
pub use predicate::Predicate;

use crate::config::Mode;
use crate::tree::kinds;

/// Labels bound to matched nodes.
pub mod labels {
    pub const MAIN_FUNCTION: &str = "main-function";
    pub const TOP_LEVEL_LOOP: &str = "top-level-loop";
    pub const LOOP_IN_MAIN: &str = "loop-in-main";
    pub const RETURN_IN_MAIN: &str = "return-in-main";
}

/// A labelled predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub label: &'static str,
    pub predicate: Predicate,
}

/// `int main(...) { ... }`
pub fn main_function() -> Pattern {
    Pattern {
        label: labels::MAIN_FUNCTION,
        predicate: main_definition(),
    }
}

/// A loop whose parent is the body block of a function definition.
pub fn top_level_loop() -> Pattern {
    Pattern {
        label: labels::TOP_LEVEL_LOOP,
        predicate: Predicate::And(vec![
            Predicate::AnyKind(kinds::LOOPS),
            Predicate::has_parent(Predicate::And(vec![
                Predicate::Kind(kinds::COMPOUND_STATEMENT),
                Predicate::has_parent(Predicate::Kind(kinds::FUNCTION_DEFINITION)),
            ])),
        ]),
    }
}

/// Any loop at any depth inside `main`.
pub fn loop_in_main() -> Pattern {
    Pattern {
        label: labels::LOOP_IN_MAIN,
        predicate: Predicate::And(vec![
            Predicate::AnyKind(kinds::LOOPS),
            Predicate::has_ancestor(main_definition()),
        ]),
    }
}

/// A return statement at any depth inside `main`.
pub fn return_in_main() -> Pattern {
    Pattern {
        label: labels::RETURN_IN_MAIN,
        predicate: Predicate::And(vec![
            Predicate::Kind(kinds::RETURN_STATEMENT),
            Predicate::has_ancestor(main_definition()),
        ]),
    }
}

fn main_definition() -> Predicate {
    Predicate::And(vec![
        Predicate::Kind(kinds::FUNCTION_DEFINITION),
        Predicate::named("main"),
    ])
}

/// Patterns run together in one walk.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// `main`, top-level loops of every function, returns in `main`.
    pub fn top_level() -> Self {
        Self {
            patterns: vec![main_function(), top_level_loop(), return_in_main()],
        }
    }

    /// `main`, every loop inside `main`, returns in `main`.
    pub fn anywhere_in_main() -> Self {
        Self {
            patterns: vec![main_function(), loop_in_main(), return_in_main()],
        }
    }

    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Descriptor => Self::top_level(),
            Mode::Sequential => Self::anywhere_in_main(),
        }
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }
}
