//! Turns pattern matches into insertions.
//!
//! Loop timing code is emitted as soon as a loop is matched. Fragments that embed
//! the total loop count (the linkage header, the declarations in front of
//! `main`, and every runtime report) are held back until
//! [`InsertionPlanner::finish`], because in sequential mode the count is only
//! known once every unit has been walked.

use crate::codegen::Generator;
use crate::edit::{EditError, Insertion, Slot};
use crate::locs::LocationTable;
use crate::pattern::{labels, Match};
use crate::replacements::ReplacementSet;
use crate::tree::{kinds, statements, SourcePosition, SyntaxNode};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Run-scoped counter handing out sequential loop ids.
///
/// Atomic so units may be planned from several threads while ids stay
/// globally unique.
#[derive(Debug, Default)]
pub struct LoopCounter(AtomicUsize);

impl LoopCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next id.
    pub fn next_id(&self) -> usize {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Ids handed out so far.
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Where loop ids come from.
#[derive(Debug, Clone, Copy)]
pub enum IdPolicy<'a> {
    /// Id is the descriptor record claiming the loop's first line.
    Descriptor(&'a LocationTable),
    /// Every matched loop takes the next id in traversal order.
    Sequential(&'a LoopCounter),
}

impl IdPolicy<'_> {
    fn resolve(&self, position: &SourcePosition) -> Option<usize> {
        match self {
            IdPolicy::Descriptor(table) => {
                table.lookup(&position.file.to_string_lossy(), position.line)
            }
            IdPolicy::Sequential(counter) => Some(counter.next_id()),
        }
    }

    /// Size of the generated counter arrays.
    pub fn loop_count(&self) -> usize {
        match self {
            IdPolicy::Descriptor(table) => table.count(),
            IdPolicy::Sequential(counter) => counter.count(),
        }
    }
}

/// Everything the planner needs about one match. Discarded once planned.
pub struct MatchContext<'a, N> {
    pub matched: Match<N>,
    pub position: SourcePosition,
    pub source: &'a str,
    pub replacements: &'a mut ReplacementSet,
}

impl<'a, N: SyntaxNode> MatchContext<'a, N> {
    pub fn new(
        matched: Match<N>,
        file: &Path,
        source: &'a str,
        replacements: &'a mut ReplacementSet,
    ) -> Self {
        Self {
            position: SourcePosition::of(file, matched.node),
            matched,
            source,
            replacements,
        }
    }

    fn insert(&mut self, offset: usize, slot: Slot, text: String) -> Result<(), EditError> {
        let insertion = Insertion::new(self.position.file.clone(), offset, slot, text);
        self.replacements.insert(insertion).map(|_| ())
    }
}

/// Outcome of planning one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planned {
    MainFunction { position: SourcePosition },
    Loop { id: usize, position: SourcePosition },
    /// Loop with no descriptor entry; left untouched.
    SkippedLoop { position: SourcePosition },
    Return { position: SourcePosition },
    Ignored,
}

/// Count-dependent fragment waiting for [`InsertionPlanner::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Deferred {
    Header {
        file: PathBuf,
    },
    Declarations {
        file: PathBuf,
        offset: usize,
        needs_newline: bool,
    },
    Report {
        file: PathBuf,
        offset: usize,
        /// End and depth of a statement that needs a wrapping block
        wrap: Option<(usize, usize)>,
    },
}

pub struct InsertionPlanner<'a> {
    policy: IdPolicy<'a>,
    generator: &'a Generator,
    deferred: Vec<Deferred>,
}

impl<'a> InsertionPlanner<'a> {
    pub fn new(policy: IdPolicy<'a>, generator: &'a Generator) -> Self {
        Self {
            policy,
            generator,
            deferred: Vec::new(),
        }
    }

    pub fn plan<N: SyntaxNode>(
        &mut self,
        mut ctx: MatchContext<'_, N>,
    ) -> Result<Planned, EditError> {
        match ctx.matched.label {
            labels::MAIN_FUNCTION => self.plan_main(&mut ctx),
            labels::TOP_LEVEL_LOOP | labels::LOOP_IN_MAIN => self.plan_loop(&mut ctx),
            labels::RETURN_IN_MAIN => Ok(self.plan_return(&ctx)),
            _ => Ok(Planned::Ignored),
        }
    }

    fn plan_main<N: SyntaxNode>(
        &mut self,
        ctx: &mut MatchContext<'_, N>,
    ) -> Result<Planned, EditError> {
        let function = ctx.matched.node;
        let Some(body) = function.field("body") else {
            return Ok(Planned::Ignored);
        };
        let body_range = body.byte_range();
        let stmts = statements(body);

        let decl_offset = function.byte_range().start;
        self.defer(Deferred::Declarations {
            file: ctx.position.file.clone(),
            offset: decl_offset,
            needs_newline: !at_line_start(ctx.source, decl_offset),
        });

        match stmts.first() {
            Some(first) => {
                let offset = first.byte_range().start;
                ctx.insert(offset, Slot::Prologue, self.generator.main_prologue())?;
            }
            None => {
                let text = format!("\n  {}", self.generator.main_prologue());
                ctx.insert(body_range.start + 1, Slot::Prologue, text)?;
            }
        }

        // Falling off the end of main also ends the program.
        let ends_in_return = stmts
            .last()
            .is_some_and(|last| last.kind() == kinds::RETURN_STATEMENT);
        let close = body_range.end.saturating_sub(1);
        if !ends_in_return && ctx.source.as_bytes().get(close) == Some(&b'}') {
            self.defer(Deferred::Report {
                file: ctx.position.file.clone(),
                offset: close,
                wrap: None,
            });
        }

        tracing::debug!(
            file = %ctx.position.file.display(),
            line = ctx.position.line,
            "planned main"
        );
        Ok(Planned::MainFunction {
            position: ctx.position.clone(),
        })
    }

    fn plan_loop<N: SyntaxNode>(
        &mut self,
        ctx: &mut MatchContext<'_, N>,
    ) -> Result<Planned, EditError> {
        let Some(id) = self.policy.resolve(&ctx.position) else {
            tracing::debug!(
                file = %ctx.position.file.display(),
                line = ctx.position.line,
                "loop has no descriptor entry, leaving it alone"
            );
            return Ok(Planned::SkippedLoop {
                position: ctx.position.clone(),
            });
        };

        let range = ctx.matched.node.byte_range();
        let depth = ctx.matched.depth;
        let wrap = needs_block(&ctx.matched);

        let mut entry = self.generator.loop_start(id);
        let mut exit = self.generator.loop_end(id);
        if wrap {
            entry.insert_str(0, "{ ");
            exit.push_str(" }");
        }
        ctx.insert(range.start, Slot::LoopEntry, entry)?;
        ctx.insert(range.end, Slot::closing(depth), exit)?;

        self.defer(Deferred::Header {
            file: ctx.position.file.clone(),
        });

        tracing::debug!(
            file = %ctx.position.file.display(),
            line = ctx.position.line,
            id,
            "planned loop"
        );
        Ok(Planned::Loop {
            id,
            position: ctx.position.clone(),
        })
    }

    fn plan_return<N: SyntaxNode>(&mut self, ctx: &MatchContext<'_, N>) -> Planned {
        let range = ctx.matched.node.byte_range();
        let wrap = needs_block(&ctx.matched).then_some((range.end, ctx.matched.depth));

        self.defer(Deferred::Report {
            file: ctx.position.file.clone(),
            offset: range.start,
            wrap,
        });

        Planned::Return {
            position: ctx.position.clone(),
        }
    }

    fn defer(&mut self, fragment: Deferred) {
        if !self.deferred.contains(&fragment) {
            self.deferred.push(fragment);
        }
    }

    /// Emit the count-dependent fragments. Returns the loop count used.
    pub fn finish(self, replacements: &mut ReplacementSet) -> Result<usize, EditError> {
        let count = self.policy.loop_count();
        let gen = self.generator;

        for fragment in self.deferred {
            match fragment {
                Deferred::Header { file } => {
                    let text = gen.header(count);
                    replacements.insert(Insertion::new(file, 0, Slot::FileHeader, text))?;
                }
                Deferred::Declarations {
                    file,
                    offset,
                    needs_newline,
                } => {
                    let mut text = gen.main_declarations(count);
                    if needs_newline {
                        text.insert(0, '\n');
                    }
                    let insertion = Insertion::new(file, offset, Slot::Declarations, text);
                    replacements.insert(insertion)?;
                }
                Deferred::Report {
                    file,
                    offset,
                    wrap,
                } => {
                    let mut text = gen.main_epilogue(count);
                    if let Some((end, depth)) = wrap {
                        text.insert_str(0, "{ ");
                        replacements.insert(Insertion::new(
                            file.clone(),
                            end,
                            Slot::closing(depth),
                            " }",
                        ))?;
                    }
                    let insertion = Insertion::new(file, offset, Slot::Epilogue, text);
                    replacements.insert(insertion)?;
                }
            }
        }

        Ok(count)
    }
}

/// A statement that is not directly inside a block (the body of an
/// unbraced `if`, `else`, loop or label) must be wrapped before statements
/// can be added next to it.
fn needs_block<N: SyntaxNode>(matched: &Match<N>) -> bool {
    matched
        .parent
        .is_some_and(|parent| parent.kind() != kinds::COMPOUND_STATEMENT)
}

fn at_line_start(source: &str, offset: usize) -> bool {
    offset == 0 || source.as_bytes().get(offset - 1) == Some(&b'\n')
}
