//! Drives matching, planning and application over a set of source units.

use crate::codegen::Generator;
use crate::compdb::CompdbError;
use crate::config::{ConfigError, InstrumentSettings, Mode};
use crate::edit::EditError;
use crate::locs::{normalize_path, DescriptorError, LocationTable, LoopRecord};
use crate::pattern::{find_matches, labels, PatternSet};
use crate::planner::{IdPolicy, InsertionPlanner, LoopCounter, MatchContext, Planned};
use crate::pool::with_parser;
use crate::replacements::ReplacementSet;
use crate::tree::SourcePosition;
use crate::ts::validator::validate_instrumented;
use crate::ts::{Dialect, TreeSitterError};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    TreeSitter(#[from] TreeSitterError),

    #[error(transparent)]
    Compdb(#[from] CompdbError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("couldn't read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One translation unit: its path as reported in edits, and its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub source: String,
    pub dialect: Dialect,
}

impl SourceUnit {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            dialect: Dialect::from_path(&path),
            path,
            source: source.into(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, InstrumentError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| InstrumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(path, source))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentedLoop {
    pub id: usize,
    pub position: SourcePosition,
}

/// Result of one instrumentation run.
#[derive(Debug, Clone)]
pub struct InstrumentReport {
    pub replacements: ReplacementSet,
    /// Size of the generated counter arrays
    pub loop_count: usize,
    pub instrumented_loops: Vec<InstrumentedLoop>,
    /// Matched loops the descriptor doesn't list
    pub skipped_loops: Vec<SourcePosition>,
    /// Edited text of every file with at least one insertion
    pub outputs: BTreeMap<PathBuf, String>,
}

impl InstrumentReport {
    /// Serialized insertions, one per line.
    pub fn serialize(&self) -> Vec<String> {
        self.replacements.serialize()
    }

    /// Write every edited file back in place.
    pub fn write_back(&self) -> Result<Vec<PathBuf>, EditError> {
        self.replacements.write_back()
    }
}

pub struct Instrumenter {
    settings: InstrumentSettings,
    table: Option<LocationTable>,
    generator: Generator,
}

impl Instrumenter {
    /// Create an instrumenter.
    ///
    /// In descriptor mode without an explicit `table`, the descriptor named in
    /// `settings` is loaded now; failing to read it aborts before any unit is
    /// touched.
    pub fn new(
        settings: InstrumentSettings,
        table: Option<LocationTable>,
    ) -> Result<Self, InstrumentError> {
        let table = match (settings.mode, table) {
            (Mode::Descriptor, None) => Some(LocationTable::load(&settings.descriptor)?),
            (_, table) => table,
        };
        let generator = Generator::new(settings.tick.clone(), settings.report_stream);
        tracing::debug!(mode = %settings.mode, tick = %settings.tick, "instrumenter ready");

        Ok(Self {
            settings,
            table,
            generator,
        })
    }

    pub fn instrument(&self, units: &[SourceUnit]) -> Result<InstrumentReport, InstrumentError> {
        let counter = LoopCounter::new();
        let empty = LocationTable::default();
        let policy = match self.settings.mode {
            Mode::Descriptor => IdPolicy::Descriptor(self.table.as_ref().unwrap_or(&empty)),
            Mode::Sequential => IdPolicy::Sequential(&counter),
        };
        let patterns = PatternSet::for_mode(self.settings.mode);

        let mut replacements = ReplacementSet::new();
        let mut planner = InsertionPlanner::new(policy, &self.generator);
        let mut instrumented_loops = Vec::new();
        let mut skipped_loops = Vec::new();
        let mut main_found = false;
        let units = distinct_units(units);

        for unit in &units {
            let tree = with_parser(unit.dialect, |parser| parser.parse(&unit.source))??;
            if tree.root_node().has_error() {
                tracing::warn!(
                    file = %unit.path.display(),
                    "source has syntax errors, instrumenting what parsed"
                );
            }
            replacements.record_snapshot(&unit.path, &unit.source);

            for matched in find_matches(tree.root_node(), patterns.patterns(), &unit.source) {
                let ctx = MatchContext::new(matched, &unit.path, &unit.source, &mut replacements);
                match planner.plan(ctx)? {
                    Planned::MainFunction { .. } => main_found = true,
                    Planned::Loop { id, position } => {
                        instrumented_loops.push(InstrumentedLoop { id, position })
                    }
                    Planned::SkippedLoop { position } => skipped_loops.push(position),
                    Planned::Return { .. } | Planned::Ignored => {}
                }
            }

            tracing::info!(file = %unit.path.display(), "scanned unit");
        }

        if !main_found {
            tracing::warn!("no main function found, no runtime report will be printed");
        }

        let loop_count = planner.finish(&mut replacements)?;

        let originals: BTreeMap<PathBuf, String> = units
            .iter()
            .map(|unit| (unit.path.clone(), unit.source.clone()))
            .collect();
        let outputs = replacements.apply(&originals)?;

        if self.settings.validate {
            for unit in &units {
                if let Some(edited) = outputs.get(&unit.path) {
                    if let Err(err) = validate_instrumented(&unit.source, edited, unit.dialect) {
                        tracing::warn!(
                            file = %unit.path.display(),
                            error = %err,
                            "instrumented source does not parse cleanly"
                        );
                    }
                }
            }
        }

        tracing::info!(
            insertions = replacements.len(),
            loops = instrumented_loops.len(),
            skipped = skipped_loops.len(),
            loop_count,
            "instrumentation planned"
        );

        Ok(InstrumentReport {
            replacements,
            loop_count,
            instrumented_loops,
            skipped_loops,
            outputs,
        })
    }
}

/// `units` with later mentions of an already seen file dropped.
fn distinct_units(units: &[SourceUnit]) -> Vec<&SourceUnit> {
    let mut seen = BTreeSet::new();
    units
        .iter()
        .filter(|unit| {
            let fresh = seen.insert(normalize_path(&unit.path));
            if !fresh {
                tracing::warn!(file = %unit.path.display(), "file given twice, skipping");
            }
            fresh
        })
        .collect()
}

/// Every loop directly in a function body, in traversal order.
pub fn scan_loops(units: &[SourceUnit]) -> Result<Vec<SourcePosition>, InstrumentError> {
    let patterns = PatternSet::top_level();
    let mut loops = Vec::new();

    for unit in distinct_units(units) {
        let tree = with_parser(unit.dialect, |parser| parser.parse(&unit.source))??;
        loops.extend(
            find_matches(tree.root_node(), patterns.patterns(), &unit.source)
                .filter(|m| m.label == labels::TOP_LEVEL_LOOP)
                .map(|m| SourcePosition::of(&unit.path, m.node)),
        );
    }

    Ok(loops)
}

/// Descriptor records that no top-level loop in `units` resolves to.
pub fn check_descriptor(
    table: &LocationTable,
    units: &[SourceUnit],
) -> Result<Vec<LoopRecord>, InstrumentError> {
    let claimed: BTreeSet<usize> = scan_loops(units)?
        .iter()
        .filter_map(|pos| table.lookup(&pos.file.to_string_lossy(), pos.line))
        .collect();

    Ok(table
        .records()
        .filter(|record| !claimed.contains(&record.id))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(mode: Mode) -> InstrumentSettings {
        InstrumentSettings {
            mode,
            ..InstrumentSettings::default()
        }
    }

    const P6: &str = "int main() {\n  for (int i = 0; i < 10; ++i) { }\n  return 0;\n}\n";

    #[test]
    fn single_loop_program() {
        let table = LocationTable::parse("main.c 2\n").unwrap();
        let inst = Instrumenter::new(settings(Mode::Descriptor), Some(table)).unwrap();
        let report = inst.instrument(&[SourceUnit::new("main.c", P6)]).unwrap();

        assert_eq!(report.loop_count, 1);
        assert_eq!(report.instrumented_loops.len(), 1);
        assert!(report.skipped_loops.is_empty());

        let out = &report.outputs[Path::new("main.c")];
        let decls = out.find("uint64_t start, total;").unwrap();
        let main = out.find("int main()").unwrap();
        let prologue = out.find("start = tp_rdtsc();").unwrap();
        let entry = out.find("loop_start[0] = tp_rdtsc();\n  for").unwrap();
        let exit = out
            .find("{ }\n  loop_total[0] += tp_rdtsc() - loop_start[0];")
            .unwrap();
        let report_at = out.find("Total runtime").unwrap();
        let ret = out.find("return 0;").unwrap();

        assert!(decls < main);
        assert!(main < prologue);
        assert!(prologue < entry);
        assert!(entry < exit);
        assert!(exit < report_at);
        assert!(report_at < ret);
    }

    #[test]
    fn loops_outside_main_get_the_linkage_header() {
        let main = "int work(void);\nint main(void) {\n  while (work()) { }\n  return 0;\n}\n";
        let lib = "int work(void) {\n  int n = 0;\n  for (;;) { if (++n > 3) break; }\n  return n;\n}\n";
        let table = LocationTable::parse("main.c 3\nlib.c 3\n").unwrap();
        let inst = Instrumenter::new(settings(Mode::Descriptor), Some(table)).unwrap();
        let report = inst
            .instrument(&[SourceUnit::new("main.c", main), SourceUnit::new("lib.c", lib)])
            .unwrap();

        let lib_out = &report.outputs[Path::new("lib.c")];
        assert!(lib_out.starts_with("#include <stdio.h>"));
        assert!(lib_out.contains("extern uint64_t loop_total[2];"));
        assert!(lib_out.contains("loop_start[1] = tp_rdtsc();\n  for"));
        assert!(!lib_out.contains("Total runtime"));

        let main_out = &report.outputs[Path::new("main.c")];
        assert!(main_out.contains("uint64_t loop_total[2];"));
        assert!(main_out.contains("Total runtime"));
    }

    #[test]
    fn sequential_mode_needs_no_descriptor() {
        let source = "int main(void) {\n  while (0) { for (;;) break; }\n  return 0;\n}\n";
        let mut config = settings(Mode::Sequential);
        config.descriptor = PathBuf::from("/nonexistent/locs");
        let inst = Instrumenter::new(config, None).unwrap();
        let report = inst.instrument(&[SourceUnit::new("seq.c", source)]).unwrap();

        assert_eq!(report.loop_count, 2);
        let ids: Vec<usize> = report.instrumented_loops.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!(report.outputs[Path::new("seq.c")].contains("uint64_t loop_start[2];"));
    }

    #[test]
    fn a_file_named_twice_is_instrumented_once() {
        let inst = Instrumenter::new(settings(Mode::Sequential), None).unwrap();
        let report = inst
            .instrument(&[SourceUnit::new("a.c", P6), SourceUnit::new("./a.c", P6)])
            .unwrap();

        assert_eq!(report.loop_count, 1);
        assert_eq!(report.outputs.len(), 1);
        let out = &report.outputs[Path::new("a.c")];
        assert_eq!(out.matches("loop_start[0] = tp_rdtsc();").count(), 1);

        let loops = scan_loops(&[SourceUnit::new("a.c", P6), SourceUnit::new("b/../a.c", P6)])
            .unwrap();
        assert_eq!(loops.len(), 1);
    }

    #[test]
    fn missing_descriptor_is_fatal() {
        let mut config = settings(Mode::Descriptor);
        config.descriptor = PathBuf::from("/nonexistent/locs");
        let err = Instrumenter::new(config, None).err().unwrap();
        assert!(matches!(
            err,
            InstrumentError::Descriptor(DescriptorError::Missing { .. })
        ));
    }

    #[test]
    fn unlisted_loops_are_reported_as_skipped() {
        let table = LocationTable::parse("other.c 9\n").unwrap();
        let inst = Instrumenter::new(settings(Mode::Descriptor), Some(table)).unwrap();
        let report = inst.instrument(&[SourceUnit::new("main.c", P6)]).unwrap();

        assert!(report.instrumented_loops.is_empty());
        assert_eq!(report.skipped_loops.len(), 1);
        assert_eq!(report.skipped_loops[0].line, 2);
        assert_eq!(report.loop_count, 1);
    }

    #[test]
    fn serialized_trail_lists_every_insertion() {
        let table = LocationTable::parse("main.c 2\n").unwrap();
        let inst = Instrumenter::new(settings(Mode::Descriptor), Some(table)).unwrap();
        let report = inst.instrument(&[SourceUnit::new("main.c", P6)]).unwrap();

        let lines = report.serialize();
        assert_eq!(lines.len(), report.replacements.len());
        assert!(lines.iter().all(|line| line.starts_with("main.c:")));
        assert!(lines.iter().any(|line| line.contains("loop_start[0] = tp_rdtsc();")));
    }

    #[test]
    fn scan_lists_top_level_loops_only() {
        let source = "int main(void) {\n  for (;;) {\n    while (1) break;\n    break;\n  }\n  do { } while (0);\n}\n";
        let loops = scan_loops(&[SourceUnit::new("s.c", source)]).unwrap();
        let lines: Vec<usize> = loops.iter().map(|pos| pos.line).collect();
        assert_eq!(lines, vec![2, 6]);
    }

    #[test]
    fn check_finds_stale_records() {
        let table = LocationTable::parse("main.c 2\nmain.c 40\n").unwrap();
        let stale = check_descriptor(&table, &[SourceUnit::new("main.c", P6)]).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, 1);
    }
}
