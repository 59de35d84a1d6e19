//! tinyprof: source-to-source timing instrumentation for C and C++
//!
//! Inserts cycle-counter reads around loops and a runtime report before
//! every exit from `main`, producing a program that prints where its time
//! went. The original text is never re-formatted: instrumentation is a set of
//! pure insertions computed against an immutable snapshot of each file.
//!
//! # Architecture
//!
//! - [`locs`] maps `(file, line)` pairs from a `locs` descriptor to loop ids.
//! - [`pattern`] finds `main`, candidate loops, and returns in `main`.
//! - [`codegen`] renders the C fragments.
//! - [`planner`] turns each match into [`Insertion`]s.
//! - [`replacements`] collects them and splices them in descending offset
//!   order.
//! - [`instrument`] wires everything together for a set of units.
//!
//! # Example
//!
//! ```no_run
//! use tinyprof::{Config, Instrumenter, SourceUnit};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let instrumenter = Instrumenter::new(config.instrument, None)?;
//! let report = instrumenter.instrument(&[SourceUnit::load("src/main.c")?])?;
//! for line in report.serialize() {
//!     println!("{line}");
//! }
//! report.write_back()?;
//! # Ok(())
//! # }
//! ```

pub mod codegen;
pub mod compdb;
pub mod config;
pub mod edit;
pub mod instrument;
pub mod locs;
pub mod pattern;
pub mod planner;
pub mod pool;
pub mod replacements;
pub mod tree;
pub mod ts;

// Re-exports
pub use codegen::Generator;
pub use compdb::{CompdbError, CompilationDatabase};
pub use config::{
    discover, load_from_path, load_from_str, Config, ConfigError, ConfigOrigin,
    InstrumentSettings, Mode, ReportStream,
};
pub use edit::{EditError, Insertion, Slot};
pub use instrument::{
    check_descriptor, scan_loops, InstrumentError, InstrumentReport, InstrumentedLoop,
    Instrumenter, SourceUnit,
};
pub use locs::{normalize_path, DescriptorError, LocationTable, LoopRecord};
pub use planner::{IdPolicy, InsertionPlanner, LoopCounter};
pub use replacements::ReplacementSet;
pub use ts::{Dialect, TreeSitterError};
