//! Thread-local parser pooling.
//!
//! Keeps one reusable parser per dialect per thread, so instrumenting many
//! translation units does not rebuild a parser for each of them.

use crate::ts::{CParser, Dialect, TreeSitterError};
use std::cell::RefCell;

thread_local! {
    static C_PARSER: RefCell<Option<CParser>> = const { RefCell::new(None) };
    static CPP_PARSER: RefCell<Option<CParser>> = const { RefCell::new(None) };
}

/// Execute function with a pooled parser for `dialect`.
///
/// On first call per thread and dialect, creates a new parser. Subsequent
/// calls reuse the same instance.
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use tinyprof::pool::with_parser;
/// use tinyprof::ts::Dialect;
///
/// let has_errors = with_parser(Dialect::C, |parser| {
///     parser.parse_with_source("int main(void) { return 0; }").map(|p| p.has_errors())
/// })??;
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(dialect: Dialect, f: F) -> Result<R, TreeSitterError>
where
    F: FnOnce(&mut CParser) -> R,
{
    let slot = match dialect {
        Dialect::C => &C_PARSER,
        Dialect::Cpp => &CPP_PARSER,
    };

    slot.with(|cell| {
        let mut opt = cell.borrow_mut();
        if opt.is_none() {
            *opt = Some(CParser::new(dialect)?);
        }
        Ok(f(opt.as_mut().expect("parser was just initialized above")))
    })
}
