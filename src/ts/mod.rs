//! Tree-sitter integration for C and C++ sources.
//!
//! This module owns the concrete tree provider: it turns source text into a
//! tree-sitter CST without losing comments or formatting, so byte offsets of
//! nodes line up with the original file.

pub mod errors;
pub mod parser;
pub mod validator;

pub use errors::TreeSitterError;
pub use parser::{CParser, Dialect, ParsedSource};
pub use validator::{count_syntax_errors, validate_instrumented};
