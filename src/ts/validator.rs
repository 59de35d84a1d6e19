use crate::pool::with_parser;
use crate::ts::errors::TreeSitterError;
use crate::ts::parser::Dialect;

/// Count ERROR and MISSING nodes in a source text.
pub fn count_syntax_errors(source: &str, dialect: Dialect) -> Result<usize, TreeSitterError> {
    with_parser(dialect, |parser| {
        parser
            .parse_with_source(source)
            .map(|parsed| parsed.error_count())
    })?
}

/// Validate that instrumentation did not introduce syntax errors.
///
/// Offsets shift once text is inserted, so the original and edited sources
/// are compared by their number of ERROR nodes rather than by position.
pub fn validate_instrumented(
    original: &str,
    edited: &str,
    dialect: Dialect,
) -> Result<(), TreeSitterError> {
    let before = count_syntax_errors(original, dialect)?;
    let after = count_syntax_errors(edited, dialect)?;

    match after.saturating_sub(before) {
        0 => Ok(()),
        n => Err(TreeSitterError::IntroducedSyntaxErrors { count: n }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_error_nodes() {
        let clean = "#include <stdio.h>\nint main(void) {\n    printf(\"hello\\n\");\n    return 0;\n}\n";
        assert_eq!(count_syntax_errors(clean, Dialect::C).unwrap(), 0);
        assert!(count_syntax_errors("int main( { return 0; }", Dialect::C).unwrap() > 0);
    }

    #[test]
    fn instrumented_statement_keeps_syntax_valid() {
        let original = "int main(void) { for (;;) {} return 0; }";
        let edited = "int main(void) { x = 1; for (;;) {} x = 2; return 0; }";
        assert!(validate_instrumented(original, edited, Dialect::C).is_ok());
    }

    #[test]
    fn instrumented_breakage_is_reported() {
        let original = "int main(void) { return 0; }";
        let edited = "int main(void) { x = ; return 0; }";
        assert!(matches!(
            validate_instrumented(original, edited, Dialect::C),
            Err(TreeSitterError::IntroducedSyntaxErrors { .. })
        ));
    }

    #[test]
    fn already_broken_source_is_not_blamed() {
        let original = "int main( { return 0; }";
        assert!(validate_instrumented(original, original, Dialect::C).is_ok());
    }
}
