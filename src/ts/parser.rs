use crate::ts::errors::TreeSitterError;
use ast_grep_language::{LanguageExt, SupportLang};
use std::path::Path;
use tree_sitter::{Parser, Tree};

/// Source dialect, selecting which tree-sitter grammar parses a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    C,
    #[default]
    Cpp,
}

impl Dialect {
    /// Pick the dialect from a file extension.
    ///
    /// `.c` and `.h` files are parsed as C, everything else as C++.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("c") | Some("h") => Dialect::C,
            _ => Dialect::Cpp,
        }
    }

    /// Whether a path looks like a C or C++ translation unit.
    pub fn is_source_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("c" | "cc" | "cpp" | "cxx" | "c++" | "C")
        )
    }

    fn language(self) -> SupportLang {
        match self {
            Dialect::C => SupportLang::C,
            Dialect::Cpp => SupportLang::Cpp,
        }
    }
}

/// Tree-sitter parser wrapper for C/C++ source code.
pub struct CParser {
    parser: Parser,
    dialect: Dialect,
}

impl CParser {
    /// Create a parser for the given dialect.
    pub fn new(dialect: Dialect) -> Result<Self, TreeSitterError> {
        let mut parser = Parser::new();
        // Get the tree-sitter Language from ast-grep-language
        let ts_lang = dialect.language().get_ts_language();
        parser
            .set_language(&ts_lang)
            .map_err(|_| TreeSitterError::LanguageSet)?;

        Ok(Self { parser, dialect })
    }

    /// Get the configured dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Parse source code into a tree-sitter Tree.
    pub fn parse(&mut self, source: &str) -> Result<Tree, TreeSitterError> {
        self.parser
            .parse(source, None)
            .ok_or(TreeSitterError::ParseFailed)
    }

    /// Parse source code and return the tree along with the source.
    pub fn parse_with_source<'a>(
        &mut self,
        source: &'a str,
    ) -> Result<ParsedSource<'a>, TreeSitterError> {
        let tree = self.parse(source)?;
        Ok(ParsedSource { source, tree })
    }
}

/// A parsed source file with its tree-sitter tree.
pub struct ParsedSource<'a> {
    pub source: &'a str,
    pub tree: Tree,
}

impl ParsedSource<'_> {
    /// Get the root node of the tree.
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    /// Check if the tree contains any ERROR or MISSING nodes.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Number of ERROR and MISSING nodes in the tree.
    pub fn error_count(&self) -> usize {
        count_error_nodes(self.tree.root_node())
    }
}

fn count_error_nodes(node: tree_sitter::Node<'_>) -> usize {
    if !node.has_error() {
        return 0;
    }
    let own = usize::from(node.is_error() || node.is_missing());
    let mut cursor = node.walk();
    let children: usize = node
        .children(&mut cursor)
        .map(count_error_nodes)
        .sum();
    own + children
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_c() {
        let mut parser = CParser::new(Dialect::C).unwrap();
        let source = "int main(void) { return 0; }";
        let parsed = parser.parse_with_source(source).unwrap();

        assert!(!parsed.has_errors());
        assert_eq!(parsed.root_node().kind(), "translation_unit");
    }

    #[test]
    fn parse_valid_cpp() {
        let mut parser = CParser::new(Dialect::Cpp).unwrap();
        let source = "#include <iostream>\nint main() { std::cout << 1; return 0; }";
        let parsed = parser.parse_with_source(source).unwrap();

        assert!(!parsed.has_errors());
        assert_eq!(parser.dialect(), Dialect::Cpp);
    }

    #[test]
    fn parse_invalid_c() {
        let mut parser = CParser::new(Dialect::C).unwrap();
        let source = "int main( { return 0; }";
        let parsed = parser.parse_with_source(source).unwrap();

        assert!(parsed.has_errors());
        assert!(parsed.error_count() > 0);
    }

    #[test]
    fn dialect_from_extension() {
        assert_eq!(Dialect::from_path(Path::new("a.c")), Dialect::C);
        assert_eq!(Dialect::from_path(Path::new("inc/a.h")), Dialect::C);
        assert_eq!(Dialect::from_path(Path::new("a.cpp")), Dialect::Cpp);
        assert_eq!(Dialect::from_path(Path::new("a.cc")), Dialect::Cpp);
        assert!(Dialect::is_source_file(Path::new("x/sieve.cpp")));
        assert!(!Dialect::is_source_file(Path::new("x/sieve.h")));
    }
}
