//! Loop location table loaded from a `locs` descriptor.
//!
//! Each descriptor line names one loop: a file path followed by one or more
//! line numbers, all whitespace separated. The loop's id is the 0-based
//! position of its line in the descriptor, so ids never depend on which loops
//! the matcher happens to find.
//!
//! ```text
//! src/sieve.cpp 22
//! src/sieve.cpp 27 31
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Default descriptor name, looked up in the working directory.
pub const DEFAULT_DESCRIPTOR: &str = "locs";

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("couldn't read loop descriptor {path}: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("descriptor line {line} has no file name")]
    MalformedLine { line: usize },

    #[error("descriptor line {line}: '{token}' is not a line number")]
    InvalidLineNumber { line: usize, token: String },
}

/// One descriptor entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopRecord {
    pub file: String,
    pub lines: BTreeSet<usize>,
    pub id: usize,
}

impl LoopRecord {
    fn claims(&self, file: &str, line: usize) -> bool {
        self.lines.contains(&line) && same_file(&self.file, file)
    }
}

/// Immutable `(file, line) -> loop id` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationTable {
    records: Vec<LoopRecord>,
}

impl LocationTable {
    /// Load the descriptor at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DescriptorError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| DescriptorError::Missing {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&text)?;
        tracing::debug!(
            descriptor = %path.display(),
            loops = table.count(),
            "loaded loop descriptor"
        );
        Ok(table)
    }

    /// Parse descriptor text.
    ///
    /// Whitespace-only lines are rejected unless they trail the last record,
    /// since skipping them would shift every following id.
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let lines: Vec<&str> = text.lines().collect();
        let used = lines
            .iter()
            .rposition(|line| !line.trim().is_empty())
            .map_or(0, |last| last + 1);

        let mut records = Vec::with_capacity(used);
        for (index, line) in lines[..used].iter().enumerate() {
            let line_no = index + 1;
            let mut tokens = line.split_whitespace();
            let file = tokens
                .next()
                .ok_or(DescriptorError::MalformedLine { line: line_no })?;

            let lines = tokens
                .map(|token| {
                    token
                        .parse::<usize>()
                        .map_err(|_| DescriptorError::InvalidLineNumber {
                            line: line_no,
                            token: token.to_string(),
                        })
                })
                .collect::<Result<BTreeSet<_>, _>>()?;

            records.push(LoopRecord {
                file: file.to_string(),
                lines,
                id: index,
            });
        }

        Ok(Self { records })
    }

    /// Id of the first record listing `line` for `file`.
    pub fn lookup(&self, file: &str, line: usize) -> Option<usize> {
        self.records
            .iter()
            .find(|record| record.claims(file, line))
            .map(|record| record.id)
    }

    /// Number of records, which sizes the generated counter arrays.
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &LoopRecord> {
        self.records.iter()
    }
}

/// Compare file names after lexical normalization.
fn same_file(a: &str, b: &str) -> bool {
    a == b || normalize_path(Path::new(a)) == normalize_path(Path::new(b))
}

/// Drop `.` components and fold `dir/..` pairs without touching the
/// filesystem. Leading `..` of a relative path are kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_record_lookup() {
        let table = LocationTable::parse("a.c 10\n").unwrap();
        assert_eq!(table.lookup("a.c", 10), Some(0));
        assert_eq!(table.lookup("a.c", 11), None);
        assert_eq!(table.lookup("b.c", 10), None);
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn ids_follow_descriptor_order() {
        let table = LocationTable::parse("a.c 3\nb.c 7 9\na.c 12\n").unwrap();
        assert_eq!(table.lookup("a.c", 3), Some(0));
        assert_eq!(table.lookup("b.c", 7), Some(1));
        assert_eq!(table.lookup("b.c", 9), Some(1));
        assert_eq!(table.lookup("a.c", 12), Some(2));
        assert_eq!(table.count(), 3);
    }

    #[test]
    fn duplicate_claim_resolves_to_first_record() {
        let table = LocationTable::parse("a.c 5\na.c 5 6\n").unwrap();
        assert_eq!(table.lookup("a.c", 5), Some(0));
        assert_eq!(table.lookup("a.c", 6), Some(1));
    }

    #[test]
    fn record_without_lines_consumes_an_id() {
        let table = LocationTable::parse("a.c\na.c 4\n").unwrap();
        assert_eq!(table.count(), 2);
        assert_eq!(table.lookup("a.c", 4), Some(1));
    }

    #[test]
    fn dot_components_are_ignored() {
        let table = LocationTable::parse("./src/a.c 4\n").unwrap();
        assert_eq!(table.lookup("src/a.c", 4), Some(0));
        assert_eq!(table.lookup("src/./a.c", 4), Some(0));
    }

    #[test]
    fn parent_components_are_folded() {
        let table = LocationTable::parse("src/sieve.c 4\n/work/lib/x.c 9\n").unwrap();
        assert_eq!(table.lookup("build/../src/sieve.c", 4), Some(0));
        assert_eq!(table.lookup("/work/build/../lib/./x.c", 9), Some(1));
        assert_eq!(table.lookup("../src/sieve.c", 4), None);
    }

    #[test]
    fn normalize_keeps_leading_parents() {
        assert_eq!(normalize_path(Path::new("../a/./b/../c.c")), PathBuf::from("../a/c.c"));
        assert_eq!(normalize_path(Path::new("/../x.c")), PathBuf::from("/x.c"));
        assert_eq!(normalize_path(Path::new("./a.c")), PathBuf::from("a.c"));
    }

    #[test]
    fn blank_line_inside_descriptor_is_malformed() {
        let err = LocationTable::parse("a.c 1\n   \nb.c 2\n").unwrap_err();
        assert!(matches!(err, DescriptorError::MalformedLine { line: 2 }));
    }

    #[test]
    fn trailing_blank_lines_are_ignored() {
        let table = LocationTable::parse("a.c 1\n\n  \n").unwrap();
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn non_numeric_line_is_rejected() {
        let err = LocationTable::parse("a.c 1 x2\n").unwrap_err();
        match err {
            DescriptorError::InvalidLineNumber { line, token } => {
                assert_eq!(line, 1);
                assert_eq!(token, "x2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_descriptor_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocationTable::load(dir.path().join("locs")).unwrap_err();
        assert!(matches!(err, DescriptorError::Missing { .. }));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locs");
        fs::write(&path, "main.c 2\nmain.c 5\n").unwrap();
        let table = LocationTable::load(&path).unwrap();
        assert_eq!(table.count(), 2);
        assert_eq!(table.records().map(|r| r.id).collect::<Vec<_>>(), vec![0, 1]);
    }
}
