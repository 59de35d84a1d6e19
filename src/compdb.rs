//! `compile_commands.json` reader.
//!
//! Only the translation units are of interest; compiler flags are read so the
//! database deserializes, but never interpreted.

use crate::locs::normalize_path;
use crate::ts::Dialect;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DATABASE_FILE: &str = "compile_commands.json";

#[derive(Error, Debug)]
pub enum CompdbError {
    #[error("couldn't read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid compilation database {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One entry of the database.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CompileCommand {
    /// Working directory of the compile
    pub directory: PathBuf,
    /// Main translation unit, absolute or relative to `directory`
    pub file: PathBuf,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl CompileCommand {
    /// Translation unit resolved against `directory`, with `.` and `..`
    /// folded away.
    pub fn source_path(&self) -> PathBuf {
        normalize_path(&self.directory.join(&self.file))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationDatabase {
    commands: Vec<CompileCommand>,
}

impl CompilationDatabase {
    /// Load `compile_commands.json` from a build directory.
    pub fn load(build_dir: impl AsRef<Path>) -> Result<Self, CompdbError> {
        let path = build_dir.as_ref().join(DATABASE_FILE);
        let text = fs::read_to_string(&path).map_err(|source| CompdbError::Io {
            path: path.clone(),
            source,
        })?;
        let db = Self::parse(&text).map_err(|source| CompdbError::Json {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(
            database = %path.display(),
            entries = db.commands.len(),
            "loaded compilation database"
        );
        Ok(db)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let commands: Vec<CompileCommand> = serde_json::from_str(text)?;
        Ok(Self { commands })
    }

    /// C and C++ translation units, sorted and without duplicates.
    ///
    /// Units below `base` are given relative to it, so they read the same
    /// as paths typed on the command line and as descriptor entries.
    pub fn source_files(&self, base: &Path) -> Vec<PathBuf> {
        let base = normalize_path(base);
        self.commands
            .iter()
            .map(CompileCommand::source_path)
            .filter(|path| Dialect::is_source_file(path))
            .map(|path| match path.strip_prefix(&base) {
                Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
                _ => path,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
