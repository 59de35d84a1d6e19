use std::cmp::Reverse;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Position of an insertion among others sharing the same byte offset.
///
/// When two fragments land on one offset (`{for`, `}return`), the one with
/// the lower slot ends up first in the output text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// Unit-wide header at the start of a file.
    FileHeader,
    /// Text closing a preceding construct: loop exit timing or a wrap brace.
    /// Constructs ending together close innermost first.
    Closing(Reverse<usize>),
    /// Declarations in front of `main`.
    Declarations,
    /// Start timestamp at the top of `main`.
    Prologue,
    /// Runtime report before a return.
    Epilogue,
    /// Loop entry timestamp.
    LoopEntry,
}

impl Slot {
    /// Closing slot for a construct at nesting `depth`.
    pub fn closing(depth: usize) -> Self {
        Slot::Closing(Reverse(depth))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Slot::FileHeader => "file-header",
            Slot::Closing(_) => "closing",
            Slot::Declarations => "declarations",
            Slot::Prologue => "prologue",
            Slot::Epilogue => "epilogue",
            Slot::LoopEntry => "loop-entry",
        };
        f.write_str(name)
    }
}

/// The edit primitive: insert `text` at `offset` of `file`.
///
/// Offsets always refer to the original, unedited text. Insertions never
/// replace or delete existing bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Insertion does nothing until added to a ReplacementSet"]
pub struct Insertion {
    pub file: PathBuf,
    /// Byte offset in the original text
    pub offset: usize,
    pub slot: Slot,
    pub text: String,
}

impl Insertion {
    pub fn new(
        file: impl Into<PathBuf>,
        offset: usize,
        slot: Slot,
        text: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            offset,
            slot,
            text: text.into(),
        }
    }

    /// Replaced length; insertions never consume original bytes.
    pub fn length(&self) -> usize {
        0
    }

    /// Check the offset against the text it will be spliced into.
    pub(crate) fn validate(&self, content: &str) -> Result<(), EditError> {
        if self.offset > content.len() || !content.is_char_boundary(self.offset) {
            return Err(EditError::InvalidOffset {
                file: self.file.clone(),
                offset: self.offset,
                file_len: content.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Insertion {
    /// `file:offset:+length:"text"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:+{}:{:?}",
            self.file.display(),
            self.offset,
            self.length(),
            self.text
        )
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("conflicting insertions at {file}:{offset} ({slot})")]
    Conflict {
        file: PathBuf,
        offset: usize,
        slot: Slot,
        existing: String,
        requested: String,
    },

    #[error("invalid offset {offset} in {file} of length {file_len}")]
    InvalidOffset {
        file: PathBuf,
        offset: usize,
        file_len: usize,
    },

    #[error("{file} changed since it was scanned")]
    SourceChanged { file: PathBuf },

    #[error("no original text supplied for {0}")]
    MissingSource(PathBuf),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid edit would create malformed UTF-8")]
    InvalidUtf8,
}

/// Atomic file write: tempfile + fsync + rename, then bump the mtime so
/// build systems notice the change.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    let now = filetime::FileTime::now();
    filetime::set_file_mtime(path, now)?;

    Ok(())
}

/// Read a file as UTF-8 text.
pub(crate) fn read_text(path: &Path) -> Result<String, EditError> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes).map_err(|_| EditError::InvalidUtf8)
}
