//! Accumulates insertions for a run and applies them in one pass per file.
//!
//! Offsets are always those of the original snapshot. Application sorts each
//! file's insertions by descending offset, so splicing at a higher offset
//! never moves an offset that is still pending.

use crate::edit::{atomic_write, read_text, EditError, Insertion};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone, Default)]
pub struct ReplacementSet {
    files: BTreeMap<PathBuf, Vec<Insertion>>,
    /// xxh3 of the text each file's offsets were computed against
    snapshots: BTreeMap<PathBuf, u64>,
}

impl ReplacementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the text offsets for `file` are computed against.
    ///
    /// [`ReplacementSet::write_back`] refuses to touch a file whose content
    /// no longer matches.
    pub fn record_snapshot(&mut self, file: impl Into<PathBuf>, source: &str) {
        self.snapshots.insert(file.into(), xxh3_64(source.as_bytes()));
    }

    /// Add an insertion.
    ///
    /// Returns `Ok(false)` when an identical insertion is already present.
    /// A different text in the same file, offset and slot is a conflict.
    pub fn insert(&mut self, insertion: Insertion) -> Result<bool, EditError> {
        let edits = self.files.entry(insertion.file.clone()).or_default();

        if let Some(existing) = edits
            .iter()
            .find(|e| e.offset == insertion.offset && e.slot == insertion.slot)
        {
            if existing.text == insertion.text {
                return Ok(false);
            }
            return Err(EditError::Conflict {
                file: insertion.file,
                offset: insertion.offset,
                slot: insertion.slot,
                existing: existing.text.clone(),
                requested: insertion.text,
            });
        }

        tracing::trace!(
            file = %insertion.file.display(),
            offset = insertion.offset,
            slot = %insertion.slot,
            "queued insertion"
        );
        edits.push(insertion);
        Ok(true)
    }

    /// Total number of insertions across all files.
    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Files with at least one insertion.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files
            .iter()
            .filter(|(_, edits)| !edits.is_empty())
            .map(|(file, _)| file.as_path())
    }

    /// Insertions of every file in file, offset, slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Insertion> {
        self.files.values().flat_map(|edits| {
            let mut sorted: Vec<&Insertion> = edits.iter().collect();
            sorted.sort_by_key(|e| (e.offset, e.slot));
            sorted
        })
    }

    /// One line per insertion: `file:offset:+0:"text"`.
    pub fn serialize(&self) -> Vec<String> {
        self.iter().map(ToString::to_string).collect()
    }

    /// Apply this set's insertions for `file` to `original`.
    pub fn apply_to_str(&self, file: &Path, original: &str) -> Result<String, EditError> {
        let Some(edits) = self.files.get(file) else {
            return Ok(original.to_string());
        };

        for edit in edits {
            edit.validate(original)?;
        }

        let mut ordered: Vec<&Insertion> = edits.iter().collect();
        // Descending offset; at one offset the higher slot goes in first so
        // the lower slot ends up in front of it.
        ordered.sort_by(|a, b| b.offset.cmp(&a.offset).then(b.slot.cmp(&a.slot)));

        let extra: usize = ordered.iter().map(|e| e.text.len()).sum();
        let mut text = String::with_capacity(original.len() + extra);
        text.push_str(original);
        for edit in ordered {
            text.insert_str(edit.offset, &edit.text);
        }

        Ok(text)
    }

    /// Apply to in-memory originals, returning the edited text of every file
    /// that has insertions.
    pub fn apply(
        &self,
        originals: &BTreeMap<PathBuf, String>,
    ) -> Result<BTreeMap<PathBuf, String>, EditError> {
        let mut edited = BTreeMap::new();
        for file in self.files() {
            let original = originals
                .get(file)
                .ok_or_else(|| EditError::MissingSource(file.to_path_buf()))?;
            edited.insert(file.to_path_buf(), self.apply_to_str(file, original)?);
        }
        Ok(edited)
    }

    /// Apply on disk, one atomic write per file.
    ///
    /// Every file is read, checked against its snapshot and edited before the
    /// first write, so a changed file leaves all of them untouched.
    pub fn write_back(&self) -> Result<Vec<PathBuf>, EditError> {
        let mut pending = Vec::new();
        for file in self.files() {
            let original = read_text(file)?;

            if let Some(expected) = self.snapshots.get(file) {
                if xxh3_64(original.as_bytes()) != *expected {
                    return Err(EditError::SourceChanged {
                        file: file.to_path_buf(),
                    });
                }
            }

            pending.push((file, self.apply_to_str(file, &original)?));
        }

        let mut written = Vec::with_capacity(pending.len());
        for (file, edited) in pending {
            atomic_write(file, edited.as_bytes())?;
            tracing::info!(file = %file.display(), "wrote instrumented source");
            written.push(file.to_path_buf());
        }
        Ok(written)
    }
}
