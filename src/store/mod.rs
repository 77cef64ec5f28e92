//! Flat-file store of recorded messages
//!
//! Clips are named `recording_#_<sequence>.<ext>` with an 8-digit,
//! zero-padded sequence, so name order is recording order. The store only
//! ever grows, except that the newest clip may be deleted.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Filename prefix shared by every recorded clip
pub const CLIP_PREFIX: &str = "recording_#_";

const SEQUENCE_DIGITS: usize = 8;

/// Errors from the recordings directory
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to list recordings in {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to delete recording {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One recorded message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingClip {
    pub sequence: u32,
    pub path: PathBuf,
}

impl RecordingClip {
    /// Zero-padded sequence id as it appears in the filename
    pub fn sequence_id(&self) -> String {
        format!("{:0width$}", self.sequence, width = SEQUENCE_DIGITS)
    }
}

/// The directory of recorded messages
#[derive(Debug, Clone)]
pub struct RecordingsStore {
    dir: PathBuf,
    extension: String,
}

impl RecordingsStore {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List clips newest first
    ///
    /// A missing directory is an empty store.
    pub fn list(&self) -> Result<Vec<RecordingClip>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = ?self.dir, "recordings directory missing, treating as empty");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::List {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut clips = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::List {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(sequence) = self.parse_sequence(&path) {
                clips.push(RecordingClip { sequence, path });
            }
        }

        clips.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(clips)
    }

    /// Path for the next recording, computed from a fresh listing
    ///
    /// The sequence is the store size plus one, moved past the newest clip
    /// when clips were removed by hand, so the new clip is always the newest.
    pub fn next_clip(&self) -> Result<RecordingClip, StoreError> {
        let clips = self.list()?;
        let by_size = clips.len() as u32 + 1;
        let newest = clips.first().map_or(0, |clip| clip.sequence);
        let sequence = by_size.max(newest + 1);

        if sequence != by_size {
            warn!(by_size, newest, "gap in recording sequence, skipping past newest clip");
        }

        Ok(RecordingClip {
            sequence,
            path: self.path_for(sequence),
        })
    }

    /// Delete the newest clip from a fresh listing
    ///
    /// Returns the deleted clip, or `None` when the store is empty or the
    /// file vanished between listing and deleting.
    pub fn delete_newest(&self) -> Result<Option<RecordingClip>, StoreError> {
        let Some(newest) = self.list()?.into_iter().next() else {
            debug!("no recordings to delete");
            return Ok(None);
        };

        if self.delete(&newest.path)? {
            debug!(sequence = %newest.sequence_id(), "deleted newest recording");
            Ok(Some(newest))
        } else {
            Ok(None)
        }
    }

    /// Delete one clip file; `Ok(false)` if it was already gone
    pub fn delete(&self, path: &Path) -> Result<bool, StoreError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(?path, "recording already gone, skipping delete");
                Ok(false)
            }
            Err(source) => Err(StoreError::Delete {
                path: path.to_owned(),
                source,
            }),
        }
    }

    fn path_for(&self, sequence: u32) -> PathBuf {
        self.dir.join(format!(
            "{CLIP_PREFIX}{:0width$}.{}",
            sequence,
            self.extension,
            width = SEQUENCE_DIGITS
        ))
    }

    fn parse_sequence(&self, path: &Path) -> Option<u32> {
        let name = path.file_name()?.to_str()?;
        let digits = name
            .strip_prefix(CLIP_PREFIX)?
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?;
        if digits.len() != SEQUENCE_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}
