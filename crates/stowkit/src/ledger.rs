//! Persistent idempotence markers.
//!
//! One file per completed step under the ledger directory. Existence of the
//! file is completion; its contents are the RFC 3339 completion time.

use crate::error::Result;
use crate::fingerprint::{StepId, sanitize};
use chrono::{DateTime, FixedOffset, Local};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One completion marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Step id (marker file name)
    pub step_id: StepId,
    /// Recorded completion time, if the marker is readable
    pub completed_at: Option<DateTime<FixedOffset>>,
}

/// Marker-file store keyed by [`StepId`].
#[derive(Debug, Clone)]
pub struct RunLedger {
    dir: PathBuf,
}

impl RunLedger {
    /// Open a ledger rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Ledger directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker(&self, step_id: &StepId) -> PathBuf {
        self.dir.join(step_id.as_str())
    }

    /// Whether `step_id` has been marked complete.
    pub fn is_complete(&self, step_id: &StepId) -> bool {
        self.marker(step_id).is_file()
    }

    /// Record `step_id` as complete now.
    pub fn mark_complete(&self, step_id: &StepId) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.marker(step_id), Local::now().to_rfc3339())?;
        log::debug!("Marked {} complete", step_id);
        Ok(())
    }

    /// Forget `step_id`. Returns whether a marker existed.
    pub fn reset(&self, step_id: &StepId) -> Result<bool> {
        match fs::remove_file(self.marker(step_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Forget every step. Returns how many markers were removed.
    pub fn reset_all(&self) -> Result<usize> {
        self.remove_where(|_| true)
    }

    /// Forget every step of one package, whatever its host or fingerprints.
    pub fn reset_matching(&self, package: &str) -> Result<usize> {
        let package = sanitize(package);
        self.remove_where(|id| id.package() == Some(package.as_str()))
    }

    /// All markers, sorted by step id.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for step_id in self.marker_ids()? {
            let completed_at = fs::read_to_string(self.marker(&step_id))
                .ok()
                .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok());
            entries.push(LedgerEntry {
                step_id,
                completed_at,
            });
        }
        Ok(entries)
    }

    fn marker_ids(&self) -> Result<Vec<StepId>> {
        let read = match fs::read_dir(&self.dir) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in read {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(StepId::from_raw(name));
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn remove_where(&self, predicate: impl Fn(&StepId) -> bool) -> Result<usize> {
        let mut removed = 0;
        for id in self.marker_ids()? {
            if predicate(&id) && self.reset(&id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
