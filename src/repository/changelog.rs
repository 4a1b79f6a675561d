// src/repository/changelog.rs

//! Per-package changelog history
//!
//! Persisted as a JSON array, oldest entry first:
//!
//! ```json
//! [{"version": "1.0", "changes": "Initial release"}, {"version": "1.1", "changes": "Fixes"}]
//! ```
//!
//! In memory the ledger is kept newest-first.

use crate::error::Result;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// One released version and its notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub version: String,
    pub changes: String,
}

/// Stored changelog order disagrees with version order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Changelog {path} isn't ordered properly: mismatched version at position {position}: \
     {provided} (provided) / {expected} (sorted)"
)]
pub struct OrderingFault {
    pub path: String,
    pub position: usize,
    pub provided: String,
    pub expected: String,
}

#[derive(Debug, Clone)]
struct Recorded {
    version: Version,
    entry: ChangelogEntry,
}

/// Append-only, newest-first changelog history
#[derive(Debug, Clone)]
pub struct ChangelogLedger {
    path: PathBuf,
    entries: Vec<Recorded>,
}

impl ChangelogLedger {
    /// Load the history stored at `path`
    ///
    /// A missing or unreadable file yields an empty ledger. Call
    /// [`validate_order`](Self::validate_order) afterwards to check the
    /// stored order.
    pub fn load(path: &Path) -> Self {
        let mut entries = Self::read_entries(path);
        entries.reverse();

        debug!("Loaded {} changelog entries from {}", entries.len(), path.display());
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    fn read_entries(path: &Path) -> Vec<Recorded> {
        if !path.is_file() {
            debug!("No changelog at {}", path.display());
            return Vec::new();
        }

        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<Vec<ChangelogEntry>>(&content).map_err(|e| e.to_string())
            });

        let raw = match parsed {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Ignoring unreadable changelog {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        let mut entries = Vec::with_capacity(raw.len());
        for entry in raw {
            match Version::parse(&entry.version) {
                Ok(version) => entries.push(Recorded { version, entry }),
                Err(e) => {
                    warn!("Ignoring changelog {}: {}", path.display(), e);
                    return Vec::new();
                }
            }
        }
        entries
    }

    /// Check the entries are in descending version order
    ///
    /// Reports the first position where the stored order differs from the
    /// sorted order. Nothing is reordered.
    pub fn validate_order(&self) -> std::result::Result<(), OrderingFault> {
        let mut sorted: Vec<&Recorded> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.version.cmp(&a.version));

        for (position, (stored, expected)) in self.entries.iter().zip(sorted).enumerate() {
            if stored.version != expected.version {
                return Err(OrderingFault {
                    path: self.path.display().to_string(),
                    position,
                    provided: stored.entry.version.clone(),
                    expected: expected.entry.version.clone(),
                });
            }
        }
        Ok(())
    }

    /// Version of the newest entry
    pub fn latest_recorded_version(&self) -> Option<&Version> {
        self.entries.first().map(|r| &r.version)
    }

    /// Record a new newest entry and write the ledger back immediately
    pub fn append(&mut self, version: &Version, notes: &str) -> Result<()> {
        self.entries.insert(
            0,
            Recorded {
                version: version.clone(),
                entry: ChangelogEntry {
                    version: version.to_string(),
                    changes: notes.to_string(),
                },
            },
        );

        if let Err(e) = self.persist() {
            self.entries.remove(0);
            return Err(e);
        }

        info!("Recorded changelog for version {} in {}", version, self.path.display());
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let oldest_first: Vec<&ChangelogEntry> =
            self.entries.iter().rev().map(|r| &r.entry).collect();
        let json = serde_json::to_string_pretty(&oldest_first)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to a temporary file first so readers never see a partial ledger
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Entries, newest first
    pub fn entries(&self) -> impl Iterator<Item = &ChangelogEntry> {
        self.entries.iter().map(|r| &r.entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
