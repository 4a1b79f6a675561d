// src/operator.rs

//! Answers the build needs from whoever runs it
//!
//! The build never reads a terminal. When it needs a decision (continue
//! despite an out-of-order changelog?) or text (notes for a new version), it
//! asks an `Operator`. The binary supplies an interactive one; unattended
//! runs use [`Unattended`].

use crate::repository::changelog::OrderingFault;
use crate::version::Version;
use tracing::warn;

/// Source of answers for decisions a build cannot make alone
pub trait Operator {
    /// Whether to keep going with a changelog whose stored order is wrong
    fn accept_ordering_fault(&mut self, group: &str, fault: &OrderingFault) -> bool;

    /// Notes for a version that has no changelog entry yet
    ///
    /// `None` leaves the changelog untouched for this run.
    fn changelog_notes(&mut self, group: &str, version: &Version) -> Option<String>;
}

/// Non-interactive operator
///
/// Ordering faults are always fatal. Changelog notes come from a fixed
/// answer when one is configured.
#[derive(Debug, Clone, Default)]
pub struct Unattended {
    notes: Option<String>,
}

impl Unattended {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every changelog request with `notes`
    pub fn with_notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
        }
    }
}

impl Operator for Unattended {
    fn accept_ordering_fault(&mut self, group: &str, fault: &OrderingFault) -> bool {
        warn!("Refusing out-of-order changelog for {} in unattended mode: {}", group, fault);
        false
    }

    fn changelog_notes(&mut self, group: &str, version: &Version) -> Option<String> {
        if self.notes.is_none() {
            warn!(
                "Changelog entry required for {} version {}, but no notes were supplied",
                group, version
            );
        }
        self.notes.clone()
    }
}
