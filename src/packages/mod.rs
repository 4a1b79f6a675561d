// src/packages/mod.rs

//! Package archive support for Debrepo
//!
//! This module parses control files out of .deb archives, patches them back
//! in, and models one built archive as a `VersionedArtifact`.

pub mod artifact;
pub mod deb;
pub mod manifest;

pub use artifact::VersionedArtifact;
pub use manifest::ManifestRecord;
