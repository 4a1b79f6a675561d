// src/lib.rs

//! Debrepo APT Repository Builder
//!
//! Builds a browsable, installable APT-style repository from a folder of
//! `.deb` archives plus per-package metadata.
//!
//! # Architecture
//!
//! - Manifests: control files parsed into ordered records, patched, re-emitted
//! - Artifacts: one patched `.deb` per build, hashed and sized for the index
//! - Groups: all builds of one package, newest first, with a changelog ledger
//! - Index: `Packages`, its xz/bz2 variants and a `Release` summary

pub mod config;
mod error;
pub mod hash;
pub mod operator;
pub mod packages;
pub mod repository;
pub mod version;

#[cfg(test)]
mod test_support;

pub use config::RepoConfig;
pub use error::{Error, Result};
pub use repository::changelog::OrderingFault;
pub use version::Version;
