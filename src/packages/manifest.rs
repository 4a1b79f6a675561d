// src/packages/manifest.rs

//! Ordered control-file records
//!
//! A `ManifestRecord` keeps the `Key: Value` fields of a package's control
//! file in insertion order, so a record re-emitted into an archive or the
//! Packages index reads the same way the maintainer wrote it.

use crate::error::{Error, Result};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Fields every package must carry
pub const ESSENTIAL_FIELDS: [&str; 4] = ["Package", "Name", "Architecture", "Version"];

/// Rewrite applied to a record for one metadata key
pub type FieldTransform = fn(&mut ManifestRecord, &Value);

/// How a group metadata key lands in the control file
#[derive(Debug, Clone, Copy)]
pub enum MetaTransform {
    /// Set the named control field to the metadata value
    ReplaceField(&'static str),
    /// Arbitrary rewrite of the record
    CustomTransform(FieldTransform),
}

impl MetaTransform {
    /// Look up the transform registered for a metadata key
    pub fn for_key(key: &str) -> Option<Self> {
        match key {
            "homepage" => Some(Self::ReplaceField("Homepage")),
            "depends_min" => Some(Self::CustomTransform(prepend_firmware_dependency)),
            "pre_depends" => Some(Self::CustomTransform(set_pre_depends)),
            "featured" => Some(Self::CustomTransform(ignore_meta)),
            _ => None,
        }
    }

    fn apply(self, record: &mut ManifestRecord, value: &Value) {
        match self {
            Self::ReplaceField(field) => record.set(field, meta_value_text(value)),
            Self::CustomTransform(transform) => transform(record, value),
        }
    }
}

fn prepend_firmware_dependency(record: &mut ManifestRecord, value: &Value) {
    let firmware = format!("firmware (>= {})", meta_value_text(value));
    let depends = match record.get("Depends") {
        Some(existing) if !existing.trim().is_empty() => format!("{}, {}", firmware, existing),
        _ => firmware,
    };
    record.set("Depends", depends);
}

fn set_pre_depends(record: &mut ManifestRecord, value: &Value) {
    record.set("Pre-Depends", meta_value_text(value));
}

fn ignore_meta(_record: &mut ManifestRecord, _value: &Value) {}

/// Render a JSON metadata value as control-field text
fn meta_value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(meta_value_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Ordered key/value model of a package control file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    fields: Vec<(String, String)>,
}

impl ManifestRecord {
    /// Build a record from parsed fields
    ///
    /// Fails when an essential field is absent. On success the depiction and
    /// icon links derived from the package identifier and `base_url` are set.
    pub fn construct(fields: Vec<(String, String)>, base_url: &str) -> Result<Self> {
        let mut record = Self { fields };

        for field in ESSENTIAL_FIELDS {
            if record.get(field).is_none() {
                return Err(Error::MissingEssentialField {
                    field: field.to_string(),
                });
            }
        }

        record.inject_derived_fields(base_url);
        Ok(record)
    }

    /// Parse control-file text and construct a record from it
    pub fn parse(text: &str, base_url: &str) -> Result<Self> {
        Self::construct(Self::parse_fields(text), base_url)
    }

    /// Split control-file text into ordered fields
    ///
    /// Lines are split on the first `": "`; a line ending in `:` is a field
    /// with an empty value. Lines starting with whitespace
    /// continue the previous field. Anything else is logged and skipped.
    pub fn parse_fields(text: &str) -> Vec<(String, String)> {
        let mut record = Self { fields: Vec::new() };

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }

            // Multi-line fields continue with a leading space
            if line.starts_with(' ') || line.starts_with('\t') {
                match record.fields.last_mut() {
                    Some((_, value)) => {
                        value.push('\n');
                        value.push_str(line.trim_end());
                    }
                    None => warn!("Continuation line without a field: {}", line),
                }
                continue;
            }

            // A field with an empty value is written as "Key: " and trims to "Key:"
            let trimmed = line.trim();
            let field = trimmed
                .split_once(": ")
                .or_else(|| trimmed.strip_suffix(':').map(|key| (key, "")));

            match field {
                Some((key, value)) if !key.trim().is_empty() => {
                    record.set(key.trim(), value.trim());
                }
                _ => warn!("Skipping malformed control line: {}", line),
            }
        }

        record.fields
    }

    fn inject_derived_fields(&mut self, base_url: &str) {
        let base_url = base_url.trim_end_matches('/');
        let package = self.package().to_string();

        self.set("Depiction", format!("{}/depiction/web/{}.html", base_url, package));
        self.set(
            "SileoDepiction",
            format!("{}/depiction/native/{}.json", base_url, package),
        );
        self.set(
            "ModernDepiction",
            format!("{}/depiction/native/{}.json", base_url, package),
        );
        self.set("Icon", format!("{}/assets/{}/icon.png", base_url, package));
    }

    /// Value of a field, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or overwrite a field; new keys go to the end
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    /// Apply group metadata through the transform table
    ///
    /// Unknown keys are logged and skipped.
    pub fn merge(&mut self, extra: &Map<String, Value>) {
        for (key, value) in extra {
            let Some(transform) = MetaTransform::for_key(key) else {
                warn!(
                    "Invalid property in the package meta for {}: {} (set to {})",
                    self.package(),
                    key,
                    value
                );
                continue;
            };

            if value.is_null() {
                debug!("Ignoring empty meta property {} for {}", key, self.package());
                continue;
            }

            transform.apply(self, value);
        }
    }

    /// Render as control-file text
    ///
    /// `transient` fields (size, checksums, filename) are appended after the
    /// persistent ones without being stored.
    pub fn to_text(&self, transient: &[(&str, String)]) -> String {
        let mut text = String::new();
        for (key, value) in &self.fields {
            text.push_str(&format!("{}: {}\n", key, value));
        }
        for (key, value) in transient {
            text.push_str(&format!("{}: {}\n", key, value));
        }
        text
    }

    /// All fields in order
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn package(&self) -> &str {
        self.get("Package").unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.get("Name").unwrap_or_default()
    }

    pub fn version(&self) -> &str {
        self.get("Version").unwrap_or_default()
    }
}

impl Serialize for ManifestRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.fields.iter().map(|(k, v)| (k, v)))
    }
}
