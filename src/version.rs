// src/version.rs

//! Package version parsing and comparison
//!
//! Versions are dotted numeric releases with optional epoch, pre-release,
//! post-release, development and local segments:
//!
//! ```text
//! [v][N!]N(.N)*[{a|b|rc}N][.postN][.devN][+local]
//! ```
//!
//! Trailing zeros in the release are insignificant (`1.0 == 1.0.0`), and a
//! Debian-style revision (`1.2-3`) is read as a post-release.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Pre-release phase, ordered alpha < beta < release candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Rc => "rc",
        }
    }
}

/// A parsed, comparable package version
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreRelease, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<String>,
}

const PRE_LABELS: [(&str, PreRelease); 8] = [
    ("alpha", PreRelease::Alpha),
    ("beta", PreRelease::Beta),
    ("preview", PreRelease::Rc),
    ("pre", PreRelease::Rc),
    ("rc", PreRelease::Rc),
    ("a", PreRelease::Alpha),
    ("b", PreRelease::Beta),
    ("c", PreRelease::Rc),
];

const POST_LABELS: [&str; 3] = ["post", "rev", "r"];

/// Byte cursor over the lowercased version text
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn eat_byte(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_separator(&mut self) -> bool {
        match self.peek() {
            Some(b'.' | b'-' | b'_') => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn eat_str(&mut self, literal: &str) -> bool {
        if self.bytes[self.pos..].starts_with(literal.as_bytes()) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn eat_number(&mut self) -> Option<u64> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }
}

impl Version {
    /// Parse a version string
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidVersion(input.to_string());

        let normalized = input.trim().to_ascii_lowercase();
        let body = normalized.strip_prefix('v').unwrap_or(&normalized);

        let (main, local) = match body.split_once('+') {
            Some((main, local)) => (main, Some(Self::parse_local(local).ok_or_else(invalid)?)),
            None => (body, None),
        };

        let mut cursor = Cursor::new(main);

        // Epoch: "N!" prefix
        let start = cursor.pos;
        let epoch = match cursor.eat_number() {
            Some(n) if cursor.eat_byte(b'!') => n,
            _ => {
                cursor.pos = start;
                0
            }
        };

        let mut release = vec![cursor.eat_number().ok_or_else(invalid)?];
        while cursor.peek() == Some(b'.') && matches!(cursor.peek_at(1), Some(b'0'..=b'9')) {
            cursor.pos += 1;
            release.push(cursor.eat_number().ok_or_else(invalid)?);
        }

        let pre = Self::parse_pre(&mut cursor);
        let post = Self::parse_post(&mut cursor);
        let dev = Self::parse_dev(&mut cursor);

        if !cursor.at_end() {
            return Err(invalid());
        }

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    fn parse_pre(cursor: &mut Cursor<'_>) -> Option<(PreRelease, u64)> {
        let start = cursor.pos;
        cursor.eat_separator();
        for (label, phase) in PRE_LABELS {
            if cursor.eat_str(label) {
                cursor.eat_separator();
                return Some((phase, cursor.eat_number().unwrap_or(0)));
            }
        }
        cursor.pos = start;
        None
    }

    fn parse_post(cursor: &mut Cursor<'_>) -> Option<u64> {
        let start = cursor.pos;

        // Implicit post-release: "1.0-3"
        if cursor.peek() == Some(b'-') && matches!(cursor.peek_at(1), Some(b'0'..=b'9')) {
            cursor.pos += 1;
            return cursor.eat_number();
        }

        cursor.eat_separator();
        for label in POST_LABELS {
            if cursor.eat_str(label) {
                cursor.eat_separator();
                return Some(cursor.eat_number().unwrap_or(0));
            }
        }
        cursor.pos = start;
        None
    }

    fn parse_dev(cursor: &mut Cursor<'_>) -> Option<u64> {
        let start = cursor.pos;
        cursor.eat_separator();
        if cursor.eat_str("dev") {
            cursor.eat_separator();
            return Some(cursor.eat_number().unwrap_or(0));
        }
        cursor.pos = start;
        None
    }

    fn parse_local(local: &str) -> Option<String> {
        let valid = !local.is_empty()
            && local
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'));
        valid.then(|| local.replace(['-', '_'], "."))
    }

    fn release_trimmed(&self) -> &[u64] {
        let mut end = self.release.len();
        while end > 0 && self.release[end - 1] == 0 {
            end -= 1;
        }
        &self.release[..end]
    }

    // Dev-only releases sort before pre-releases, finals after them
    fn pre_key(&self) -> (u8, Option<PreRelease>, u64) {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => (0, None, 0),
            (Some((phase, n)), _, _) => (1, Some(phase), n),
            _ => (2, None, 0),
        }
    }

    fn dev_key(&self) -> (u8, u64) {
        match self.dev {
            Some(n) => (0, n),
            None => (1, 0),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.release_trimmed().cmp(other.release_trimmed()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }

        let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
        f.write_str(&release.join("."))?;

        if let Some((phase, n)) = self.pre {
            write!(f, "{}{}", phase.as_str(), n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        if let Some(local) = &self.local {
            write!(f, "+{}", local)?;
        }
        Ok(())
    }
}
