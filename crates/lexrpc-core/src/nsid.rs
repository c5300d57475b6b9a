//! Namespaced identifiers (NSIDs).
//!
//! An NSID is one or more segments joined by `.`, each matching
//! `[A-Za-z0-9-]+`, eg `com.atproto.repo.getRecord`. Definitions other than
//! `main` inside a lexicon are addressed with a `#name` fragment, eg
//! `io.example.kitchenSink#subobject`.

use crate::error::{LexError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").expect("NSID segment regex must compile"));

static NSID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9-]+(\.[a-zA-Z0-9-]+)*$").expect("NSID regex must compile")
});

/// Whether `s` is a single valid NSID segment.
pub fn is_valid_segment(s: &str) -> bool {
    SEGMENT_RE.is_match(s)
}

/// Whether `s` is a valid NSID, without a fragment.
pub fn is_valid_nsid(s: &str) -> bool {
    NSID_RE.is_match(s)
}

/// A validated NSID, optionally with a `#fragment`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nsid(String);

impl Nsid {
    /// Parse and validate an NSID.
    pub fn parse(s: &str) -> Result<Self> {
        let (base, fragment) = match s.split_once('#') {
            Some((base, fragment)) => (base, Some(fragment)),
            None => (s, None),
        };

        if !is_valid_nsid(base) || fragment.is_some_and(|f| !is_valid_segment(f)) {
            return Err(LexError::InvalidNsid(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }

    /// Fully-qualified id of a definition inside the lexicon `self`.
    pub fn with_def(&self, name: &str) -> Result<Self> {
        if name == "main" {
            Ok(Self(self.base().to_string()))
        } else {
            Self::parse(&format!("{}#{}", self.base(), name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The NSID without any fragment.
    pub fn base(&self) -> &str {
        self.0.split_once('#').map_or(&self.0, |(base, _)| base)
    }

    /// The fragment after `#`, if any.
    pub fn fragment(&self) -> Option<&str> {
        self.0.split_once('#').map(|(_, fragment)| fragment)
    }

    /// The last dot-separated segment of the base, eg `getRecord`.
    pub fn name(&self) -> &str {
        self.base().rsplit('.').next().unwrap_or_default()
    }
}

impl fmt::Display for Nsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Nsid {
    type Err = LexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Nsid {
    type Error = LexError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Nsid> for String {
    fn from(nsid: Nsid) -> Self {
        nsid.0
    }
}

impl AsRef<str> for Nsid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
