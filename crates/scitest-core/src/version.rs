//! Version tokens of reference and test records.
//!
//! `v1.2.3[-pre][+build]` is a strict semantic version, `dYYYY-MM-DD` a
//! calendar date. Ordering is only defined between versions of the same kind.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

fn semver_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
        )
        .unwrap_or_else(|err| unreachable!("semver pattern is valid: {err}"))
    })
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}$")
            .unwrap_or_else(|err| unreachable!("date pattern is valid: {err}"))
    })
}

// ---------------------------------------------------------------------------
// SemanticVersion
// ---------------------------------------------------------------------------

/// One dot-separated pre-release identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PreRelease {
    Numeric(u64),
    Alpha(String),
}

impl PartialOrd for PreRelease {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PreRelease {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PreRelease::Numeric(a), PreRelease::Numeric(b)) => a.cmp(b),
            (PreRelease::Numeric(_), PreRelease::Alpha(_)) => Ordering::Less,
            (PreRelease::Alpha(_), PreRelease::Numeric(_)) => Ordering::Greater,
            (PreRelease::Alpha(a), PreRelease::Alpha(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for PreRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreRelease::Numeric(n) => write!(f, "{n}"),
            PreRelease::Alpha(s) => f.write_str(s),
        }
    }
}

/// `major.minor.patch` with optional pre-release and build metadata.
///
/// Build metadata takes no part in precedence (see [`SemanticVersion::precedence`])
/// but does distinguish two versions: `1.0.0+b7` is not `1.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<PreRelease>,
    pub build: Option<String>,
}

impl SemanticVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: None,
        }
    }

    fn parse(token: &str, body: &str) -> Result<Self> {
        let invalid = |reason: &str| HarnessError::InvalidVersion {
            token: token.to_string(),
            reason: reason.to_string(),
        };
        let caps = semver_regex()
            .captures(body)
            .ok_or_else(|| invalid("not a semantic version (major.minor.patch)"))?;
        let number = |i: usize| -> Result<u64> {
            caps[i]
                .parse::<u64>()
                .map_err(|_| invalid("version component out of range"))
        };
        let pre = match caps.get(4) {
            None => Vec::new(),
            Some(m) => m
                .as_str()
                .split('.')
                .map(|id| match id.parse::<u64>() {
                    Ok(n) if id.bytes().all(|b| b.is_ascii_digit()) => PreRelease::Numeric(n),
                    _ => PreRelease::Alpha(id.to_string()),
                })
                .collect(),
        };
        Ok(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            pre,
            build: caps.get(5).map(|m| m.as_str().to_string()),
        })
    }
}

impl SemanticVersion {
    /// Standard semver precedence: build metadata is ignored.
    pub fn precedence(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A release ranks above any of its pre-releases.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Total order consistent with `Eq`: build metadata only breaks precedence ties.
impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence(other)
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            let pre: Vec<String> = self.pre.iter().map(ToString::to_string).collect();
            write!(f, "-{}", pre.join("."))?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// A record version: semantic (`v` prefix) or calendar (`d` prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Version {
    Semantic(SemanticVersion),
    Calendar(NaiveDate),
}

impl Version {
    pub fn parse(token: &str) -> Result<Self> {
        let mut chars = token.chars();
        match chars.next() {
            Some('v') => SemanticVersion::parse(token, chars.as_str()).map(Version::Semantic),
            Some('d') => {
                let body = chars.as_str();
                let invalid = |reason: String| HarnessError::InvalidVersion {
                    token: token.to_string(),
                    reason,
                };
                if !date_regex().is_match(body) {
                    return Err(invalid("expected a YYYY-MM-DD date".to_string()));
                }
                NaiveDate::parse_from_str(body, "%Y-%m-%d")
                    .map(Version::Calendar)
                    .map_err(|err| invalid(err.to_string()))
            }
            _ => Err(HarnessError::UnrecognizedVersionKind(token.to_string())),
        }
    }

    /// Today's date as a calendar version; the default output version.
    pub fn today() -> Self {
        Version::Calendar(chrono::Local::now().date_naive())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Version::Semantic(_) => "semantic",
            Version::Calendar(_) => "calendar",
        }
    }

    /// Order two versions of the same kind by precedence.
    pub fn compare(&self, other: &Version) -> Result<Ordering> {
        match (self, other) {
            (Version::Semantic(a), Version::Semantic(b)) => Ok(a.precedence(b)),
            (Version::Calendar(a), Version::Calendar(b)) => Ok(a.cmp(b)),
            _ => Err(HarnessError::VersionKindMismatch {
                left: self.to_string(),
                right: other.to_string(),
            }),
        }
    }

    /// Highest of `versions`; fails if they are not all of one kind.
    pub fn latest<'a, I>(versions: I) -> Result<Option<Version>>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let mut best: Option<&Version> = None;
        for v in versions {
            best = match best {
                None => Some(v),
                Some(b) if v.compare(b)? == Ordering::Greater => Some(v),
                keep => keep,
            };
        }
        Ok(best.cloned())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Semantic(v) => write!(f, "v{v}"),
            Version::Calendar(d) => write!(f, "d{}", d.format("%Y-%m-%d")),
        }
    }
}

impl std::str::FromStr for Version {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = HarnessError;

    fn try_from(s: String) -> Result<Self> {
        Version::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}
