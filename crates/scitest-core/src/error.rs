//! Error taxonomy for the scitest engine.
//!
//! Load-time problems (conflicts, duplicates, unknown names, bad
//! parameters, bad versions) are fatal to the load phase. Execution
//! failures abort a single test. Extraction failures are not errors at
//! all; see [`crate::query::ExtractionError`].

use crate::registry::TypeKind;

/// Errors produced while loading, resolving, running or persisting.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("conflicting {kind} {name:?}: {detail}")]
    Conflict {
        kind: String,
        name: String,
        detail: String,
    },

    #[error("duplicate {kind} {name:?} in {origin}")]
    DuplicateName {
        kind: &'static str,
        name: String,
        origin: String,
    },

    #[error("unknown query {name:?} referenced from {origin}")]
    UnknownQuery { name: String, origin: String },

    #[error("unknown query set {name:?} referenced from {origin}")]
    UnknownQuerySet { name: String, origin: String },

    #[error("unknown {kind} type {name:?}")]
    UnknownType { kind: TypeKind, name: String },

    #[error("query {name:?} in {origin} extends {base:?}: {reason}")]
    ExtendsNotFound {
        name: String,
        base: String,
        origin: String,
        reason: String,
    },

    #[error("invalid parameter {parameter:?} for {owner}: {reason}")]
    InvalidParameter {
        owner: String,
        parameter: String,
        reason: String,
    },

    #[error("invalid version {token:?}: {reason}")]
    InvalidVersion { token: String, reason: String },

    #[error("unrecognized version kind in {0:?} (expected a 'v' or 'd' prefix)")]
    UnrecognizedVersionKind(String),

    #[error("cannot order {left} against {right}: version kinds differ")]
    VersionKindMismatch { left: String, right: String },

    #[error("malformed {what} in {origin}: {reason}")]
    Malformed {
        what: &'static str,
        origin: String,
        reason: String,
    },

    #[error("in {origin} ({name}): {source}")]
    InDefinition {
        origin: String,
        name: String,
        #[source]
        source: Box<HarnessError>,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("requested suites not found: {}", .names.join(", "))]
    UnknownSuites { names: Vec<String> },

    #[error("record {path} already exists (overwrite not requested)")]
    RecordExists { path: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn malformed(
        what: &'static str,
        origin: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Malformed {
            what,
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    /// Attach the definition's file and name to an error raised while building it.
    pub(crate) fn in_definition(self, origin: impl Into<String>, name: impl Into<String>) -> Self {
        Self::InDefinition {
            origin: origin.into(),
            name: name.into(),
            source: Box::new(self),
        }
    }
}

/// Result type for scitest engine operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display() {
        let err = HarnessError::Conflict {
            kind: "query".to_string(),
            name: "foo".to_string(),
            detail: "defined in a/query-x.yml and b/query-y.yml".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("conflicting query"));
        assert!(msg.contains("\"foo\""));
    }

    #[test]
    fn test_in_definition_keeps_source() {
        let err = HarnessError::UnknownType {
            kind: TypeKind::Quantity,
            name: "FancyQuantity".to_string(),
        }
        .in_definition("query-a.yml", "energy");
        let msg = err.to_string();
        assert!(msg.contains("query-a.yml"));
        assert!(msg.contains("energy"));
        assert!(msg.contains("FancyQuantity"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_version_errors_display() {
        let err = HarnessError::UnrecognizedVersionKind("x1.0".to_string());
        assert!(err.to_string().contains("'v' or 'd'"));

        let err = HarnessError::VersionKindMismatch {
            left: "v1.0.0".to_string(),
            right: "d2024-01-01".to_string(),
        };
        assert!(err.to_string().contains("kinds differ"));
    }
}
