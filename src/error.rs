//! Error taxonomy for discovery and per-unit enhancement.
//!
//! Discovery failures abort the whole pass. Unit failures are classified so
//! the orchestrator can downgrade the recoverable ones to messages and keep
//! going with the next unit.
use std::path::PathBuf;

/// Failure while locating persistence metadata.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A descriptor could not be parsed; partial results are undefined.
    #[error("parsing metadata error in {path}")]
    DescriptorParse {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("annotation query failed for unit {unit}")]
    AnnotationQuery {
        unit: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("enumerate output directory {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while enhancing a single build unit.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// The backend cannot be resolved from the unit's environment.
    #[error("enhancer backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend exists but offers no matching invocation signature.
    #[error("enhancer binding error: {0}")]
    Binding(String),

    /// The isolated environment for the unit could not be assembled.
    #[error("build isolated environment for {unit}")]
    Environment {
        unit: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl UnitError {
    /// True when orchestration may continue with the next unit.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, UnitError::Unexpected(_))
    }
}

/// Invalid configuration values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported enhancer config schema_version {0}")]
    SchemaVersion(u32),

    #[error("unknown persistence api {0:?}")]
    UnknownApi(String),

    #[error("metadata extension must not contain a path separator: {0:?}")]
    InvalidExtension(String),

    #[error("duplicate backend declaration {0}")]
    DuplicateBackend(String),

    #[error("backend {0} declares an empty command")]
    EmptyCommand(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unexpected_errors_abort() {
        assert!(UnitError::BackendUnavailable("x".into()).is_recoverable());
        assert!(UnitError::Binding("x".into()).is_recoverable());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(UnitError::Environment {
            unit: "core".into(),
            source: io
        }
        .is_recoverable());
        assert!(!UnitError::Unexpected(anyhow::anyhow!("boom")).is_recoverable());
    }

    #[test]
    fn descriptor_parse_keeps_cause_chain() {
        let err = DiscoveryError::DescriptorParse {
            path: PathBuf::from("/p/orm.xml"),
            source: anyhow::anyhow!("unexpected end of input"),
        };
        let chain = format!("{:?}", anyhow::Error::new(err));
        assert!(chain.contains("parsing metadata error in /p/orm.xml"));
        assert!(chain.contains("unexpected end of input"));
    }
}
