//! Error type shared by the host, the scopes and the language adapters.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, HostError>;

/// Every failure the host surfaces to its callers.
///
/// A resolver that simply has no source for a path is not an error; that
/// condition travels as `None` and ends in a fallback.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("compile error in {origin}: {message}")]
    Compile { origin: String, message: String },

    /// A guest-side failure. `kind` names the guest error class.
    #[error("{kind}: {message}")]
    Runtime { kind: String, message: String },

    #[error("member '{member}' not found")]
    MemberNotFound { member: String },

    #[error("failed to invoke '{member}': {source}")]
    Invocation {
        member: String,
        #[source]
        source: Box<HostError>,
    },

    #[error("variable '{0}' is not defined")]
    VariableNotFound(String),

    #[error("'{0}' cannot be instantiated")]
    NotInstantiable(String),

    #[error("script '{0}' is already precompiled")]
    DuplicateScript(String),

    #[error("no precompiled script named '{0}'")]
    ScriptNotFound(String),

    #[error("resolver {0} is already registered")]
    DuplicateResolver(Uuid),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl HostError {
    pub(crate) fn blank(name: &'static str) -> Self {
        HostError::InvalidArgument {
            name,
            reason: "must not be empty or white space".to_string(),
        }
    }

    /// Fail with `InvalidArgument` when `value` is empty or white space.
    pub(crate) fn require(name: &'static str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            Err(Self::blank(name))
        } else {
            Ok(())
        }
    }

    /// The guest error class, when this error came from guest code.
    pub fn guest_kind(&self) -> Option<&str> {
        match self {
            HostError::Runtime { kind, .. } => Some(kind),
            HostError::Invocation { source, .. } => source.guest_kind(),
            _ => None,
        }
    }
}
