use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Failures of a single identity or ASN lookup.
///
/// None of these stop the scheduler; they are reported and the next natural
/// trigger tries again.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("lookup returned no data")]
    NoData,

    #[error("malformed lookup response: {0}")]
    Parse(String),
}

impl LookupError {
    /// Short code used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::Transport(_) => "transport",
            LookupError::Timeout(_) => "timeout",
            LookupError::NoData => "no_data",
            LookupError::Parse(_) => "parse",
        }
    }
}

/// Failures while materializing a cached asset. Callers carry on without it.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to fetch asset {key}: {reason}")]
    FetchFailed { key: String, reason: String },

    #[error("failed to write asset to {path:?}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
