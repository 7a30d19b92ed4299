use std::path::PathBuf;

use thiserror::Error;

/// Failure to decode a tagged property string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("tagged value has no type separator: {0:?}")]
    MissingTag(String),
    #[error("unknown type tag: {0}")]
    UnknownTag(String),
    #[error("invalid history payload: {0}")]
    InvalidHistory(String),
    #[error("property {property} expects a {expected} value")]
    TypeMismatch {
        property: &'static str,
        expected: &'static str,
    },
}

/// Failure to read or write the persisted session state file
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while deriving repository status
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to inspect repository marker {path}: {source}")]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read head reference {path}: {source}")]
    HeadUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("status query failed: {0}")]
    StatusQuery(String),
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Failure to start a command inside an invocation
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("no current invocation")]
    NoCurrentInvocation,
    #[error("invocation {0} already ran a command")]
    AlreadyStarted(u64),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
