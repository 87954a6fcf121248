// Error taxonomy for the client library.
//
// Transport failures, server-reported failures and local precondition
// failures are kept apart so the binary can report each one the way the
// user expects (host for connection problems, verbatim text for server
// messages, path for local files).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("could not connect with the given url '{host}': {source}")]
    Transport {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server answered {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("invalid host url '{0}'")]
    InvalidHost(String),

    /// Authorization failure that survived the one re-login attempt.
    #[error("{0}")]
    Permission(String),

    /// Any other failure reported by the server; text is shown verbatim.
    #[error("{0}")]
    Server(String),

    #[error("too many arguments passed in, expected {expected}")]
    TooManyArguments { expected: usize },

    #[error("unknown keyword argument {0}")]
    UnknownArgument(String),

    #[error("unknown API call '{0}'")]
    UnknownCall(String),

    #[error("{}: {source}", .path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "could not decode valid JSON from {}, please remove that file and try again: {source}",
        .path.display()
    )]
    DescriptorCache {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed server response to '{call}': {source}")]
    MalformedReply {
        call: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("file '{}' could not be used as configuration: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error("could not log in as {0}, no password given")]
    NoPassword(String),

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error(
        "you are trying to act as {requested} however the identity provider authenticated you as {actual}"
    )]
    IdentityMismatch { requested: String, actual: String },

    #[error("could not verify email {0}")]
    UnverifiedIdentity(String),

    #[error("delegated login failed: {0}")]
    OAuth(String),

    #[error("Aborting.")]
    Aborted,

    #[error("cancelled")]
    Cancelled,

    #[error("download still not ready after {attempts} attempts")]
    DownloadExhausted { attempts: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// True for network level failures that are never retried.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { .. } | ClientError::HttpStatus { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
