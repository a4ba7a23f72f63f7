//! Error taxonomy for the synchronization engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The remote answered with `ok=false`; carries its human-readable message.
    #[error("remote rejected request: {0}")]
    RemoteRejection(String),

    /// A required reference could not be resolved against the cache or remote.
    #[error("could not resolve {entity} {id}")]
    Resolution { entity: &'static str, id: String },

    /// Push connection failed, errored or was closed.
    #[error("push transport failure: {0}")]
    Transport(String),

    /// The push login frame was answered with `autenticado=false`.
    #[error("push login rejected by server")]
    Authentication,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no session credential, run `macrochat-sync login` first")]
    NotLoggedIn,

    #[error("no active connection available to send the message")]
    NoActiveConnection,

    #[error("request timed out")]
    Timeout,
}

impl Error {
    pub(crate) fn unresolved(entity: &'static str, id: impl ToString) -> Self {
        Self::Resolution {
            entity,
            id: id.to_string(),
        }
    }
}
