use thiserror::Error;
use uuid::Uuid;

use boards_types::events::UnknownEvent;

use crate::connection::ConnectionState;

/// Errors surfaced by user gestures on a board session.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("board is not connected ({0})")]
    NotConnected(ConnectionState),

    #[error("post {0} is not on this board")]
    PostNotFound(Uuid),

    #[error("post group {0} is not on this board")]
    GroupNotFound(Uuid),

    #[error(transparent)]
    Drop(#[from] DropError),
}

/// Why a drop was refused. Refused drops never touch the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropError {
    #[error("dragged entity {0} no longer exists")]
    UnknownSource(Uuid),

    #[error("drop target post {0} no longer exists")]
    UnknownTarget(Uuid),

    #[error("cannot drop an entity onto itself")]
    OntoItself,

    #[error("a post can only be dragged out of a group with siblings")]
    NotDetachable,

    #[error("a group of several posts cannot be merged into another group")]
    GroupMerge,
}

/// Failure to turn an inbound frame into a typed event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error(transparent)]
    UnknownEvent(#[from] UnknownEvent),

    #[error("successful {0} carried no result")]
    MissingResult(String),

    #[error("bad {event} result: {source}")]
    BadResult {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not valid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },
}
