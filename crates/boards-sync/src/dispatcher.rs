//! Inbound routing: raw frame -> typed event -> exactly one store reducer.

use tracing::debug;
use uuid::Uuid;

use boards_types::events::{BoardEvent, EventKind, InboundEnvelope};

use crate::error::DecodeError;
use crate::store::BoardStore;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Applied {
        event: BoardEvent,
        request_id: Option<Uuid>,
    },
    /// The server refused one of our requests.
    Rejected {
        kind: EventKind,
        message: String,
        request_id: Option<Uuid>,
    },
}

pub fn decode(raw: &str) -> Result<Inbound, DecodeError> {
    let InboundEnvelope {
        event,
        success,
        result,
        error_message,
        request_id,
    } = serde_json::from_str(raw).map_err(DecodeError::Malformed)?;
    let kind: EventKind = event.parse()?;

    if !success {
        return Ok(Inbound::Rejected {
            kind,
            message: error_message.unwrap_or_else(|| format!("{} failed", kind)),
            request_id,
        });
    }

    let result = result.ok_or_else(|| DecodeError::MissingResult(event.clone()))?;
    let event = BoardEvent::from_result(kind, result)
        .map_err(|source| DecodeError::BadResult { event, source })?;
    Ok(Inbound::Applied { event, request_id })
}

/// Apply a successful event to `store`. `local_user` is the authenticated
/// user, whose own focus events are not shown as typing.
pub fn reduce(store: &BoardStore, event: &BoardEvent, local_user: Option<Uuid>) -> BoardStore {
    debug!("Reducing {}", event.kind());
    match event {
        // Session-level; the store has nothing to do.
        BoardEvent::Authenticated { .. } => store.clone(),
        BoardEvent::BoardConnected {
            connected_users,
            new_user,
        } => store.apply_roster(connected_users.clone(), new_user.clone()),
        BoardEvent::BoardDisconnected { user_id } => store.apply_user_left(*user_id),
        BoardEvent::PostCreated { post, post_group } => {
            store.apply_post_created(post.clone(), post_group.clone())
        }
        BoardEvent::PostUpdated {
            updated_post,
            old_post,
        } => store.apply_post_updated(updated_post.clone(), old_post.as_ref()),
        BoardEvent::PostDeleted { post } => store.apply_post_removed(post),
        BoardEvent::PostDetached { post, post_group } => {
            store.apply_post_detached(post.clone(), post_group.clone())
        }
        BoardEvent::PostFocused { post, user } => {
            if Some(user.id) == local_user {
                store.clone()
            } else {
                store.apply_focus(user.id, post.id)
            }
        }
        BoardEvent::PostGroupUpdated(patch) => store.apply_group_patch(patch),
        BoardEvent::PostGroupDeleted { id } => store.apply_group_removed(*id),
    }
}
