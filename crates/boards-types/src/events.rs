use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Post, PostColor, PostGroup, PostGroupPatch, User};

/// Closed set of event names carried on the board channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "user.authenticate")]
    UserAuthenticate,
    #[serde(rename = "board.connect")]
    BoardConnect,
    #[serde(rename = "board.disconnect")]
    BoardDisconnect,
    #[serde(rename = "post.create")]
    PostCreate,
    #[serde(rename = "post.update")]
    PostUpdate,
    #[serde(rename = "post.delete")]
    PostDelete,
    #[serde(rename = "post.detach")]
    PostDetach,
    #[serde(rename = "post.focus")]
    PostFocus,
    #[serde(rename = "post_group.update")]
    PostGroupUpdate,
    #[serde(rename = "post_group.delete")]
    PostGroupDelete,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::UserAuthenticate,
        EventKind::BoardConnect,
        EventKind::BoardDisconnect,
        EventKind::PostCreate,
        EventKind::PostUpdate,
        EventKind::PostDelete,
        EventKind::PostDetach,
        EventKind::PostFocus,
        EventKind::PostGroupUpdate,
        EventKind::PostGroupDelete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserAuthenticate => "user.authenticate",
            Self::BoardConnect => "board.connect",
            Self::BoardDisconnect => "board.disconnect",
            Self::PostCreate => "post.create",
            Self::PostUpdate => "post.update",
            Self::PostDelete => "post.delete",
            Self::PostDetach => "post.detach",
            Self::PostFocus => "post.focus",
            Self::PostGroupUpdate => "post_group.update",
            Self::PostGroupDelete => "post_group.delete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for EventKind {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

// -- Outbound --

/// Commands sent FROM the client TO the server, serialized as
/// `{ "event": ..., "params": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "params")]
pub enum BoardCommand {
    #[serde(rename = "user.authenticate")]
    Authenticate { jwt: String },

    #[serde(rename = "board.connect")]
    ConnectBoard { board_id: Uuid },

    #[serde(rename = "post.create")]
    CreatePost(CreatePostParams),

    #[serde(rename = "post.update")]
    UpdatePost(UpdatePostParams),

    #[serde(rename = "post.delete")]
    DeletePost { post_id: Uuid, board_id: Uuid },

    #[serde(rename = "post.detach")]
    DetachPost(DetachPostParams),

    #[serde(rename = "post.focus")]
    FocusPost { id: Uuid, board_id: Uuid },

    #[serde(rename = "post_group.update")]
    UpdatePostGroup(UpdatePostGroupParams),

    #[serde(rename = "post_group.delete")]
    DeletePostGroup { post_group_id: Uuid, board_id: Uuid },
}

impl BoardCommand {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Authenticate { .. } => EventKind::UserAuthenticate,
            Self::ConnectBoard { .. } => EventKind::BoardConnect,
            Self::CreatePost(_) => EventKind::PostCreate,
            Self::UpdatePost(_) => EventKind::PostUpdate,
            Self::DeletePost { .. } => EventKind::PostDelete,
            Self::DetachPost(_) => EventKind::PostDetach,
            Self::FocusPost { .. } => EventKind::PostFocus,
            Self::UpdatePostGroup(_) => EventKind::PostGroupUpdate,
            Self::DeletePostGroup { .. } => EventKind::PostGroupDelete,
        }
    }

    /// The post or group this command mutates. Handshake and focus commands
    /// mutate nothing.
    pub fn entity_id(&self) -> Option<Uuid> {
        match self {
            Self::Authenticate { .. } | Self::ConnectBoard { .. } | Self::FocusPost { .. } => None,
            Self::CreatePost(p) => Some(p.id),
            Self::UpdatePost(p) => Some(p.id),
            Self::DeletePost { post_id, .. } => Some(*post_id),
            Self::DetachPost(p) => Some(p.post_id),
            Self::UpdatePostGroup(p) => Some(p.patch.id),
            Self::DeletePostGroup { post_group_id, .. } => Some(*post_group_id),
        }
    }
}

/// Creation parameters. Ids are generated client-side so the server echo
/// lands on the optimistically created entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePostParams {
    pub id: Uuid,
    pub board_id: Uuid,
    pub post_group_id: Uuid,
    pub content: String,
    pub pos_x: i32,
    pub pos_y: i32,
    pub color: PostColor,
    pub height: i32,
    pub z_index: i32,
    pub post_order: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePostParams {
    pub id: Uuid,
    pub board_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<PostColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_group_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_order: Option<f64>,
}

impl UpdatePostParams {
    pub fn new(id: Uuid, board_id: Uuid) -> Self {
        Self {
            id,
            board_id,
            content: None,
            color: None,
            height: None,
            post_group_id: None,
            post_order: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetachPostParams {
    pub post_id: Uuid,
    pub board_id: Uuid,
    /// Id of the new singleton group the post moves into.
    pub post_group_id: Uuid,
    pub pos_x: i32,
    pub pos_y: i32,
    pub z_index: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePostGroupParams {
    pub board_id: Uuid,
    #[serde(flatten)]
    pub patch: PostGroupPatch,
}

/// One outbound frame: a command plus the correlation id the server may echo
/// back on its response.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub command: BoardCommand,
    pub request_id: Option<Uuid>,
}

impl OutboundMessage {
    pub fn new(command: BoardCommand) -> Self {
        Self {
            command,
            request_id: None,
        }
    }

    pub fn correlated(command: BoardCommand) -> Self {
        Self {
            command,
            request_id: Some(Uuid::new_v4()),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.command.kind()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut value = serde_json::to_value(&self.command)?;
        if let (Some(id), Some(obj)) = (self.request_id, value.as_object_mut()) {
            obj.insert("request_id".into(), serde_json::Value::String(id.to_string()));
        }
        serde_json::to_string(&value)
    }
}

// -- Inbound --

/// Raw inbound frame, before the result is matched against its event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub event: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticateResult {
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardConnectResult {
    #[serde(default)]
    pub board_id: Option<Uuid>,
    #[serde(default)]
    pub connected_users: Vec<User>,
    pub new_user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardDisconnectResult {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostCreateResult {
    pub post: Post,
    pub post_group: PostGroup,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostUpdateResult {
    pub updated_post: Post,
    /// Present only when the update moved the post to another group.
    #[serde(default)]
    pub old_post: Option<Post>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostDeleteResult {
    pub post: Post,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostDetachResult {
    pub post: Post,
    pub post_group: PostGroup,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostFocusResult {
    pub post: Post,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostGroupDeleteResult {
    pub id: Uuid,
}

/// A successful inbound event, one concrete payload per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    Authenticated {
        user: User,
    },
    BoardConnected {
        connected_users: Vec<User>,
        new_user: User,
    },
    BoardDisconnected {
        user_id: Uuid,
    },
    PostCreated {
        post: Post,
        post_group: PostGroup,
    },
    PostUpdated {
        updated_post: Post,
        old_post: Option<Post>,
    },
    PostDeleted {
        post: Post,
    },
    PostDetached {
        post: Post,
        post_group: PostGroup,
    },
    PostFocused {
        post: Post,
        user: User,
    },
    PostGroupUpdated(PostGroupPatch),
    PostGroupDeleted {
        id: Uuid,
    },
}

impl BoardEvent {
    /// Decode the `result` payload of a successful envelope of `kind`.
    pub fn from_result(kind: EventKind, result: serde_json::Value) -> serde_json::Result<Self> {
        use serde_json::from_value;

        Ok(match kind {
            EventKind::UserAuthenticate => {
                let r: AuthenticateResult = from_value(result)?;
                Self::Authenticated { user: r.user }
            }
            EventKind::BoardConnect => {
                let r: BoardConnectResult = from_value(result)?;
                Self::BoardConnected {
                    connected_users: r.connected_users,
                    new_user: r.new_user,
                }
            }
            EventKind::BoardDisconnect => {
                let r: BoardDisconnectResult = from_value(result)?;
                Self::BoardDisconnected { user_id: r.user_id }
            }
            EventKind::PostCreate => {
                let r: PostCreateResult = from_value(result)?;
                Self::PostCreated {
                    post: r.post,
                    post_group: r.post_group,
                }
            }
            EventKind::PostUpdate => {
                let r: PostUpdateResult = from_value(result)?;
                Self::PostUpdated {
                    updated_post: r.updated_post,
                    old_post: r.old_post,
                }
            }
            EventKind::PostDelete => {
                let r: PostDeleteResult = from_value(result)?;
                Self::PostDeleted { post: r.post }
            }
            EventKind::PostDetach => {
                let r: PostDetachResult = from_value(result)?;
                Self::PostDetached {
                    post: r.post,
                    post_group: r.post_group,
                }
            }
            EventKind::PostFocus => {
                let r: PostFocusResult = from_value(result)?;
                Self::PostFocused {
                    post: r.post,
                    user: r.user,
                }
            }
            EventKind::PostGroupUpdate => Self::PostGroupUpdated(from_value(result)?),
            EventKind::PostGroupDelete => {
                let r: PostGroupDeleteResult = from_value(result)?;
                Self::PostGroupDeleted { id: r.id }
            }
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Authenticated { .. } => EventKind::UserAuthenticate,
            Self::BoardConnected { .. } => EventKind::BoardConnect,
            Self::BoardDisconnected { .. } => EventKind::BoardDisconnect,
            Self::PostCreated { .. } => EventKind::PostCreate,
            Self::PostUpdated { .. } => EventKind::PostUpdate,
            Self::PostDeleted { .. } => EventKind::PostDelete,
            Self::PostDetached { .. } => EventKind::PostDetach,
            Self::PostFocused { .. } => EventKind::PostFocus,
            Self::PostGroupUpdated(_) => EventKind::PostGroupUpdate,
            Self::PostGroupDeleted { .. } => EventKind::PostGroupDelete,
        }
    }

    /// The post or group this event mutates, used to match echoes of our own
    /// commands when the server does not return a request id.
    pub fn entity_id(&self) -> Option<Uuid> {
        match self {
            Self::PostCreated { post, .. } => Some(post.id),
            Self::PostUpdated { updated_post, .. } => Some(updated_post.id),
            Self::PostDeleted { post } => Some(post.id),
            Self::PostDetached { post, .. } => Some(post.id),
            Self::PostGroupUpdated(patch) => Some(patch.id),
            Self::PostGroupDeleted { id } => Some(*id),
            _ => None,
        }
    }
}
