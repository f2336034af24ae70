//! Optimistic local mutation.
//!
//! A gesture is turned into a [`Plan`]: store mutations to apply right away
//! plus the commands that ask the server to do the same. The mutations stay
//! in the [`PendingLedger`] until the server answers. When a gesture is
//! refused the visible store is rebuilt from the server-confirmed store by
//! replaying only the mutations still pending, so whatever the server
//! accepted in the meantime survives.

use std::collections::VecDeque;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use boards_types::events::{
    BoardCommand, CreatePostParams, EventKind, OutboundMessage, UpdatePostGroupParams,
    UpdatePostParams,
};
use boards_types::models::{Post, PostColor, PostGroup, PostGroupPatch};

use crate::error::SyncError;
use crate::layout;
use crate::ordering;
use crate::store::BoardStore;

/// One optimistic change to the store.
///
/// Mutations on existing posts carry only the fields the gesture sets and
/// are merged into the post as it is when applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    InsertGroup(PostGroup),
    EditPost(UpdatePostParams),
    RemovePost(Post),
    RemoveGroup(Uuid),
    PatchGroup(PostGroupPatch),
    DetachPost { post_id: Uuid, group: PostGroup },
}

impl Mutation {
    fn apply(&self, store: &BoardStore) -> BoardStore {
        match self {
            Self::InsertGroup(group) => store.apply_group_created(group.clone()),
            Self::EditPost(edit) => match store.post(edit.id) {
                Some(current) => store.apply_post_updated(edited(current, edit), None),
                None => {
                    debug!("Post {} is gone, edit not applied", edit.id);
                    store.clone()
                }
            },
            Self::RemovePost(post) => store.apply_post_removed(post),
            Self::RemoveGroup(id) => store.apply_group_removed(*id),
            Self::PatchGroup(patch) => store.apply_group_patch(patch),
            Self::DetachPost { post_id, group } => match store.post(*post_id) {
                Some(current) => {
                    let post = Post {
                        post_order: ordering::FIRST_KEY,
                        ..current.clone()
                    };
                    store.apply_post_detached(post, group.clone())
                }
                None => {
                    debug!("Post {} is gone, detach not applied", post_id);
                    store.clone()
                }
            },
        }
    }
}

/// `post` with every field `edit` sets replaced.
fn edited(post: &Post, edit: &UpdatePostParams) -> Post {
    let mut post = post.clone();
    if let Some(content) = &edit.content {
        post.content = content.clone();
    }
    if let Some(color) = edit.color {
        post.color = color;
    }
    if let Some(height) = edit.height {
        post.height = height;
    }
    if let Some(group_id) = edit.post_group_id {
        post.post_group_id = group_id;
    }
    if let Some(key) = edit.post_order {
        post.post_order = key;
    }
    post
}

/// Mutations for the store plus the commands that carry the same values to
/// the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub mutations: Vec<Mutation>,
    pub commands: Vec<BoardCommand>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutate(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn send(mut self, command: BoardCommand) -> Self {
        self.commands.push(command);
        self
    }

    /// Apply to `store`. The result holds the new store, the correlated
    /// messages to send and the mutations to keep while they are pending.
    pub fn apply(self, store: &BoardStore) -> Applied {
        let next = replay(store, &self.mutations);
        let messages = self
            .commands
            .into_iter()
            .map(OutboundMessage::correlated)
            .collect();
        Applied {
            store: next,
            messages,
            mutations: self.mutations,
        }
    }
}

fn replay<'a>(
    store: &BoardStore,
    mutations: impl IntoIterator<Item = &'a Mutation>,
) -> BoardStore {
    mutations
        .into_iter()
        .fold(store.clone(), |acc, m| m.apply(&acc))
}

#[derive(Debug, Clone)]
pub struct Applied {
    pub store: BoardStore,
    pub messages: Vec<OutboundMessage>,
    pub mutations: Vec<Mutation>,
}

// -- Pending ledger --

#[derive(Debug, Clone)]
struct PendingRequest {
    request_id: Uuid,
    kind: EventKind,
    entity_id: Option<Uuid>,
    confirmed: bool,
}

/// An optimistic gesture still waiting for the server.
#[derive(Debug, Clone)]
pub struct PendingOp {
    requests: Vec<PendingRequest>,
    mutations: Vec<Mutation>,
}

impl PendingOp {
    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.requests.iter().map(|r| r.kind)
    }

    fn is_done(&self) -> bool {
        self.requests.iter().all(|r| r.confirmed)
    }
}

/// Gestures in flight, oldest first.
#[derive(Debug, Clone, Default)]
pub struct PendingLedger {
    ops: VecDeque<PendingOp>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn record(&mut self, messages: &[OutboundMessage], mutations: Vec<Mutation>) {
        let requests: Vec<PendingRequest> = messages
            .iter()
            .filter_map(|m| {
                m.request_id.map(|request_id| PendingRequest {
                    request_id,
                    kind: m.kind(),
                    entity_id: m.command.entity_id(),
                    confirmed: false,
                })
            })
            .collect();
        if requests.is_empty() {
            return;
        }
        self.ops.push_back(PendingOp {
            requests,
            mutations,
        });
    }

    /// Mark the request answered by a successful event confirmed. Without a
    /// request id the oldest unconfirmed request of the same kind and entity
    /// is taken. Returns false when the event answers nothing of ours.
    pub fn confirm(
        &mut self,
        kind: EventKind,
        entity_id: Option<Uuid>,
        request_id: Option<Uuid>,
    ) -> bool {
        let found = self.find(|r| match request_id {
            Some(id) => r.request_id == id,
            None => !r.confirmed && r.kind == kind && r.entity_id == entity_id,
        });
        let Some((op, req)) = found else {
            return false;
        };
        self.ops[op].requests[req].confirmed = true;
        if self.ops[op].is_done() {
            debug!("Pending operation fully confirmed");
            self.ops.remove(op);
        }
        true
    }

    /// Take the operation a rejection refers to out of the ledger.
    pub fn reject(&mut self, kind: EventKind, request_id: Option<Uuid>) -> Option<PendingOp> {
        let (op, _) = self.find(|r| match request_id {
            Some(id) => r.request_id == id,
            None => !r.confirmed && r.kind == kind,
        })?;
        self.ops.remove(op)
    }

    /// `confirmed` with every pending mutation applied on top, oldest first.
    pub fn replay(&self, confirmed: &BoardStore) -> BoardStore {
        replay(confirmed, self.ops.iter().flat_map(|op| op.mutations.iter()))
    }

    /// Forget everything in flight. The store keeps the optimistic state.
    pub fn clear(&mut self) {
        if !self.ops.is_empty() {
            warn!("Dropping {} unconfirmed operations", self.ops.len());
        }
        self.ops.clear();
    }

    fn find<F>(&self, matches: F) -> Option<(usize, usize)>
    where
        F: Fn(&PendingRequest) -> bool,
    {
        self.ops.iter().enumerate().find_map(|(i, op)| {
            op.requests
                .iter()
                .position(&matches)
                .map(|j| (i, j))
        })
    }
}

// -- Gestures --

/// Identity of the acting session, needed by every plan.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub board_id: Uuid,
    pub user_id: Uuid,
}

/// A new singleton group at the clicked position, on top of everything.
pub fn create_post(
    store: &BoardStore,
    actor: Actor,
    x: f64,
    y: f64,
    color: PostColor,
    grid: Option<i32>,
) -> Plan {
    let now = Utc::now();
    let (pos_x, pos_y) = layout::drop_position(x, y, grid);
    let z_index = store.next_z();
    let group_id = Uuid::new_v4();
    let post = Post {
        id: Uuid::new_v4(),
        board_id: actor.board_id,
        user_id: actor.user_id,
        content: String::new(),
        color,
        height: layout::POST_HEIGHT,
        post_group_id: group_id,
        post_order: ordering::FIRST_KEY,
        created_at: now,
        updated_at: now,
    };
    let params = CreatePostParams {
        id: post.id,
        board_id: actor.board_id,
        post_group_id: group_id,
        content: post.content.clone(),
        pos_x,
        pos_y,
        color,
        height: post.height,
        z_index,
        post_order: post.post_order,
    };
    let group = PostGroup {
        id: group_id,
        board_id: actor.board_id,
        title: String::new(),
        pos_x,
        pos_y,
        z_index,
        posts: vec![post],
        created_at: now,
        updated_at: now,
    };
    Plan::new()
        .mutate(Mutation::InsertGroup(group))
        .send(BoardCommand::CreatePost(params))
}

/// New text for a post. Without a measured height one is derived from the
/// text.
pub fn edit_post(
    store: &BoardStore,
    actor: Actor,
    post_id: Uuid,
    content: String,
    height: Option<i32>,
) -> Result<Plan, SyncError> {
    if store.post(post_id).is_none() {
        return Err(SyncError::PostNotFound(post_id));
    }
    let edit = UpdatePostParams {
        height: Some(height.unwrap_or_else(|| layout::content_height(&content))),
        content: Some(content),
        ..UpdatePostParams::new(post_id, actor.board_id)
    };
    Ok(update_post(edit))
}

pub fn resize_post(
    store: &BoardStore,
    actor: Actor,
    post_id: Uuid,
    height: i32,
) -> Result<Plan, SyncError> {
    if store.post(post_id).is_none() {
        return Err(SyncError::PostNotFound(post_id));
    }
    let edit = UpdatePostParams {
        height: Some(height.max(layout::POST_HEIGHT)),
        ..UpdatePostParams::new(post_id, actor.board_id)
    };
    Ok(update_post(edit))
}

pub fn recolor_post(
    store: &BoardStore,
    actor: Actor,
    post_id: Uuid,
    color: PostColor,
) -> Result<Plan, SyncError> {
    if store.post(post_id).is_none() {
        return Err(SyncError::PostNotFound(post_id));
    }
    let edit = UpdatePostParams {
        color: Some(color),
        ..UpdatePostParams::new(post_id, actor.board_id)
    };
    Ok(update_post(edit))
}

/// The same partial update applied locally and sent as `post.update`.
fn update_post(edit: UpdatePostParams) -> Plan {
    Plan::new()
        .mutate(Mutation::EditPost(edit.clone()))
        .send(BoardCommand::UpdatePost(edit))
}

pub fn retitle_group(
    store: &BoardStore,
    actor: Actor,
    group_id: Uuid,
    title: String,
) -> Result<Plan, SyncError> {
    if store.group(group_id).is_none() {
        return Err(SyncError::GroupNotFound(group_id));
    }
    let patch = PostGroupPatch {
        title: Some(title),
        ..PostGroupPatch::new(group_id)
    };
    Ok(Plan::new()
        .mutate(Mutation::PatchGroup(patch.clone()))
        .send(BoardCommand::UpdatePostGroup(UpdatePostGroupParams {
            board_id: actor.board_id,
            patch,
        })))
}

/// Remove a post. The last post of a group takes the group with it, so the
/// server is asked to delete the group instead.
pub fn delete_post(store: &BoardStore, actor: Actor, post_id: Uuid) -> Result<Plan, SyncError> {
    let (group_id, index) = store.locate(post_id).ok_or(SyncError::PostNotFound(post_id))?;
    let group = store.group(group_id).ok_or(SyncError::GroupNotFound(group_id))?;

    if group.is_singleton() {
        return Ok(Plan::new()
            .mutate(Mutation::RemoveGroup(group_id))
            .send(BoardCommand::DeletePostGroup {
                post_group_id: group_id,
                board_id: actor.board_id,
            }));
    }
    Ok(Plan::new()
        .mutate(Mutation::RemovePost(group.posts[index].clone()))
        .send(BoardCommand::DeletePost {
            post_id,
            board_id: actor.board_id,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Actor {
        Actor {
            board_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        }
    }

    fn board_with_post(actor: Actor) -> (BoardStore, Uuid) {
        let plan = create_post(
            &BoardStore::default(),
            actor,
            10.0,
            20.0,
            PostColor::LightAqua,
            None,
        );
        let Mutation::InsertGroup(group) = &plan.mutations[0] else {
            panic!("expected a group insert");
        };
        let post_id = group.posts[0].id;
        (plan.apply(&BoardStore::default()).store, post_id)
    }

    #[test]
    fn create_puts_group_on_top() {
        let actor = actor();
        let (store, post_id) = board_with_post(actor);
        let (group_id, _) = store.locate(post_id).unwrap();
        let plan = create_post(&store, actor, -5.0, 40.0, PostColor::LightPink, None);

        let BoardCommand::CreatePost(params) = &plan.commands[0] else {
            panic!("expected post.create");
        };
        assert_eq!((params.pos_x, params.pos_y), (0, 40));
        assert_eq!(params.z_index, store.group(group_id).unwrap().z_index + 1);
        assert_eq!(params.post_order, 1.0);
        assert_eq!(params.height, 125);

        let next = plan.clone().apply(&store).store;
        assert_eq!(next.group_count(), 2);
        assert_eq!(next.max_z(), params.z_index);
    }

    #[test]
    fn edit_derives_height_from_content() {
        let actor = actor();
        let (store, post_id) = board_with_post(actor);
        let content = "line\n".repeat(12);
        let plan = edit_post(&store, actor, post_id, content.clone(), None).unwrap();
        let next = plan.apply(&store).store;
        let post = next.post(post_id).unwrap();
        assert_eq!(post.content, content);
        assert_eq!(post.height, layout::content_height(&content));
        assert!(post.height > layout::POST_HEIGHT);
    }

    #[test]
    fn deleting_last_post_deletes_group() {
        let actor = actor();
        let (store, post_id) = board_with_post(actor);
        let plan = delete_post(&store, actor, post_id).unwrap();
        assert!(matches!(
            plan.commands[0],
            BoardCommand::DeletePostGroup { .. }
        ));
        let next = plan.apply(&store).store;
        assert_eq!(next.group_count(), 0);
    }

    #[test]
    fn missing_post_is_an_error() {
        let actor = actor();
        let store = BoardStore::default();
        assert!(matches!(
            recolor_post(&store, actor, Uuid::new_v4(), PostColor::LightGreen),
            Err(SyncError::PostNotFound(_))
        ));
        assert!(matches!(
            retitle_group(&store, actor, Uuid::new_v4(), "x".into()),
            Err(SyncError::GroupNotFound(_))
        ));
    }

    #[test]
    fn apply_correlates_and_keeps_mutations() {
        let actor = actor();
        let (store, post_id) = board_with_post(actor);
        let applied = recolor_post(&store, actor, post_id, PostColor::LightPeach)
            .unwrap()
            .apply(&store);

        assert_eq!(applied.messages.len(), 1);
        assert!(applied.messages[0].request_id.is_some());
        assert_eq!(applied.mutations.len(), 1);
        assert_eq!(applied.store.post(post_id).unwrap().color, PostColor::LightPeach);
    }

    #[test]
    fn edit_merges_into_the_current_post() {
        let actor = actor();
        let (store, post_id) = board_with_post(actor);
        let plan = recolor_post(&store, actor, post_id, PostColor::LightPink).unwrap();

        // someone else rewrote the text after the plan was made
        let mut remote = store.post(post_id).unwrap().clone();
        remote.content = "theirs".into();
        let moved_on = store.apply_post_updated(remote, None);

        let post = plan.apply(&moved_on).store.post(post_id).unwrap().clone();
        assert_eq!(post.content, "theirs");
        assert_eq!(post.color, PostColor::LightPink);
    }

    #[test]
    fn replay_skips_rejected_operation() {
        let actor = actor();
        let (store, post_id) = board_with_post(actor);
        let (group_id, _) = store.locate(post_id).unwrap();
        let mut ledger = PendingLedger::new();

        let recolor = recolor_post(&store, actor, post_id, PostColor::LightPeach)
            .unwrap()
            .apply(&store);
        ledger.record(&recolor.messages, recolor.mutations);
        let retitle = retitle_group(&recolor.store, actor, group_id, "Ideas".into())
            .unwrap()
            .apply(&recolor.store);
        ledger.record(&retitle.messages, retitle.mutations);
        assert_eq!(ledger.len(), 2);

        ledger.reject(EventKind::PostUpdate, recolor.messages[0].request_id).unwrap();
        let rebuilt = ledger.replay(&store);
        assert_eq!(rebuilt.post(post_id), store.post(post_id));
        assert_eq!(rebuilt.group(group_id).unwrap().title, "Ideas");
    }

    fn message(kind_cmd: BoardCommand) -> OutboundMessage {
        OutboundMessage::correlated(kind_cmd)
    }

    #[test]
    fn ledger_confirms_by_request_id_or_entity() {
        let post_id = Uuid::new_v4();
        let group_id = Uuid::new_v4();
        let board_id = Uuid::new_v4();
        let update = message(BoardCommand::UpdatePost(UpdatePostParams::new(post_id, board_id)));
        let delete = message(BoardCommand::DeletePostGroup {
            post_group_id: group_id,
            board_id,
        });

        let mut ledger = PendingLedger::new();
        ledger.record(&[update.clone(), delete], Vec::new());
        assert_eq!(ledger.len(), 1);

        assert!(ledger.confirm(EventKind::PostUpdate, Some(post_id), update.request_id));
        assert_eq!(ledger.len(), 1);
        // someone else's event
        assert!(!ledger.confirm(EventKind::PostGroupDelete, Some(Uuid::new_v4()), None));
        assert!(ledger.confirm(EventKind::PostGroupDelete, Some(group_id), None));
        assert!(ledger.is_empty());
    }

    #[test]
    fn ledger_rejects_oldest_of_kind() {
        let board_id = Uuid::new_v4();
        let first = message(BoardCommand::UpdatePost(UpdatePostParams::new(
            Uuid::new_v4(),
            board_id,
        )));
        let second = message(BoardCommand::UpdatePost(UpdatePostParams::new(
            Uuid::new_v4(),
            board_id,
        )));
        let mut ledger = PendingLedger::new();
        ledger.record(&[first.clone()], Vec::new());
        ledger.record(&[second.clone()], Vec::new());

        let op = ledger.reject(EventKind::PostUpdate, None).unwrap();
        assert_eq!(op.kinds().collect::<Vec<_>>(), vec![EventKind::PostUpdate]);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.reject(EventKind::PostCreate, None).is_none());
        assert!(ledger.reject(EventKind::PostUpdate, second.request_id).is_some());
        assert!(ledger.is_empty());
    }
}
