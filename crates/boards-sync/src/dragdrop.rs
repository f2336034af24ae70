//! Drop resolution: turns a payload dropped on a target into a [`Plan`].
//!
//! Every accepted drop restacks: the dropped entity (or the group it lands
//! in) gets `max z + 1`, and that z-index travels with the outbound command.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use boards_types::events::{
    BoardCommand, DetachPostParams, UpdatePostGroupParams, UpdatePostParams,
};
use boards_types::models::{Post, PostGroup, PostGroupPatch};

use crate::error::DropError;
use crate::layout;
use crate::optimistic::{Actor, Mutation, Plan};
use crate::ordering;
use crate::store::BoardStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPayload {
    /// A whole group, dragged by its chrome. Singleton groups always drag
    /// this way.
    Group { group_id: Uuid },
    /// One post pulled out of a group that has siblings.
    Post { post_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DropTarget {
    /// Free placement; (x, y) is where the top-left corner lands.
    Canvas { x: f64, y: f64 },
    Post { post_id: Uuid, hover_above: bool },
}

pub fn plan_drop(
    store: &BoardStore,
    actor: Actor,
    payload: DragPayload,
    target: DropTarget,
    grid: Option<i32>,
) -> Result<Plan, DropError> {
    debug!("Resolving drop of {:?} onto {:?}", payload, target);
    match (payload, target) {
        (DragPayload::Group { group_id }, DropTarget::Canvas { x, y }) => {
            move_group(store, actor, group_id, x, y, grid)
        }
        (DragPayload::Group { group_id }, DropTarget::Post { post_id, hover_above }) => {
            merge_singleton(store, actor, group_id, post_id, hover_above)
        }
        (DragPayload::Post { post_id }, DropTarget::Canvas { x, y }) => {
            detach_post(store, actor, post_id, x, y, grid)
        }
        (
            DragPayload::Post { post_id },
            DropTarget::Post {
                post_id: target_id,
                hover_above,
            },
        ) => insert_post(store, actor, post_id, target_id, hover_above),
    }
}

fn move_group(
    store: &BoardStore,
    actor: Actor,
    group_id: Uuid,
    x: f64,
    y: f64,
    grid: Option<i32>,
) -> Result<Plan, DropError> {
    if store.group(group_id).is_none() {
        return Err(DropError::UnknownSource(group_id));
    }
    let (pos_x, pos_y) = layout::drop_position(x, y, grid);
    let patch = PostGroupPatch {
        pos_x: Some(pos_x),
        pos_y: Some(pos_y),
        z_index: Some(store.next_z()),
        ..PostGroupPatch::new(group_id)
    };
    Ok(Plan::new()
        .mutate(Mutation::PatchGroup(patch.clone()))
        .send(update_group(actor, patch)))
}

/// A singleton group dropped onto a post: its post joins the target's group
/// and the emptied source group goes away.
fn merge_singleton(
    store: &BoardStore,
    actor: Actor,
    group_id: Uuid,
    target_id: Uuid,
    hover_above: bool,
) -> Result<Plan, DropError> {
    let source = store.group(group_id).ok_or(DropError::UnknownSource(group_id))?;
    let (target_group, target_index) = store
        .locate(target_id)
        .ok_or(DropError::UnknownTarget(target_id))?;
    if target_group == group_id {
        return Err(DropError::OntoItself);
    }
    if !source.is_singleton() {
        return Err(DropError::GroupMerge);
    }
    let Some(post) = source.posts.first() else {
        return Err(DropError::UnknownSource(group_id));
    };
    let destination = store
        .group(target_group)
        .ok_or(DropError::UnknownTarget(target_id))?;
    let key = ordering::key_for_drop(&destination.posts, target_index, hover_above)
        .ok_or(DropError::UnknownTarget(target_id))?;

    let moved = transfer(actor, post.id, target_group, key);
    let front = bring_to_front(store, target_group);
    Ok(Plan::new()
        .mutate(Mutation::EditPost(moved.clone()))
        .mutate(Mutation::RemoveGroup(group_id))
        .mutate(Mutation::PatchGroup(front.clone()))
        .send(BoardCommand::UpdatePost(moved))
        .send(BoardCommand::DeletePostGroup {
            post_group_id: group_id,
            board_id: actor.board_id,
        })
        .send(update_group(actor, front)))
}

/// A post dropped on empty canvas leaves its group for a new singleton.
fn detach_post(
    store: &BoardStore,
    actor: Actor,
    post_id: Uuid,
    x: f64,
    y: f64,
    grid: Option<i32>,
) -> Result<Plan, DropError> {
    let (source_id, _) = store.locate(post_id).ok_or(DropError::UnknownSource(post_id))?;
    let source = store
        .group(source_id)
        .ok_or(DropError::UnknownSource(post_id))?;
    if source.is_singleton() {
        return Err(DropError::NotDetachable);
    }

    let now = Utc::now();
    let (pos_x, pos_y) = layout::drop_position(x, y, grid);
    let z_index = store.next_z();
    let group_id = Uuid::new_v4();
    let group = PostGroup {
        id: group_id,
        board_id: actor.board_id,
        title: String::new(),
        pos_x,
        pos_y,
        z_index,
        posts: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    Ok(Plan::new()
        .mutate(Mutation::DetachPost { post_id, group })
        .send(BoardCommand::DetachPost(DetachPostParams {
            post_id,
            board_id: actor.board_id,
            post_group_id: group_id,
            pos_x,
            pos_y,
            z_index,
        })))
}

/// A post dropped next to another post, in the same group or another one.
fn insert_post(
    store: &BoardStore,
    actor: Actor,
    post_id: Uuid,
    target_id: Uuid,
    hover_above: bool,
) -> Result<Plan, DropError> {
    if post_id == target_id {
        return Err(DropError::OntoItself);
    }
    let (source_id, _) = store.locate(post_id).ok_or(DropError::UnknownSource(post_id))?;
    let source = store
        .group(source_id)
        .ok_or(DropError::UnknownSource(post_id))?;
    if source.is_singleton() {
        return Err(DropError::NotDetachable);
    }
    let (target_group, _) = store
        .locate(target_id)
        .ok_or(DropError::UnknownTarget(target_id))?;
    let destination = store
        .group(target_group)
        .ok_or(DropError::UnknownTarget(target_id))?;

    // The dragged post must not be its own neighbour.
    let siblings: Vec<Post> = destination
        .posts
        .iter()
        .filter(|p| p.id != post_id)
        .cloned()
        .collect();
    let target_index = siblings
        .iter()
        .position(|p| p.id == target_id)
        .ok_or(DropError::UnknownTarget(target_id))?;
    let key = ordering::key_for_drop(&siblings, target_index, hover_above)
        .ok_or(DropError::UnknownTarget(target_id))?;

    let moved = transfer(actor, post_id, target_group, key);
    let front = bring_to_front(store, target_group);
    Ok(Plan::new()
        .mutate(Mutation::EditPost(moved.clone()))
        .mutate(Mutation::PatchGroup(front.clone()))
        .send(BoardCommand::UpdatePost(moved))
        .send(update_group(actor, front)))
}

/// Partial post update moving `post_id` into `group_id` at `key`.
fn transfer(actor: Actor, post_id: Uuid, group_id: Uuid, key: f64) -> UpdatePostParams {
    UpdatePostParams {
        post_group_id: Some(group_id),
        post_order: Some(key),
        ..UpdatePostParams::new(post_id, actor.board_id)
    }
}

fn bring_to_front(store: &BoardStore, group_id: Uuid) -> PostGroupPatch {
    PostGroupPatch {
        z_index: Some(store.next_z()),
        ..PostGroupPatch::new(group_id)
    }
}

fn update_group(actor: Actor, patch: PostGroupPatch) -> BoardCommand {
    BoardCommand::UpdatePostGroup(UpdatePostGroupParams {
        board_id: actor.board_id,
        patch,
    })
}
