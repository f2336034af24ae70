//! Canonical in-memory mirror of a board.
//!
//! The store is persistent: every `apply_*` returns a new `BoardStore` and
//! leaves `self` untouched. Groups are held behind `Arc`s and only the groups
//! an operation actually changes are replaced, so observers can compare
//! `Arc::ptr_eq` on a group (or `BoardStore::same_as` on the whole store) to
//! detect change. A call that changes nothing hands back the same `Arc`s.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use boards_types::models::{Post, PostGroup, PostGroupPatch, User};

use crate::layout;
use crate::ordering;

type GroupMap = HashMap<Uuid, Arc<PostGroup>>;

/// A connected participant. `typing` points at the post they are editing.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedUser {
    pub user: User,
    pub typing: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct BoardStore {
    groups: Arc<GroupMap>,
    roster: Arc<Vec<ConnectedUser>>,
    /// Highest z-index seen; never decreases.
    max_z: i32,
}

impl BoardStore {
    /// Build the store from the initial REST snapshot.
    pub fn from_snapshot(groups: impl IntoIterator<Item = PostGroup>) -> Self {
        let mut map = GroupMap::new();
        let mut max_z = 0;
        for mut group in groups {
            if group.posts.is_empty() {
                warn!("Skipping empty post group {} in snapshot", group.id);
                continue;
            }
            group.posts.sort_by(|a, b| a.post_order.total_cmp(&b.post_order));
            max_z = max_z.max(group.z_index);
            map.insert(group.id, Arc::new(group));
        }
        Self {
            groups: Arc::new(map),
            roster: Arc::default(),
            max_z,
        }
    }

    // -- Selectors --

    /// True when `other` shares every piece of state with `self`.
    pub fn same_as(&self, other: &BoardStore) -> bool {
        Arc::ptr_eq(&self.groups, &other.groups)
            && Arc::ptr_eq(&self.roster, &other.roster)
            && self.max_z == other.max_z
    }

    pub fn group(&self, id: Uuid) -> Option<&PostGroup> {
        self.groups.get(&id).map(Arc::as_ref)
    }

    pub fn group_arc(&self, id: Uuid) -> Option<Arc<PostGroup>> {
        self.groups.get(&id).cloned()
    }

    pub fn groups(&self) -> impl Iterator<Item = &PostGroup> {
        self.groups.values().map(Arc::as_ref)
    }

    /// Groups in paint order, bottom first.
    pub fn groups_by_z(&self) -> Vec<&PostGroup> {
        let mut groups: Vec<&PostGroup> = self.groups().collect();
        groups.sort_by_key(|g| (g.z_index, g.id));
        groups
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn post_count(&self) -> usize {
        self.groups.values().map(|g| g.posts.len()).sum()
    }

    /// Group id and index of a post.
    pub fn locate(&self, post_id: Uuid) -> Option<(Uuid, usize)> {
        locate_in(&self.groups, post_id, None)
    }

    pub fn post(&self, post_id: Uuid) -> Option<&Post> {
        let (group_id, index) = self.locate(post_id)?;
        self.groups.get(&group_id).map(|g| &g.posts[index])
    }

    pub fn max_z(&self) -> i32 {
        self.max_z
    }

    /// Z-index that puts an entity above everything currently on the board.
    pub fn next_z(&self) -> i32 {
        self.max_z + 1
    }

    pub fn canvas_extent(&self) -> (i32, i32) {
        layout::canvas_extent(self.groups())
    }

    pub fn roster(&self) -> &[ConnectedUser] {
        &self.roster
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.roster.iter().any(|c| c.user.id == user_id)
    }

    /// Who is editing `post_id`, if anyone.
    pub fn typing_on(&self, post_id: Uuid) -> Option<&User> {
        self.roster
            .iter()
            .find(|c| c.typing == Some(post_id))
            .map(|c| &c.user)
    }

    // -- Group reducers --

    /// Insert a group, or merge it into the existing one with the same id.
    pub fn apply_group_created(&self, group: PostGroup) -> Self {
        if group.posts.is_empty() {
            warn!("Ignoring post group {} with no posts", group.id);
            return self.clone();
        }
        self.edit(|map| insert_group(map, group))
    }

    /// `post.create`: the post either joins its existing group or arrives
    /// together with a brand new one.
    pub fn apply_post_created(&self, post: Post, mut group: PostGroup) -> Self {
        if self.groups.contains_key(&group.id) {
            return self.apply_post_added(group.id, post);
        }
        group.posts = vec![post];
        self.apply_group_created(group)
    }

    pub fn apply_group_removed(&self, id: Uuid) -> Self {
        if !self.groups.contains_key(&id) {
            debug!("Post group {} already gone", id);
            return self.clone();
        }
        let next = self.edit(|map| map.remove(&id).is_some());
        next.clear_typing_outside()
    }

    /// Merge a partial field set into a group. Move, retitle and
    /// bring-to-front all arrive this way.
    pub fn apply_group_patch(&self, patch: &PostGroupPatch) -> Self {
        let Some(current) = self.groups.get(&patch.id) else {
            warn!("Patch for unknown post group {}", patch.id);
            return self.clone();
        };
        let mut merged = PostGroup::clone(current);
        patch.merge_into(&mut merged);
        if merged == **current {
            return self.clone();
        }
        self.edit(|map| {
            map.insert(patch.id, Arc::new(merged));
            true
        })
    }

    // -- Post reducers --

    /// Insert `post` into `group_id`, keeping the group sorted by order key.
    /// A post already on the board is updated in place instead.
    pub fn apply_post_added(&self, group_id: Uuid, mut post: Post) -> Self {
        post.post_group_id = group_id;
        self.edit(|map| place_post(map, post))
    }

    /// Replace a post with its updated version. When the post now belongs to
    /// a different group it is removed from the old one and inserted into the
    /// new one at the index its order key dictates.
    pub fn apply_post_updated(&self, post: Post, old_post: Option<&Post>) -> Self {
        if let Some(old) = old_post {
            if old.post_group_id != post.post_group_id {
                debug!(
                    "Post {} transferred {} -> {}",
                    post.id, old.post_group_id, post.post_group_id
                );
            }
        }
        let post_id = post.id;
        let next = self.edit(|map| place_post(map, post));
        next.clear_typing(post_id)
    }

    /// Remove a post. A group left without posts is removed with it.
    pub fn apply_post_removed(&self, post: &Post) -> Self {
        let Some(_) = locate_in(&self.groups, post.id, Some(post.post_group_id)) else {
            debug!("Post {} already gone", post.id);
            return self.clone();
        };
        let post_id = post.id;
        let hint = post.post_group_id;
        let next = self.edit(|map| remove_post(map, post_id, Some(hint)).is_some());
        next.clear_typing(post_id)
    }

    /// Move `post` out of wherever it is into the singleton `group`.
    pub fn apply_post_detached(&self, mut post: Post, mut group: PostGroup) -> Self {
        post.post_group_id = group.id;
        group.posts = vec![post];
        self.edit(|map| insert_group(map, group))
    }

    // -- Roster --

    /// Replace the roster with the users a `board.connect` reports.
    pub fn apply_roster(&self, connected: Vec<User>, new_user: User) -> Self {
        let mut roster: Vec<ConnectedUser> = Vec::with_capacity(connected.len() + 1);
        for user in connected.into_iter().chain(std::iter::once(new_user)) {
            if roster.iter().any(|c| c.user.id == user.id) {
                continue;
            }
            let typing = self
                .roster
                .iter()
                .find(|c| c.user.id == user.id)
                .and_then(|c| c.typing);
            roster.push(ConnectedUser { user, typing });
        }
        self.with_roster(roster)
    }

    pub fn apply_user_left(&self, user_id: Uuid) -> Self {
        if !self.is_connected(user_id) {
            return self.clone();
        }
        let roster = self
            .roster
            .iter()
            .filter(|c| c.user.id != user_id)
            .cloned()
            .collect();
        self.with_roster(roster)
    }

    /// Mark `user_id` as typing on `post_id`.
    pub fn apply_focus(&self, user_id: Uuid, post_id: Uuid) -> Self {
        if !self.is_connected(user_id) {
            debug!("Focus from {} who is not in the roster", user_id);
            return self.clone();
        }
        let roster = self
            .roster
            .iter()
            .map(|c| {
                let mut c = c.clone();
                if c.user.id == user_id {
                    c.typing = Some(post_id);
                } else if c.typing == Some(post_id) {
                    c.typing = None;
                }
                c
            })
            .collect();
        self.with_roster(roster)
    }

    pub fn roster_cleared(&self) -> Self {
        if self.roster.is_empty() {
            return self.clone();
        }
        self.with_roster(Vec::new())
    }

    // -- Internals --

    fn edit<F>(&self, f: F) -> Self
    where
        F: FnOnce(&mut GroupMap) -> bool,
    {
        let mut map = GroupMap::clone(&self.groups);
        if !f(&mut map) {
            return self.clone();
        }
        let max_z = map
            .values()
            .map(|g| g.z_index)
            .fold(self.max_z, i32::max);
        Self {
            groups: Arc::new(map),
            roster: self.roster.clone(),
            max_z,
        }
    }

    fn with_roster(&self, roster: Vec<ConnectedUser>) -> Self {
        Self {
            groups: self.groups.clone(),
            roster: Arc::new(roster),
            max_z: self.max_z,
        }
    }

    fn clear_typing(&self, post_id: Uuid) -> Self {
        if self.typing_on(post_id).is_none() {
            return self.clone();
        }
        let roster = self
            .roster
            .iter()
            .map(|c| {
                let mut c = c.clone();
                if c.typing == Some(post_id) {
                    c.typing = None;
                }
                c
            })
            .collect();
        self.with_roster(roster)
    }

    /// Drop typing marks that point at posts no longer on the board.
    fn clear_typing_outside(&self) -> Self {
        let stale = self
            .roster
            .iter()
            .any(|c| c.typing.is_some_and(|p| self.locate(p).is_none()));
        if !stale {
            return self.clone();
        }
        let roster = self
            .roster
            .iter()
            .map(|c| {
                let mut c = c.clone();
                if c.typing.is_some_and(|p| self.locate(p).is_none()) {
                    c.typing = None;
                }
                c
            })
            .collect();
        self.with_roster(roster)
    }
}

fn locate_in(map: &GroupMap, post_id: Uuid, hint: Option<Uuid>) -> Option<(Uuid, usize)> {
    if let Some(index) = hint
        .and_then(|id| map.get(&id))
        .and_then(|g| g.position_of(post_id))
    {
        return hint.map(|id| (id, index));
    }
    map.values()
        .find_map(|g| g.position_of(post_id).map(|index| (g.id, index)))
}

/// Remove a post, dropping its group if that leaves it empty.
fn remove_post(map: &mut GroupMap, post_id: Uuid, hint: Option<Uuid>) -> Option<Post> {
    let (group_id, index) = locate_in(map, post_id, hint)?;
    let group = map.get_mut(&group_id)?;
    let removed = Arc::make_mut(group).posts.remove(index);
    if group.posts.is_empty() {
        debug!("Post group {} emptied, removing", group_id);
        map.remove(&group_id);
    }
    Some(removed)
}

/// Upsert a post into the group named by its `post_group_id`. Returns false
/// when nothing changed.
fn place_post(map: &mut GroupMap, post: Post) -> bool {
    if !map.contains_key(&post.post_group_id) {
        warn!(
            "Post {} targets unknown post group {}, ignoring",
            post.id, post.post_group_id
        );
        return false;
    }

    match locate_in(map, post.id, Some(post.post_group_id)) {
        Some((group_id, index)) if group_id == post.post_group_id => {
            let Some(group) = map.get_mut(&group_id) else {
                return false;
            };
            let current = &group.posts[index];
            if *current == post {
                return false;
            }
            let reorder = current.post_order != post.post_order;
            let posts = &mut Arc::make_mut(group).posts;
            if reorder {
                posts.remove(index);
                let at = ordering::insertion_index(posts, post.post_order);
                posts.insert(at, post);
            } else {
                posts[index] = post;
            }
            true
        }
        Some((group_id, _)) => {
            remove_post(map, post.id, Some(group_id));
            insert_sorted(map, post)
        }
        None => insert_sorted(map, post),
    }
}

fn insert_sorted(map: &mut GroupMap, post: Post) -> bool {
    let Some(group) = map.get_mut(&post.post_group_id) else {
        return false;
    };
    let posts = &mut Arc::make_mut(group).posts;
    let at = ordering::insertion_index(posts, post.post_order);
    posts.insert(at, post);
    true
}

/// Insert or merge a whole group. Its posts are pulled out of any other group
/// they currently sit in.
fn insert_group(map: &mut GroupMap, mut group: PostGroup) -> bool {
    group.posts.sort_by(|a, b| a.post_order.total_cmp(&b.post_order));
    for post in &mut group.posts {
        post.post_group_id = group.id;
    }

    if let Some(existing) = map.get(&group.id) {
        if **existing == group {
            return false;
        }
    }

    for post in &group.posts {
        if let Some((other, _)) = locate_in(map, post.id, None) {
            if other != group.id {
                remove_post(map, post.id, Some(other));
            }
        }
    }

    match map.get(&group.id).cloned() {
        Some(existing) => {
            let mut merged = PostGroup::clone(&existing);
            merged.title = group.title;
            merged.pos_x = group.pos_x;
            merged.pos_y = group.pos_y;
            merged.z_index = group.z_index;
            merged.updated_at = group.updated_at;
            map.insert(group.id, Arc::new(merged));
            for post in group.posts {
                place_post(map, post);
            }
        }
        None => {
            map.insert(group.id, Arc::new(group));
        }
    }
    true
}
