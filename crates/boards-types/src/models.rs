use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_guest: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MembershipRole {
    Member,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub role: MembershipRole,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A board member: the user record with its membership flattened beside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(flatten)]
    pub user: User,
    pub membership: Membership,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub user_id: Uuid,
    #[serde(default)]
    pub members: Vec<Member>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    /// Display name of a member, used to label post authors.
    pub fn member_name(&self, user_id: Uuid) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.user.id == user_id)
            .map(|m| m.user.name.as_str())
    }

    pub fn is_owner(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}

/// The fixed post palette. On the wire each color is its hex code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostColor {
    #[serde(rename = "#F5E6E8", alias = "#f5e6e8")]
    LightPink,
    #[serde(rename = "#E7ECD9", alias = "#e7ecd9")]
    LightGreen,
    #[serde(rename = "#E5E1F1", alias = "#e5e1f1")]
    LightLavender,
    #[serde(rename = "#FCE6C9", alias = "#fce6c9")]
    LightPeach,
    #[serde(rename = "#D8E2DC", alias = "#d8e2dc")]
    LightAqua,
}

impl PostColor {
    pub const ALL: [PostColor; 5] = [
        PostColor::LightPink,
        PostColor::LightGreen,
        PostColor::LightLavender,
        PostColor::LightPeach,
        PostColor::LightAqua,
    ];

    pub fn hex(self) -> &'static str {
        match self {
            Self::LightPink => "#F5E6E8",
            Self::LightGreen => "#E7ECD9",
            Self::LightLavender => "#E5E1F1",
            Self::LightPeach => "#FCE6C9",
            Self::LightAqua => "#D8E2DC",
        }
    }

    /// Human-readable name, e.g. "light pink".
    pub fn label(self) -> &'static str {
        match self {
            Self::LightPink => "light pink",
            Self::LightGreen => "light green",
            Self::LightLavender => "light lavender",
            Self::LightPeach => "light peach",
            Self::LightAqua => "light aqua",
        }
    }
}

impl fmt::Display for PostColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hex())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub board_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub color: PostColor,
    pub height: i32,
    pub post_group_id: Uuid,
    /// Fractional order key; unique and ascending within a group.
    pub post_order: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A positioned cluster of posts. Always holds at least one post, sorted by
/// `post_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostGroup {
    pub id: Uuid,
    pub board_id: Uuid,
    #[serde(default)]
    pub title: String,
    pub pos_x: i32,
    pub pos_y: i32,
    pub z_index: i32,
    #[serde(default)]
    pub posts: Vec<Post>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostGroup {
    /// Singleton groups render without a title bar and drag as a single post.
    pub fn is_singleton(&self) -> bool {
        self.posts.len() == 1
    }

    pub fn position_of(&self, post_id: Uuid) -> Option<usize> {
        self.posts.iter().position(|p| p.id == post_id)
    }
}

/// Partial post group update. Fields left `None` are untouched on merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostGroupPatch {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_y: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PostGroupPatch {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Merge the set fields into `group`, leaving the rest alone.
    pub fn merge_into(&self, group: &mut PostGroup) {
        if let Some(title) = &self.title {
            group.title = title.clone();
        }
        if let Some(x) = self.pos_x {
            group.pos_x = x;
        }
        if let Some(y) = self.pos_y {
            group.pos_y = y;
        }
        if let Some(z) = self.z_index {
            group.z_index = z;
        }
        if let Some(at) = self.updated_at {
            group.updated_at = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_uses_hex_on_the_wire() {
        let json = serde_json::to_string(&PostColor::LightPeach).unwrap();
        assert_eq!(json, "\"#FCE6C9\"");

        let parsed: PostColor = serde_json::from_str("\"#d8e2dc\"").unwrap();
        assert_eq!(parsed, PostColor::LightAqua);
    }

    #[test]
    fn unknown_color_is_rejected() {
        let parsed = serde_json::from_str::<PostColor>("\"#000000\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn every_color_has_a_distinct_label() {
        let labels: std::collections::HashSet<_> =
            PostColor::ALL.iter().map(|c| c.label()).collect();
        assert_eq!(labels.len(), PostColor::ALL.len());
        assert_eq!(PostColor::LightPink.label(), "light pink");
    }

    #[test]
    fn member_flattens_user_fields() {
        let json = serde_json::json!({
            "id": "5b0c3b5e-2f43-4a4c-a0c4-0d7c4e1f9a11",
            "name": "Ada",
            "email": "ada@example.com",
            "is_guest": false,
            "membership": { "role": "ADMIN" }
        });
        let member: Member = serde_json::from_value(json).unwrap();
        assert_eq!(member.user.name, "Ada");
        assert_eq!(member.membership.role, MembershipRole::Admin);
        assert!(!member.user.is_verified);
    }

    #[test]
    fn patch_merges_only_set_fields() {
        let now = Utc::now();
        let mut group = PostGroup {
            id: Uuid::new_v4(),
            board_id: Uuid::new_v4(),
            title: "Ideas".into(),
            pos_x: 10,
            pos_y: 20,
            z_index: 3,
            posts: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let patch = PostGroupPatch {
            pos_x: Some(40),
            z_index: Some(9),
            ..PostGroupPatch::new(group.id)
        };
        patch.merge_into(&mut group);

        assert_eq!(group.title, "Ideas");
        assert_eq!((group.pos_x, group.pos_y, group.z_index), (40, 20, 9));
    }
}
