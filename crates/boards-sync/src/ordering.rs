//! Fractional order keys for posts within a group.
//!
//! A key dropped next to a target post is placed strictly between the target
//! and its neighbour on the hovered side, so the rest of the sequence never
//! needs renumbering. Repeated inserts at one spot halve the gap each time;
//! keys are never rebalanced.

use boards_types::models::Post;

/// Key given to the first post of a new group.
pub const FIRST_KEY: f64 = 1.0;

/// Order key for a post dropped onto `posts[target]`, above it when
/// `hover_above`, below it otherwise. `posts` must be sorted and must not
/// contain the dragged post itself.
pub fn key_for_drop(posts: &[Post], target: usize, hover_above: bool) -> Option<f64> {
    let last = posts.len().checked_sub(1)?;
    let key = posts.get(target)?.post_order;

    let new_key = if target == 0 && hover_above {
        before_first(key)
    } else if target == last && !hover_above {
        key + 1.0
    } else if hover_above {
        midpoint(posts[target - 1].post_order, key)
    } else {
        midpoint(key, posts[target + 1].post_order)
    };
    Some(new_key)
}

/// Index at which a post with `key` belongs: before the first post whose key
/// is greater, or at the end.
pub fn insertion_index(posts: &[Post], key: f64) -> usize {
    posts
        .iter()
        .position(|p| p.post_order > key)
        .unwrap_or(posts.len())
}

/// Strictly ascending with no duplicate keys.
pub fn is_strictly_ordered(posts: &[Post]) -> bool {
    posts.windows(2).all(|w| w[0].post_order < w[1].post_order)
}

fn before_first(key: f64) -> f64 {
    if key > 0.0 { key / 2.0 } else { key - 1.0 }
}

fn midpoint(a: f64, b: f64) -> f64 {
    (a + b) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use boards_types::models::PostColor;

    fn posts(keys: &[f64]) -> Vec<Post> {
        let group = Uuid::new_v4();
        let now = Utc::now();
        keys.iter()
            .map(|&k| Post {
                id: Uuid::new_v4(),
                board_id: Uuid::nil(),
                user_id: Uuid::nil(),
                content: String::new(),
                color: PostColor::LightPink,
                height: 125,
                post_group_id: group,
                post_order: k,
                created_at: now,
                updated_at: now,
            })
            .collect()
    }

    #[test]
    fn above_first_halves() {
        let p = posts(&[1.0, 2.0]);
        assert_eq!(key_for_drop(&p, 0, true), Some(0.5));
    }

    #[test]
    fn below_last_adds_one() {
        let p = posts(&[1.0, 2.0]);
        assert_eq!(key_for_drop(&p, 1, false), Some(3.0));
    }

    #[test]
    fn between_neighbours_takes_midpoint() {
        let p = posts(&[1.0, 2.0, 4.0]);
        assert_eq!(key_for_drop(&p, 1, true), Some(1.5));
        assert_eq!(key_for_drop(&p, 1, false), Some(3.0));
        assert_eq!(key_for_drop(&p, 0, false), Some(1.5));
        assert_eq!(key_for_drop(&p, 2, true), Some(3.0));
    }

    #[test]
    fn singleton_target() {
        let p = posts(&[1.0]);
        assert_eq!(key_for_drop(&p, 0, true), Some(0.5));
        assert_eq!(key_for_drop(&p, 0, false), Some(2.0));
    }

    #[test]
    fn out_of_range_target() {
        assert_eq!(key_for_drop(&[], 0, true), None);
        assert_eq!(key_for_drop(&posts(&[1.0]), 1, true), None);
    }

    #[test]
    fn non_positive_first_key_still_goes_below() {
        let p = posts(&[0.0, 1.0]);
        let key = key_for_drop(&p, 0, true).unwrap();
        assert!(key < 0.0);
    }

    #[test]
    fn repeated_inserts_stay_strictly_between() {
        let mut p = posts(&[1.0, 2.0]);
        for _ in 0..30 {
            let key = key_for_drop(&p, 1, true).unwrap();
            assert!(p[0].post_order < key && key < p[1].post_order);
            let mut extra = posts(&[key]);
            let at = insertion_index(&p, key);
            p.insert(at, extra.remove(0));
            assert!(is_strictly_ordered(&p));
        }
    }

    #[test]
    fn insertion_index_finds_first_greater() {
        let p = posts(&[1.0, 2.0, 3.0]);
        assert_eq!(insertion_index(&p, 0.5), 0);
        assert_eq!(insertion_index(&p, 2.5), 2);
        assert_eq!(insertion_index(&p, 9.0), 3);
    }
}
