//! Canvas geometry shared by the drag/drop coordinator and the UI.

use boards_types::models::PostGroup;

pub const POST_WIDTH: i32 = 275;
pub const POST_HEIGHT: i32 = 125;
/// Free space kept past the right-most / bottom-most group.
pub const BOARD_SPACE_ADD: i32 = 200;

const LINE_HEIGHT: i32 = 16;
const CHARS_PER_LINE: usize = 34;
/// Padding around the text area inside a post card.
const CONTENT_PADDING: i32 = 61;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub top: f64,
    pub bottom: f64,
}

/// Canvas size needed to show every group plus some room to grow.
pub fn canvas_extent<'a>(groups: impl IntoIterator<Item = &'a PostGroup>) -> (i32, i32) {
    let (max_x, max_y) = groups
        .into_iter()
        .fold((0, 0), |(x, y), g| (x.max(g.pos_x), y.max(g.pos_y)));
    (
        max_x + POST_WIDTH + BOARD_SPACE_ADD,
        max_y + POST_HEIGHT + BOARD_SPACE_ADD,
    )
}

/// Height of a post card for `content`, never below the default card height.
pub fn content_height(content: &str) -> i32 {
    let lines: usize = content
        .split('\n')
        .map(|line| line.chars().count().div_ceil(CHARS_PER_LINE).max(1))
        .sum();
    let lines = i32::try_from(lines).unwrap_or(i32::MAX / LINE_HEIGHT);
    (lines.saturating_mul(LINE_HEIGHT) + CONTENT_PADDING).max(POST_HEIGHT)
}

/// Round a position to the nearest grid cell.
pub fn snap_to_grid(x: i32, y: i32, grid: i32) -> (i32, i32) {
    let snap = |v: i32| ((v as f64 / grid as f64).round() as i32) * grid;
    (snap(x), snap(y))
}

/// Top-left of a dropped item, clamped to the canvas and optionally snapped.
pub fn drop_position(x: f64, y: f64, grid: Option<i32>) -> (i32, i32) {
    let x = x.max(0.0).round() as i32;
    let y = y.max(0.0).round() as i32;
    match grid {
        Some(cell) if cell > 0 => snap_to_grid(x, y, cell),
        _ => (x, y),
    }
}

/// True when the pointer sits in the upper half of `rect`.
pub fn is_hover_above(rect: Rect, pointer_y: f64) -> bool {
    let middle = (rect.bottom - rect.top) / 2.0;
    pointer_y - rect.top < middle
}
