use serde::{Deserialize, Serialize};

use crate::models::{Board, PostGroup};

// -- REST snapshot --

/// Body of `GET /boards/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardResponse {
    pub result: Board,
}

/// Body of `GET /post-groups/?boardID={id}`. Posts inside each group arrive
/// sorted by order key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPostGroupsResponse {
    pub result: Vec<PostGroup>,
}

/// Error body returned by the REST API on a non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub status: u16,
    pub message: String,
}
