//! Initial board load over the REST API.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use boards_types::api::{ApiErrorResponse, BoardResponse, ListPostGroupsResponse};
use boards_types::models::{Board, PostGroup};

use crate::error::SnapshotError;

/// Source of the session token sent with `user.authenticate` and REST calls.
pub trait CredentialStore {
    fn token(&self) -> Option<String>;
}

/// A token fixed at construction, e.g. read from the environment.
#[derive(Debug, Clone)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl CredentialStore for StaticCredential {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Everything the engine starts from.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub board: Board,
    pub groups: Vec<PostGroup>,
}

pub struct SnapshotClient {
    api_url: String,
    client: Client,
}

impl SnapshotClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub async fn fetch(
        &self,
        board_id: Uuid,
        credential: &dyn CredentialStore,
    ) -> Result<BoardSnapshot, SnapshotError> {
        let token = credential.token();

        let board: BoardResponse = self
            .get(&format!("{}/boards/{}", self.api_url, board_id), token.as_deref())
            .await?;
        let groups: ListPostGroupsResponse = self
            .get(
                &format!("{}/post-groups/?boardID={}", self.api_url, board_id),
                token.as_deref(),
            )
            .await?;

        info!(
            "Loaded board {} with {} post groups",
            board_id,
            groups.result.len()
        );
        Ok(BoardSnapshot {
            board: board.result,
            groups: groups.result,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        token: Option<&str>,
    ) -> Result<T, SnapshotError> {
        debug!("GET {}", url);
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Ok(check(response).await?.json::<T>().await?)
    }
}

async fn check(response: Response) -> Result<Response, SnapshotError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|e| e.message)
        .unwrap_or_else(|_| {
            if body.is_empty() {
                status.to_string()
            } else {
                body
            }
        });
    Err(SnapshotError::Api {
        status: status.as_u16(),
        message,
    })
}
