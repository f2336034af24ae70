//! REST snapshot client against a mock API.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use boards_sync::{BoardStore, SnapshotClient, SnapshotError, StaticCredential};

fn board_json(id: Uuid, owner: Uuid) -> serde_json::Value {
    json!({
        "id": id,
        "name": "Sprint retro",
        "description": "what went well",
        "user_id": owner,
        "members": [{
            "id": owner,
            "name": "Ada",
            "email": "ada@example.com",
            "is_guest": false,
            "is_verified": true,
            "membership": { "role": "ADMIN", "added_at": Utc::now() }
        }],
        "created_at": Utc::now(),
        "updated_at": Utc::now(),
    })
}

fn group_json(board_id: Uuid, keys: &[f64], z: i32) -> serde_json::Value {
    let id = Uuid::new_v4();
    let posts: Vec<_> = keys
        .iter()
        .map(|key| {
            json!({
                "id": Uuid::new_v4(),
                "board_id": board_id,
                "user_id": Uuid::new_v4(),
                "content": "note",
                "color": "#E5E1F1",
                "height": 125,
                "post_group_id": id,
                "post_order": key,
                "created_at": Utc::now(),
                "updated_at": Utc::now(),
            })
        })
        .collect();
    json!({
        "id": id,
        "board_id": board_id,
        "title": "",
        "pos_x": 10,
        "pos_y": 20,
        "z_index": z,
        "posts": posts,
        "created_at": Utc::now(),
        "updated_at": Utc::now(),
    })
}

#[tokio::test]
async fn fetches_board_and_groups_with_bearer_token() {
    let server = MockServer::start().await;
    let board_id = Uuid::new_v4();
    let owner = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/boards/{}", board_id)))
        .and(header("authorization", "Bearer secret"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "result": board_json(board_id, owner) })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/post-groups/"))
        .and(query_param("boardID", board_id.to_string()))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [group_json(board_id, &[1.0, 2.0], 3), group_json(board_id, &[1.0], 7)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = SnapshotClient::new(format!("{}/", server.uri()))
        .fetch(board_id, &StaticCredential::new("secret"))
        .await
        .unwrap();

    assert_eq!(snapshot.board.id, board_id);
    assert_eq!(snapshot.board.member_name(owner), Some("Ada"));
    assert!(snapshot.board.is_owner(owner));
    assert_eq!(snapshot.groups.len(), 2);

    let store = BoardStore::from_snapshot(snapshot.groups);
    assert_eq!(store.post_count(), 3);
    assert_eq!(store.max_z(), 7);
}

#[tokio::test]
async fn api_error_carries_status_and_message() {
    let server = MockServer::start().await;
    let board_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/boards/{}", board_id)))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "status": 403,
            "message": "not a member of this board"
        })))
        .mount(&server)
        .await;

    let err = SnapshotClient::new(server.uri())
        .fetch(board_id, &StaticCredential::anonymous())
        .await
        .unwrap_err();

    match err {
        SnapshotError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "not a member of this board");
        }
        other => panic!("expected an API error, got {}", other),
    }
}
