//! Real websocket round trips against a loopback server.

use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use boards_sync::{
    BoardSession, BoardSnapshot, ConnectionState, StaticCredential, SyncConfig, SyncError,
    TransportEvent, connection,
};
use boards_types::models::{Board, User};

const WAIT: Duration = Duration::from_secs(5);

fn user(name: &str) -> User {
    User {
        id: Uuid::new_v4(),
        name: name.into(),
        email: None,
        is_guest: false,
        is_verified: true,
        created_at: None,
        updated_at: None,
    }
}

fn board(owner: Uuid) -> Board {
    let now = Utc::now();
    Board {
        id: Uuid::new_v4(),
        name: Some("Loopback".into()),
        description: None,
        user_id: owner,
        members: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("client went away: {:?}", other),
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Server half of the authenticate -> join handshake.
async fn serve_handshake(
    ws: &mut WebSocketStream<TcpStream>,
    board_id: Uuid,
    me: &User,
    others: &[User],
) {
    let auth = next_json(ws).await;
    assert_eq!(auth["event"], "user.authenticate");
    assert_eq!(auth["params"]["jwt"], "secret");
    send_json(
        ws,
        json!({ "event": "user.authenticate", "success": true, "result": { "user": me } }),
    )
    .await;

    let join = next_json(ws).await;
    assert_eq!(join["event"], "board.connect");
    assert_eq!(join["params"]["board_id"], board_id.to_string());
    send_json(
        ws,
        json!({
            "event": "board.connect",
            "success": true,
            "result": { "board_id": board_id, "connected_users": others, "new_user": me },
        }),
    )
    .await;
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

/// Feed transport events into the session until it reaches `want`.
async fn wait_for(
    session: &mut BoardSession,
    events: &mut UnboundedReceiver<TransportEvent>,
    want: ConnectionState,
) {
    tokio::time::timeout(WAIT, async {
        while session.state() != want {
            let event = events.recv().await.expect("transport stopped");
            session.handle_transport(event);
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached {}", want));
}

#[tokio::test]
async fn handshake_and_reconnect_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let me = user("ada");
    let other = user("bob");
    let board = board(me.id);
    let board_id = board.id;

    let server = {
        let me = me.clone();
        tokio::spawn(async move {
            // First socket: full handshake, then the server drops it.
            let mut ws = accept(&listener).await;
            serve_handshake(&mut ws, board_id, &me, &[other]).await;
            let _ = ws.close(None).await;
            drop(ws);

            // Second socket: handshake again, then wait for the client to close.
            let mut ws = accept(&listener).await;
            serve_handshake(&mut ws, board_id, &me, &[]).await;
            while let Some(Ok(frame)) = ws.next().await {
                if frame.is_close() {
                    break;
                }
            }
        })
    };

    let (outbox, mut events) = connection::open(url, Duration::from_millis(50));
    let mut session = BoardSession::new(
        BoardSnapshot {
            board,
            groups: Vec::new(),
        },
        Box::new(StaticCredential::new("secret")),
        outbox,
        &SyncConfig::default(),
    );
    assert!(session.is_blocked());

    wait_for(&mut session, &mut events, ConnectionState::Connected).await;
    assert_eq!(session.roster().len(), 2);
    assert_eq!(session.user().map(|u| u.id), Some(me.id));

    wait_for(&mut session, &mut events, ConnectionState::Closed).await;
    assert!(session.is_blocked());
    assert_eq!(session.overlay_text(), Some("Not connected, try refreshing"));
    assert!(session.roster().is_empty());
    assert!(matches!(
        session.create_post(0.0, 0.0),
        Err(SyncError::NotConnected(ConnectionState::Closed))
    ));

    wait_for(&mut session, &mut events, ConnectionState::Connected).await;
    let roster: Vec<Uuid> = session.roster().iter().map(|c| c.user.id).collect();
    assert_eq!(roster, vec![me.id]);

    session.close();
    tokio::time::timeout(WAIT, async {
        while let Some(event) = events.recv().await {
            session.handle_transport(event);
        }
    })
    .await
    .unwrap();
    assert_eq!(session.state(), ConnectionState::Closed);

    server.await.unwrap();
}

#[tokio::test]
async fn rejected_authentication_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let me = user("ada");
    let board = board(me.id);
    let board_id = board.id;

    let server = {
        let me = me.clone();
        tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            let auth = next_json(&mut ws).await;
            assert_eq!(auth["event"], "user.authenticate");
            send_json(
                &mut ws,
                json!({
                    "event": "user.authenticate",
                    "success": false,
                    "error_message": "token expired",
                }),
            )
            .await;
            // The client gives up on this socket.
            while let Some(Ok(frame)) = ws.next().await {
                if frame.is_close() {
                    break;
                }
            }

            let mut ws = accept(&listener).await;
            serve_handshake(&mut ws, board_id, &me, &[]).await;
            while let Some(Ok(frame)) = ws.next().await {
                if frame.is_close() {
                    break;
                }
            }
        })
    };

    let (outbox, mut events) = connection::open(url, Duration::from_millis(20));
    let mut session = BoardSession::new(
        BoardSnapshot {
            board,
            groups: Vec::new(),
        },
        Box::new(StaticCredential::new("secret")),
        outbox,
        &SyncConfig::default(),
    );

    wait_for(&mut session, &mut events, ConnectionState::Connected).await;
    assert_eq!(session.user().map(|u| u.id), Some(me.id));

    session.close();
    while let Some(event) = events.recv().await {
        session.handle_transport(event);
    }
    server.await.unwrap();
}
