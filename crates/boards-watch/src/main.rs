use anyhow::Context;
use tracing::{info, warn};

use boards_sync::connection;
use boards_sync::snapshot::{SnapshotClient, StaticCredential};
use boards_sync::{BoardSession, Notice, SyncConfig};
use boards_types::events::BoardEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boards_sync=debug,boards_watch=debug".into()),
        )
        .init();

    // Config
    let config = SyncConfig::from_env()?;
    let board_id = config
        .board_id
        .context("BOARDS_BOARD_ID must be set to the board to watch")?;
    // The board channel refuses sessions without a token
    let token = std::env::var("BOARDS_TOKEN").context("BOARDS_TOKEN must be set")?;
    let credential = StaticCredential::new(token);

    // Initial snapshot
    let snapshot = SnapshotClient::new(&config.api_url)
        .fetch(board_id, &credential)
        .await
        .with_context(|| format!("loading board {}", board_id))?;
    info!(
        "Watching {} ({} groups)",
        snapshot.board.name.as_deref().unwrap_or("untitled board"),
        snapshot.groups.len()
    );

    // Session
    let (outbox, mut events) = connection::open(config.ws_url.clone(), config.reconnect_delay);
    let mut session = BoardSession::new(snapshot, Box::new(credential), outbox, &config);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                for notice in session.handle_transport(event) {
                    report(&session, notice);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                for notice in session.close() {
                    report(&session, notice);
                }
                // Drain until the transport confirms the close.
                while let Some(event) = events.recv().await {
                    for notice in session.handle_transport(event) {
                        report(&session, notice);
                    }
                }
                break;
            }
        }
    }

    Ok(())
}

fn report(session: &BoardSession, notice: Notice) {
    match notice {
        Notice::StateChanged(state) => match state.overlay_text() {
            Some(text) => info!("[{}] {}", state, text),
            None => info!(
                "[{}] {} users online, {} posts in {} groups",
                state,
                session.roster().len(),
                session.store().post_count(),
                session.store().group_count()
            ),
        },
        Notice::Applied(event) => describe(session, &event),
        Notice::Rejected { event, message } => warn!("{} refused: {}", event, message),
        Notice::RolledBack { event } => warn!("Undid local {}", event),
    }
}

fn describe(session: &BoardSession, event: &BoardEvent) {
    let board = session.board();
    let author = |id| board.member_name(id).unwrap_or("someone");
    match event {
        BoardEvent::BoardConnected { new_user, .. } => {
            info!("{} is online ({} total)", new_user.name, session.roster().len())
        }
        BoardEvent::BoardDisconnected { user_id } => info!("{} left", author(*user_id)),
        BoardEvent::PostCreated { post, .. } => {
            info!("{} added a {} post", author(post.user_id), post.color.label())
        }
        BoardEvent::PostUpdated { updated_post, .. } => info!(
            "Post {} changed ({})",
            updated_post.id,
            updated_post.color.label()
        ),
        BoardEvent::PostDeleted { post } => info!("Post {} deleted", post.id),
        BoardEvent::PostDetached { post, .. } => info!("Post {} moved to its own group", post.id),
        BoardEvent::PostFocused { post, user } => info!("{} is typing in {}", user.name, post.id),
        BoardEvent::PostGroupUpdated(patch) => info!("Group {} updated", patch.id),
        BoardEvent::PostGroupDeleted { id } => info!("Group {} deleted", id),
        BoardEvent::Authenticated { .. } => {}
    }
}
