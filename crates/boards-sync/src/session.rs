//! The owned state of one open board.
//!
//! `BoardSession` is the single dispatch point: transport events come in
//! through [`BoardSession::handle_transport`], user gestures through the
//! gesture methods, and everything that goes out is queued on the `Outbox`.
//! It is constructed when a board is opened and dropped when it closes.

use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};
use uuid::Uuid;

use boards_types::events::{BoardCommand, BoardEvent, EventKind, OutboundMessage};
use boards_types::models::{Board, PostColor, User};

use crate::config::SyncConfig;
use crate::connection::{ConnectionState, Link, Outbox, TransportEvent};
use crate::dispatcher::{self, Inbound};
use crate::dragdrop::{self, DragPayload, DropTarget};
use crate::error::{DecodeError, SyncError};
use crate::optimistic::{self, Actor, PendingLedger, Plan};
use crate::snapshot::{BoardSnapshot, CredentialStore};
use crate::store::{BoardStore, ConnectedUser};

/// Something the embedding UI should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    StateChanged(ConnectionState),
    /// An inbound event was applied to the store.
    Applied(BoardEvent),
    /// The server refused a request; `message` is meant for the user.
    Rejected { event: EventKind, message: String },
    /// A refused gesture was undone locally.
    RolledBack { event: EventKind },
}

pub struct BoardSession {
    board: Board,
    store: BoardStore,
    /// What the server has accepted: `store` without the pending gestures.
    confirmed: BoardStore,
    link: Link,
    outbox: Outbox,
    credential: Box<dyn CredentialStore + Send>,
    user: Option<User>,
    ledger: PendingLedger,
    color: PostColor,
    grid: Option<i32>,
}

impl BoardSession {
    pub fn new(
        snapshot: BoardSnapshot,
        credential: Box<dyn CredentialStore + Send>,
        outbox: Outbox,
        config: &SyncConfig,
    ) -> Self {
        let color = PostColor::ALL
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(PostColor::LightPink);
        let store = BoardStore::from_snapshot(snapshot.groups);
        Self {
            confirmed: store.clone(),
            store,
            board: snapshot.board,
            link: Link::new(),
            outbox,
            credential,
            user: None,
            ledger: PendingLedger::new(),
            color,
            grid: config.grid(),
        }
    }

    // -- Read access --

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn is_blocked(&self) -> bool {
        self.state().is_blocked()
    }

    pub fn overlay_text(&self) -> Option<&'static str> {
        self.state().overlay_text()
    }

    /// The authenticated user, once the handshake got that far.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn roster(&self) -> &[ConnectedUser] {
        self.store.roster()
    }

    pub fn pending_ops(&self) -> usize {
        self.ledger.len()
    }

    /// Color given to newly created posts.
    pub fn current_color(&self) -> PostColor {
        self.color
    }

    pub fn set_color(&mut self, color: PostColor) {
        self.color = color;
    }

    // -- Transport --

    pub fn handle_transport(&mut self, event: TransportEvent) -> Vec<Notice> {
        let mut notices = Vec::new();
        match event {
            TransportEvent::Connecting => {
                push_state(&mut notices, self.link.connecting());
            }
            TransportEvent::Opened { generation } => {
                if self.link.is_terminal() {
                    debug!("Ignoring channel opened after close");
                } else {
                    self.reset_live_state();
                    push_state(&mut notices, self.link.opened(generation));
                    if !self.authenticate(generation) {
                        notices.extend(self.close());
                    }
                }
            }
            TransportEvent::Message(raw) => self.on_message(&raw, &mut notices),
            TransportEvent::Closed { reason } => {
                info!("Board channel closed: {}", reason);
                self.reset_live_state();
                push_state(&mut notices, self.link.dropped());
            }
        }
        notices
    }

    /// Tear the channel down for good.
    pub fn close(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        push_state(&mut notices, self.link.close_requested());
        self.outbox.shutdown();
        notices
    }

    /// Send the session token. Without one the server can only refuse,
    /// so false is returned and the caller gives up on the channel.
    fn authenticate(&mut self, generation: u64) -> bool {
        let Some(jwt) = self.credential.token() else {
            warn!("No session token available, closing the board channel");
            return false;
        };
        self.outbox.send(
            generation,
            OutboundMessage::new(BoardCommand::Authenticate { jwt }),
        );
        true
    }

    fn reset_live_state(&mut self) {
        self.user = None;
        self.store = self.store.roster_cleared();
        self.ledger.clear();
        self.confirmed = self.store.clone();
    }

    fn on_message(&mut self, raw: &str, notices: &mut Vec<Notice>) {
        match dispatcher::decode(raw) {
            Ok(Inbound::Applied { event, request_id }) => {
                self.on_event(event, request_id, notices)
            }
            Ok(Inbound::Rejected {
                kind,
                message,
                request_id,
            }) => self.on_rejected(kind, message, request_id, notices),
            Err(DecodeError::UnknownEvent(e)) => debug!("Ignoring frame: {}", e),
            Err(e) => warn!("Dropping undecodable frame: {}", e),
        }
    }

    fn on_event(&mut self, event: BoardEvent, request_id: Option<Uuid>, notices: &mut Vec<Notice>) {
        if let BoardEvent::Authenticated { user } = &event {
            let Some(generation) = self.link.generation() else {
                debug!("Authentication result without an open channel");
                return;
            };
            if self.link.state() != ConnectionState::Authenticating {
                debug!("Unexpected authentication result in {}", self.link.state());
                return;
            }
            info!("Authenticated as {} ({})", user.name, user.id);
            self.user = Some(user.clone());
            self.link.authenticated();
            self.outbox.send(
                generation,
                OutboundMessage::new(BoardCommand::ConnectBoard {
                    board_id: self.board.id,
                }),
            );
            return;
        }

        if self
            .ledger
            .confirm(event.kind(), event.entity_id(), request_id)
        {
            debug!("Server confirmed our {}", event.kind());
        }
        let local = self.user.as_ref().map(|u| u.id);
        self.confirmed = dispatcher::reduce(&self.confirmed, &event, local);
        self.store = dispatcher::reduce(&self.store, &event, local);

        if let BoardEvent::BoardConnected { new_user, .. } = &event {
            if Some(new_user.id) == local {
                push_state(notices, self.link.board_joined());
            } else {
                info!("{} joined the board", new_user.name);
            }
        }
        notices.push(Notice::Applied(event));
    }

    fn on_rejected(
        &mut self,
        kind: EventKind,
        message: String,
        request_id: Option<Uuid>,
        notices: &mut Vec<Notice>,
    ) {
        warn!("Server rejected {}: {}", kind, message);
        match kind {
            EventKind::UserAuthenticate => self.outbox.reconnect(),
            _ => {
                if self.ledger.reject(kind, request_id).is_some() {
                    self.store = self.ledger.replay(&self.confirmed);
                    notices.push(Notice::RolledBack { event: kind });
                }
            }
        }
        notices.push(Notice::Rejected {
            event: kind,
            message,
        });
    }

    // -- Gestures --

    /// Double-click on empty canvas. Returns the id of the new post.
    pub fn create_post(&mut self, x: f64, y: f64) -> Result<Uuid, SyncError> {
        let (generation, actor) = self.live()?;
        let plan = optimistic::create_post(&self.store, actor, x, y, self.color, self.grid);
        let post_id = match plan.commands.first() {
            Some(BoardCommand::CreatePost(params)) => params.id,
            _ => Uuid::nil(),
        };
        self.commit(generation, plan);
        Ok(post_id)
    }

    pub fn edit_post(
        &mut self,
        post_id: Uuid,
        content: String,
        height: Option<i32>,
    ) -> Result<(), SyncError> {
        let (generation, actor) = self.live()?;
        let plan = optimistic::edit_post(&self.store, actor, post_id, content, height)?;
        self.commit(generation, plan);
        Ok(())
    }

    pub fn resize_post(&mut self, post_id: Uuid, height: i32) -> Result<(), SyncError> {
        let (generation, actor) = self.live()?;
        let plan = optimistic::resize_post(&self.store, actor, post_id, height)?;
        self.commit(generation, plan);
        Ok(())
    }

    /// Recolor a post; the color also becomes the default for new posts.
    pub fn recolor_post(&mut self, post_id: Uuid, color: PostColor) -> Result<(), SyncError> {
        let (generation, actor) = self.live()?;
        let plan = optimistic::recolor_post(&self.store, actor, post_id, color)?;
        self.color = color;
        self.commit(generation, plan);
        Ok(())
    }

    pub fn retitle_group(&mut self, group_id: Uuid, title: String) -> Result<(), SyncError> {
        let (generation, actor) = self.live()?;
        let plan = optimistic::retitle_group(&self.store, actor, group_id, title)?;
        self.commit(generation, plan);
        Ok(())
    }

    pub fn delete_post(&mut self, post_id: Uuid) -> Result<(), SyncError> {
        let (generation, actor) = self.live()?;
        let plan = optimistic::delete_post(&self.store, actor, post_id)?;
        self.commit(generation, plan);
        Ok(())
    }

    /// Tell others we are typing in `post_id`. Nothing changes locally.
    pub fn focus_post(&mut self, post_id: Uuid) -> Result<(), SyncError> {
        let (generation, actor) = self.live()?;
        if self.store.post(post_id).is_none() {
            return Err(SyncError::PostNotFound(post_id));
        }
        self.outbox.send(
            generation,
            OutboundMessage::new(BoardCommand::FocusPost {
                id: post_id,
                board_id: actor.board_id,
            }),
        );
        Ok(())
    }

    pub fn drop_onto(&mut self, payload: DragPayload, target: DropTarget) -> Result<(), SyncError> {
        let (generation, actor) = self.live()?;
        let plan = dragdrop::plan_drop(&self.store, actor, payload, target, self.grid)?;
        self.commit(generation, plan);
        Ok(())
    }

    fn live(&self) -> Result<(u64, Actor), SyncError> {
        let state = self.link.state();
        let not_connected = || SyncError::NotConnected(state);
        if state != ConnectionState::Connected {
            return Err(not_connected());
        }
        let generation = self.link.generation().ok_or_else(not_connected)?;
        let user = self.user.as_ref().ok_or_else(not_connected)?;
        Ok((
            generation,
            Actor {
                board_id: self.board.id,
                user_id: user.id,
            },
        ))
    }

    fn commit(&mut self, generation: u64, plan: Plan) {
        let applied = plan.apply(&self.store);
        self.store = applied.store;
        self.ledger.record(&applied.messages, applied.mutations);
        for message in applied.messages {
            self.outbox.send(generation, message);
        }
    }
}

fn push_state(notices: &mut Vec<Notice>, changed: Option<ConnectionState>) {
    if let Some(state) = changed {
        notices.push(Notice::StateChanged(state));
    }
}
