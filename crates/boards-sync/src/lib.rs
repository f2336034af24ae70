/// Boards Sync: real-time board state engine.
///
/// Keeps a local mirror of a shared board in step with the server over one
/// websocket:
/// - connection lifecycle with authenticate -> join handshake and reconnect
/// - typed inbound events routed to idempotent store reducers
/// - optimistic gestures with rollback when the server refuses them
/// - drag/drop resolution with fractional order keys

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod dragdrop;
pub mod error;
pub mod layout;
pub mod optimistic;
pub mod ordering;
pub mod session;
pub mod snapshot;
pub mod store;

// Re-export key types for convenience.
pub use config::SyncConfig;
pub use connection::{ConnectionState, Outbox, Outgoing, TransportEvent, open};
pub use dragdrop::{DragPayload, DropTarget};
pub use error::{ConfigError, DecodeError, DropError, SnapshotError, SyncError};
pub use session::{BoardSession, Notice};
pub use snapshot::{BoardSnapshot, CredentialStore, SnapshotClient, StaticCredential};
pub use store::{BoardStore, ConnectedUser};
