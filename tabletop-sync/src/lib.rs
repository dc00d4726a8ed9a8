//! # tabletop-sync — client-side scene synchronization for Tabletop
//!
//! Keeps a client's in-memory scene (walls, lights, tokens, blueprint
//! folders) converged with the authoritative remote state, across
//! latency, reconnects and concurrent edits by other clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  request/ack   ┌───────────────┐
//! │SocketClient│ ◄────────────► │   authority   │
//! │ (WebSocket)│ ◄───────────── │   (remote)    │
//! └─────┬──────┘     pushes     └───────────────┘
//!       │ event channel (one pump task)
//!       ▼
//! ┌────────────┐    ┌──────────────────────────────┐
//! │ SyncEngine │───►│ SessionRunner · WallManager  │
//! │  (routing) │    │ LightManager · TokenManager  │
//! └─────┬──────┘    │ BlueprintManager (PathIndex) │
//!       │           └──────────────┬───────────────┘
//!       ▼                          ▼
//! ┌─────────────────────────────────────────────────┐
//! │ EventBus — typed, synchronous, scoped listeners │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! Mutation discipline: a manager's cache changes only inside its own
//! request continuation (after ack success) or push handler, and both
//! paths share the same `apply_*` functions — confirmed-local and
//! confirmed-remote edits cannot diverge. The engine never stores
//! speculative state; optimistic rendering and its rollback belong to
//! the presentation layer, driven by the domain events published here.
//!
//! ## Modules
//!
//! - [`bus`] — typed publish/subscribe dispatcher with RAII subscriptions
//! - [`protocol`] — bincode wire envelope (requests, acks, pushes)
//! - [`client`] — WebSocket transport, request/ack correlation, reconnect
//! - [`session`] — session state machine (scene id + sync flag)
//! - [`managers`] — per-entity-kind caches and reconciliation
//! - [`messages`] — transient user-visible message queue
//! - [`engine`] — wiring root and push-routing pump

pub mod bus;
pub mod client;
pub mod engine;
pub mod managers;
pub mod messages;
pub mod protocol;
pub mod session;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use bus::{EventBus, Subscription};
pub use client::{
    Authority, ClientConfig, ClientEvent, ConnectionState, RequestError, SocketClient,
};
pub use engine::{ConnectionClosed, ConnectionOpened, SyncEngine};
pub use managers::{BlueprintManager, LightManager, TokenManager, WallManager};
pub use messages::{MessageQueue, MessageQueueConfig, UiMessage};
pub use protocol::{Ack, AckBody, Frame, ProtocolError, RequestBody, ServerPush};
pub use session::{
    ClientInfo, GridChanged, LandingPageChanged, SceneLoaded, SessionRunner, SessionState,
    StateChanged, UserConnected, UserDisconnected,
};
