//! Pull synchronization between neighbouring ShareGrid nodes.
//!
//! [`NodeCore`] is the protocol state machine and performs no I/O.
//! [`actor::NodeActor`] runs it on tokio with real timers and one outgoing
//! queue per connected peer.

pub mod actor;
pub mod config;
pub mod core;
pub mod error;
pub mod message;
pub mod reconcile;
pub mod state;

pub use actor::{Clock, NodeActor, NodeHandle, NodeMsg, link, system_clock};
pub use config::SyncConfig;
pub use core::{Input, NodeCore, NodeEvent, Output, messages_for};
pub use error::SyncError;
pub use message::{ChangeMessage, NodeState, Ping, Pong, SyncMessage, WireCell};
pub use reconcile::{Reconciliation, may_receive, may_send, reconcile, respond_to_outdated};
pub use state::{PeerRole, PeerState, Phase, PongMismatch, SyncState};
