//! Netqueue node engine
//!
//! Every participant in a netqueue tree is built from the pieces in this
//! crate:
//!
//! - [`QueueClient`]: one link to a parent. Receives jobs, sends responses.
//! - [`QueueServer`]: a listening socket plus any number of child links. Fans
//!   work out through a [`DispatchPolicy`] and aggregates responses.
//! - [`DispatchNode`]: a client and a server glued together, relaying jobs
//!   down and responses up.
//!
//! # Execution model
//!
//! Nodes are single-threaded and cooperative. Each `poll` performs at most one
//! multiplexer wait and services at most one frame before returning to the
//! caller. Blocking operations (`get`, `put_to`, `accept_connections`) loop
//! over `poll` with a [`Budget`] that shrinks with wall-clock time, so a
//! [`Wait::Timeout`] is honoured no matter how many frames arrive meanwhile.
//!
//! # Lifecycle
//!
//! ```text
//! client:  Inactive ──connect──> Connected ──close/DISCONN──> Closed
//!
//! server:  Inactive ──bind──> Ready ──accept──> Connected ──close──> Closed
//!                               ^                   │
//!                               └── last peer left ─┘
//! ```
//!
//! Operations are checked against the lifecycle and fail with
//! [`QueueError::StateMismatch`] rather than doing anything surprising.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod outgoing;
pub mod peers;
pub mod policy;
pub mod reactor;
pub mod server;
pub mod state;
pub mod wait;

pub use client::QueueClient;
pub use config::{ConfigSource, NodeConfig, TomlFile};
pub use dispatch::{DispatchNode, StepReport};
pub use error::{ConfigError, QueueError, Result};
pub use hooks::{LogTelemetry, NoStatus, Origin, StaticStatus, StatusProvider, Telemetry};
pub use netqueue_proto::{Message, MsgType};
pub use outgoing::Outgoing;
pub use peers::{Peer, PeerId, PeerSet};
pub use policy::{DispatchPolicy, RandomChoice, RoundRobin};
pub use server::{QueueServer, Target};
pub use state::{ClientState, ServerState};
pub use wait::{Budget, Wait};

/// One decoded ENQUEUE payload: its items, in order.
pub type Item = Vec<String>;
