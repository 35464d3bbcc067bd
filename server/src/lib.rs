//! # Relay Server Library
//!
//! This library provides a connection-oriented relay server for multiplayer
//! games. Clients connect over TCP, receive a stable session identifier, and
//! exchange generic text, position updates, and player progression saves.
//!
//! ## Core Responsibilities
//!
//! ### Session Management
//! Handles the complete lifecycle of client connections including:
//! - Identifier assignment from a process-wide counter, never reused
//! - Registration while the connection's receive loop is active
//! - Deregistration and an exit announcement however the connection ends
//!
//! ### Message Routing
//! Every incoming message is classified and dispatched:
//! - `SAVE:` payloads are persisted and answered only to the sender
//! - `POSITION:` payloads are relayed to everyone else as
//!   `<id>:POSITION:<x>,<y>,<z>` and acknowledged to the sender
//! - Anything else is relayed to everyone else as `<id>:<text>`
//!
//! ### Fault Isolation
//! A transport failure only ever ends its own connection. Broadcast delivery
//! failures to a third party are swallowed, decode failures are answered with
//! `PARSE_ERROR`, and store failures with `SAVE:FAIL`.
//!
//! ## Architecture Design
//!
//! ### Task-Per-Connection
//! Each accepted connection runs one tokio task that joins a reader owning
//! the receive loop with a writer draining the session's bounded outbound
//! queue onto the socket. A client that stops reading only loses its own
//! messages once its queue is full. Messages from one connection are
//! processed strictly in receive order; there is no ordering between
//! different connections.
//!
//! ### Single Registry Lock
//! The session registry is the only shared mutable state. Identifier
//! assignment, insertion, removal and recipient snapshots all happen under one
//! mutex, which is never held across a network write or a store call.
//!
//! ### Blocking Persistence Off the Reactor
//! Saves run on tokio's blocking pool so a slow disk never stalls the
//! receive loops of other connections.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! `Session` and the thread-safe `SessionRegistry`.
//!
//! ### Broadcast Module (`broadcast`)
//! Fan-out of server messages with per-recipient failure tolerance.
//!
//! ### Connection Module (`connection`)
//! The per-connection worker: framing, dispatch, and guaranteed teardown.
//!
//! ### Store Module (`store`)
//! The `PlayerStore` capability with SQLite and in-memory implementations.
//!
//! ### Network Module (`network`)
//! TCP listener, accept loop, and graceful shutdown.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use relay_server::config::ServerConfig;
//! use relay_server::network::Server;
//! use relay_server::store::SqlitePlayerStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqlitePlayerStore::open("players.db")?);
//!     let server = Server::bind(ServerConfig::default(), store).await?;
//!
//!     // Runs until the shutdown handle is triggered
//!     let shutdown = server.shutdown_handle();
//!     let running = tokio::spawn(server.run());
//!
//!     tokio::signal::ctrl_c().await?;
//!     shutdown.trigger();
//!     running.await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod network;
pub mod session;
pub mod store;
