//! CernVM WebAPI Runtime - transport and connection to the daemon
//!
//! This crate provides the low-level plumbing for talking to the CernVM
//! WebAPI daemon:
//!
//! - **Transport**: WebSocket to the daemon, or an in-memory pair
//! - **Connection**: request/reply correlation, session event routes and
//!   connection-level event broadcast
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │    cvmweb    │  Plugin facade, sessions, bootstrapper
//! └──────┬───────┘
//!        │ send_action / register_route
//! ┌──────▼───────┐
//! │cvmweb-runtime│  This crate
//! │  ┌────────┐  │
//! │  │ Conn   │  │  Request ids, reply streams, routes
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  WebSocket / memory
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod connection;
pub mod error;
pub mod transport;

pub use connection::{Connection, PendingRequest, Reply};
pub use error::{Error, Result};
pub use transport::{
	MemoryPeer, MemoryTransport, Transport, TransportParts, TransportReceiver, WebSocketTransport,
};
