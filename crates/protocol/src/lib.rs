//! Wire types for the CernVM WebAPI daemon protocol.
//!
//! The daemon speaks JSON over a WebSocket. Every frame carries a `type`
//! discriminator ([`Frame`]); request-scoped events use the callback roles in
//! [`CallbackRole`], session-scoped events are keyed by [`SessionId`].
//!
//! This crate has no I/O. It also hosts the small pieces of pure logic shared
//! by the client and CLI: resolution parsing and viewer window geometry.

pub mod callback;
pub mod constants;
pub mod error_code;
pub mod frame;
pub mod interaction;
pub mod resolution;
pub mod session;
pub mod viewer;

pub use callback::CallbackRole;
pub use error_code::ErrorCode;
pub use frame::{ActionFrame, ErrorFrame, EventFrame, Frame, ResponseFrame};
pub use interaction::{Interaction, InteractionKind, InteractionResult};
pub use resolution::{ParseResolutionError, RdpTarget, Resolution};
pub use session::{SessionId, SessionState, SessionSummary};
pub use viewer::{ScreenSize, ViewerWindow};
