//! Unix domain socket transport for the backhaul bridge.
//!
//! The web-facing client and the privileged backup daemon always live on the
//! same host and talk over a filesystem-path stream socket. This crate owns
//! the socket lifecycle: connect (client), bind/accept (daemon), timeouts,
//! and best-effort close.
//!
//! Everything above this layer works in terms of the [`SocketStream`] type.

pub mod error;
pub mod stream;
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::SocketStream;
pub use uds::{connect, SocketListener};
