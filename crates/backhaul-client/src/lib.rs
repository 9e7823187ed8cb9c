//! Request/response client for the privileged backhaul backup daemon.
//!
//! This is the "just works" layer for web-facing callers: resolve the calling
//! OS user, establish filesystem trust through a permission-locked token
//! file, frame one request over the daemon socket, and block until exactly
//! one framed response arrives.
//!
//! The channel is deliberately synchronous with a single request in flight
//! per [`Client`]: the caller is a short-lived request-scoped process and the
//! daemon is long-running local infrastructure. Responses are matched to
//! requests purely by protocol position, which is only safe because the
//! contract is strict request-then-response, never pipelined.

pub mod client;
pub mod connection;
pub mod credential;
pub mod envelope;
pub mod error;
pub mod identity;

pub use client::{Client, ClientConfig};
pub use connection::Connection;
pub use credential::{CredentialStore, CREDENTIAL_FILE_NAME, TOKEN_LEN};
pub use envelope::{encode_reply, parse_reply, seal, unseal, Envelope, Reply, Request};
pub use error::{ClientError, EnvelopeError, HandshakeError, Result};
pub use identity::{resolve_current_user, UserIdentity};
