use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use backhaul_frame::{FrameConfig, FrameError, FrameListener, DEFAULT_MAX_MESSAGE_LENGTH};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::credential::CredentialStore;
use crate::envelope::{self, Reply, Request};
use crate::error::{ClientError, EnvelopeError, Result};
use crate::identity::{resolve_current_user, UserIdentity};

/// Bytes requested per read while awaiting the response.
const READ_CHUNK: usize = 8 * 1024;

/// Tunables for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum frame payload size, both directions.
    pub max_message_length: usize,
    /// Per-syscall read/write timeout. `None` (the default) blocks
    /// indefinitely on a hung daemon; set it to harden callers that cannot
    /// afford to wait forever.
    pub io_timeout: Option<Duration>,
    /// Overall deadline for one response. Only effective together with
    /// `io_timeout` (a blocked read cannot observe the deadline).
    pub response_timeout: Option<Duration>,
    /// Where the credential file lives. Defaults to the caller's home
    /// directory; daemons and tests point this elsewhere.
    pub credential_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            io_timeout: None,
            response_timeout: None,
            credential_dir: None,
        }
    }
}

/// Captures the single expected response frame.
#[derive(Default)]
struct ReplySlot {
    reply: Option<std::result::Result<Reply, EnvelopeError>>,
}

impl ReplySlot {
    fn clear(&mut self) {
        self.reply = None;
    }

    fn take(&mut self) -> Option<std::result::Result<Reply, EnvelopeError>> {
        self.reply.take()
    }
}

impl FrameListener for ReplySlot {
    fn on_frame(&mut self, payload: &[u8]) {
        // One request in flight: a second frame before the slot is drained
        // would be a daemon bug; keep the first reply.
        if self.reply.is_none() {
            self.reply = Some(envelope::parse_reply(payload));
        } else {
            warn!("dropping unexpected extra response frame");
        }
    }
}

/// Synchronous request/response façade over the daemon socket.
///
/// One request in flight at a time; `send` blocks the calling thread until a
/// complete response frame arrives, the peer errors, or the peer closes the
/// connection. Concurrent web requests each construct their own `Client`
/// (and thus their own connection) — the daemon serializes on its side.
pub struct Client {
    identity: UserIdentity,
    credentials: CredentialStore,
    socket_path: PathBuf,
    config: ClientConfig,
    conn: Option<Connection>,
    reply: Rc<RefCell<ReplySlot>>,
}

impl Client {
    /// Connect to the daemon socket with default configuration.
    ///
    /// Resolves the calling OS identity and opens the connection; failure in
    /// either is immediate, with no retry.
    pub fn new(socket_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(socket_path, ClientConfig::default())
    }

    /// Connect with explicit configuration.
    pub fn with_config(socket_path: impl AsRef<Path>, config: ClientConfig) -> Result<Self> {
        let identity = resolve_current_user()?;
        let credentials = match &config.credential_dir {
            Some(dir) => CredentialStore::at_dir(dir, identity.uid),
            None => CredentialStore::for_user(&identity),
        };

        let mut client = Self {
            identity,
            credentials,
            socket_path: socket_path.as_ref().to_path_buf(),
            config,
            conn: None,
            reply: Rc::new(RefCell::new(ReplySlot::default())),
        };
        client.conn = Some(client.open_connection()?);
        Ok(client)
    }

    /// The identity this client authenticates as.
    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    /// Perform one request/response exchange.
    ///
    /// Blocks until the daemon's response frame arrives. A transport failure
    /// mid-request closes the session, opens a fresh one exactly once, and
    /// surfaces [`ClientError::ConnectionReset`] — the request is never
    /// resent automatically, so a side-effecting operation cannot be
    /// duplicated behind the caller's back.
    pub fn send(&mut self, request: &Request) -> Result<Vec<u8>> {
        self.reply.borrow_mut().clear();

        // Authenticating: trust is re-derived from the filesystem on every
        // request, so a rotated token is honored immediately.
        let token = self.credentials.fetch()?;
        let wire = envelope::seal(&self.identity.name, &token, request)?;

        debug!(function = %request.function, "sending request");

        // Sending
        let conn = self.conn.as_mut().ok_or(FrameError::ConnectionClosed)?;
        if let Err(err) = conn.writer().write(wire.as_bytes()) {
            return Err(self.reset_connection(err));
        }

        // AwaitingResponse
        let reply = match self.await_reply() {
            Ok(reply) => reply,
            Err(AwaitFailure::Fatal(err)) => return Err(err),
            Err(AwaitFailure::Transport(err)) => return Err(self.reset_connection(err)),
        };

        match reply {
            Ok(Reply { status: 0, body }) => Ok(body),
            Ok(Reply { status, body }) => Err(ClientError::Daemon {
                status,
                message: String::from_utf8_lossy(&body).into_owned(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Release the connection. Subsequent `send` calls fail; construct a new
    /// `Client` to talk to the daemon again.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
        }
    }

    fn open_connection(&self) -> Result<Connection> {
        let frame_config = FrameConfig {
            max_message_length: self.config.max_message_length,
        };
        let mut conn = Connection::open(&self.socket_path, frame_config, self.config.io_timeout)?;
        conn.reader().add_listener(self.reply.clone());
        Ok(conn)
    }

    /// Pull/drain until the listener captures the reply.
    fn await_reply(
        &mut self,
    ) -> std::result::Result<std::result::Result<Reply, EnvelopeError>, AwaitFailure> {
        let deadline = self.config.response_timeout.map(|t| Instant::now() + t);
        let conn = self
            .conn
            .as_mut()
            .ok_or(AwaitFailure::Transport(FrameError::ConnectionClosed))?;

        loop {
            let pulled = conn.reader().pull(READ_CHUNK).map_err(AwaitFailure::Transport)?;
            conn.reader().drain().map_err(AwaitFailure::Transport)?;

            if let Some(reply) = self.reply.borrow_mut().take() {
                return Ok(reply);
            }

            if pulled == 0 {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return Err(AwaitFailure::Fatal(ClientError::Timeout(
                            self.config
                                .response_timeout
                                .unwrap_or(Duration::from_secs(0)),
                        )));
                    }
                }
            }
        }
    }

    /// Reconnect-once policy: replace the session and report, never resend.
    fn reset_connection(&mut self, source: FrameError) -> ClientError {
        self.close();
        let reconnected = match self.open_connection() {
            Ok(conn) => {
                self.conn = Some(conn);
                true
            }
            Err(err) => {
                warn!(%err, "reconnect after transport failure also failed");
                false
            }
        };
        debug!(reconnected, "connection reset mid-request");
        ClientError::ConnectionReset {
            reconnected,
            source,
        }
    }
}

enum AwaitFailure {
    /// Transport-level failure: triggers the reconnect-once path.
    Transport(FrameError),
    /// Already a final client error (deadline expiry).
    Fatal(ClientError),
}
