//! Development daemon: binds the socket, answers `ping`, and rejects
//! everything else. Useful for exercising clients without the real
//! privileged backend.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use backhaul_client::{encode_reply, unseal, CredentialStore, Envelope};
use backhaul_frame::{FrameError, FrameListener, FrameWriter, StreamReader};
use backhaul_transport::{SocketListener, SocketStream};
use tracing::{info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_reply, OutputFormat};

const STATUS_AUTH_FAILED: u32 = 1;
const STATUS_UNKNOWN_FUNCTION: u32 = 2;
const STATUS_BAD_ENVELOPE: u32 = 3;

/// Collects decoded frame payloads for the serving loop.
#[derive(Default)]
struct Inbox {
    payloads: Vec<Vec<u8>>,
}

impl FrameListener for Inbox {
    fn on_frame(&mut self, payload: &[u8]) {
        self.payloads.push(payload.to_vec());
    }
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        SocketListener::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    info!(path = ?args.path, "listening");

    let mut served = 0usize;
    loop {
        let stream = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        serve_connection(stream, args.credential_dir.as_deref(), format)?;

        served = served.saturating_add(1);
        if let Some(count) = args.count {
            if served >= count {
                return Ok(SUCCESS);
            }
        }
    }
}

/// Answer requests on one connection until the peer hangs up.
fn serve_connection(
    stream: SocketStream,
    credential_dir: Option<&std::path::Path>,
    format: OutputFormat,
) -> CliResult<()> {
    let peer_uid = stream.peer_credentials().map(|(uid, _, _)| uid);

    let reader_stream = match stream.try_clone() {
        Ok(clone) => clone,
        Err(err) => {
            warn!(%err, "cannot clone accepted stream, dropping connection");
            return Ok(());
        }
    };
    let mut reader = StreamReader::new(reader_stream);
    let mut writer = FrameWriter::new(stream);

    let inbox = Rc::new(RefCell::new(Inbox::default()));
    reader.add_listener(inbox.clone());

    loop {
        match reader.pull(4096) {
            Ok(_) => {}
            Err(FrameError::ConnectionClosed) => return Ok(()),
            Err(err) => return Err(frame_error("receive failed", err)),
        }
        if let Err(err) = reader.drain() {
            // Malformed frame: the stream position is no longer trustworthy.
            warn!(%err, "malformed frame from peer, dropping connection");
            return Ok(());
        }

        for payload in inbox.borrow_mut().payloads.drain(..) {
            let (function, status, body) = answer(&payload, peer_uid, credential_dir);
            print_reply(&function, status, &body, format);
            writer
                .write(&encode_reply(status, &body))
                .map_err(|err| frame_error("send failed", err))?;
        }
    }
}

/// Decode, authenticate and dispatch one request payload.
fn answer(
    payload: &[u8],
    peer_uid: Option<u32>,
    credential_dir: Option<&std::path::Path>,
) -> (String, u32, Vec<u8>) {
    let envelope = match unseal(payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(%err, "rejecting undecodable request");
            return (
                "<invalid>".to_string(),
                STATUS_BAD_ENVELOPE,
                err.to_string().into_bytes(),
            );
        }
    };
    let function = envelope.request.function.clone();

    if let Err(reason) = authenticate(&envelope, peer_uid, credential_dir) {
        warn!(user = %envelope.user, reason, "rejecting unauthenticated request");
        return (function, STATUS_AUTH_FAILED, reason.as_bytes().to_vec());
    }

    match envelope.request.function.as_str() {
        "ping" => (function, 0, b"pong".to_vec()),
        other => {
            let message = format!("unknown function: {other}");
            (function, STATUS_UNKNOWN_FUNCTION, message.into_bytes())
        }
    }
}

/// Verify the presented token against the caller's on-disk credential file.
///
/// The claimed user name must resolve to the uid that opened the socket, and
/// the token must match the permission-locked file in that user's home (or
/// the override directory).
fn authenticate(
    envelope: &Envelope,
    peer_uid: Option<u32>,
    credential_dir: Option<&std::path::Path>,
) -> Result<(), &'static str> {
    let Some(uid) = peer_uid else {
        return Err("peer credentials unavailable");
    };

    let home = match lookup_user(&envelope.user, uid) {
        Some(home) => home,
        None => return Err("user does not match connection owner"),
    };
    let dir = credential_dir.map(PathBuf::from).unwrap_or(home);

    let store = CredentialStore::at_dir(&dir, uid);
    match store.peek() {
        Some(token) if token == envelope.token => Ok(()),
        Some(_) => Err("token mismatch"),
        None => Err("no trusted credential file"),
    }
}

/// Resolve the claimed user name and return their home directory, or `None`
/// when the name does not belong to the connecting uid.
fn lookup_user(name: &str, uid: u32) -> Option<PathBuf> {
    let user = nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid)).ok()??;
    (user.name == name).then_some(user.dir)
}
