use std::path::PathBuf;

use nix::unistd::{Uid, User};

use crate::error::HandshakeError;

/// The OS identity of the calling process.
///
/// Trust is anchored here: the credential file lives in this user's home
/// directory and the daemon independently checks the peer uid on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Login name, sent in the request envelope.
    pub name: String,
    /// Numeric uid; must own the credential file.
    pub uid: u32,
    /// Home directory; hosts the credential file.
    pub home: PathBuf,
}

/// Resolve the current process's user from the passwd database.
///
/// Failure here is fatal for the whole client (no retry): without an
/// identity there is nowhere to anchor the credential file.
pub fn resolve_current_user() -> Result<UserIdentity, HandshakeError> {
    let uid = Uid::current();
    let user = User::from_uid(uid)
        .map_err(|err| HandshakeError::Identity(err.to_string()))?
        .ok_or_else(|| HandshakeError::Identity(format!("no passwd entry for uid {uid}")))?;

    Ok(UserIdentity {
        name: user.name,
        uid: uid.as_raw(),
        home: user.dir,
    })
}
