use std::io::Write;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::error::HandshakeError;
use crate::identity::UserIdentity;

/// Well-known credential file name under the caller's home directory.
pub const CREDENTIAL_FILE_NAME: &str = ".backhaul-key";

/// Token length in characters.
pub const TOKEN_LEN: usize = 32;

/// Tokens older than this are regenerated.
pub const MAX_TOKEN_AGE: Duration = Duration::from_secs(60 * 60);

/// Required permission bits: owner read/write only.
const TOKEN_MODE: u32 = 0o600;

const HEX_ALPHABET: &[u8] = b"0123456789abcdef";

/// The shared secret between client and daemon, anchored in the filesystem.
///
/// Both processes run on the same host; the daemon proves the caller's
/// identity by reading the same permission-locked file out of the caller's
/// home directory. Nothing is cached in process memory: every request
/// re-derives trust from disk, so a rotated or revoked token takes effect
/// immediately.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    uid: u32,
}

impl CredentialStore {
    /// Token store for the given user, rooted at their home directory.
    pub fn for_user(identity: &UserIdentity) -> Self {
        Self::at_dir(&identity.home, identity.uid)
    }

    /// Token store rooted at an explicit directory (daemons, tests).
    pub fn at_dir(dir: &Path, uid: u32) -> Self {
        Self {
            path: dir.join(CREDENTIAL_FILE_NAME),
            uid,
        }
    }

    /// Path of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the current token, regenerating it if missing or untrusted.
    ///
    /// A stored token is reused only when every invariant holds: regular
    /// file, mode exactly 0600, owned by the calling uid, younger than one
    /// hour, and 32 lowercase-hex characters. Any violation forces a fresh
    /// token.
    pub fn fetch(&self) -> Result<String, HandshakeError> {
        if let Some(token) = self.peek() {
            return Ok(token);
        }
        self.regenerate()
    }

    /// Validation-only read: the stored token if every invariant holds.
    ///
    /// Used by the daemon side to check a presented token without ever
    /// rotating the file.
    pub fn peek(&self) -> Option<String> {
        let metadata = std::fs::symlink_metadata(&self.path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        if metadata.mode() & 0o7777 != TOKEN_MODE {
            return None;
        }
        if metadata.uid() != self.uid {
            return None;
        }
        let age = metadata.modified().ok()?.elapsed().ok()?;
        if age > MAX_TOKEN_AGE {
            return None;
        }

        let token = std::fs::read_to_string(&self.path).ok()?;
        is_hex_token(&token).then_some(token)
    }

    fn regenerate(&self) -> Result<String, HandshakeError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(HandshakeError::Remove {
                    path: self.path.clone(),
                    source: err,
                })
            }
        }

        let token = generate_token();

        // create_new + explicit mode so the file is never readable by anyone
        // else, not even between create and chmod.
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(TOKEN_MODE)
            .open(&self.path)
            .map_err(|err| HandshakeError::Write {
                path: self.path.clone(),
                source: err,
            })?;
        file.write_all(token.as_bytes())
            .map_err(|err| HandshakeError::Write {
                path: self.path.clone(),
                source: err,
            })?;

        debug!(path = ?self.path, "rotated credential token");
        Ok(token)
    }
}

/// Exactly 32 lowercase-hex characters.
fn is_hex_token(token: &str) -> bool {
    token.len() == TOKEN_LEN
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LEN)
        .map(|_| HEX_ALPHABET[rng.random_range(0..HEX_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::os::unix::fs::PermissionsExt;
    use std::time::SystemTime;

    use super::*;

    fn store_in(dir: &Path) -> CredentialStore {
        let uid = nix::unistd::Uid::current().as_raw();
        CredentialStore::at_dir(dir, uid)
    }

    #[test]
    fn generates_hex_token_with_locked_mode() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let token = store.fetch().unwrap();
        assert!(is_hex_token(&token));

        let metadata = std::fs::metadata(store.path()).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o7777, 0o600);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), token);
    }

    #[test]
    fn reuses_fresh_valid_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let first = store.fetch().unwrap();
        let second = store.fetch().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn regenerates_when_mode_is_loose() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let first = store.fetch().unwrap();
        std::fs::set_permissions(store.path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(store.peek().is_none());
        let second = store.fetch().unwrap();
        assert_ne!(first, second);

        let metadata = std::fs::metadata(store.path()).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o7777, 0o600);
    }

    #[test]
    fn regenerates_when_token_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let first = store.fetch().unwrap();
        let stale = SystemTime::now() - (MAX_TOKEN_AGE + Duration::from_secs(60));
        File::options()
            .write(true)
            .open(store.path())
            .unwrap()
            .set_modified(stale)
            .unwrap();

        assert!(store.peek().is_none());
        let second = store.fetch().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn regenerates_when_content_is_not_hex() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.fetch().unwrap();
        std::fs::write(store.path(), "UPPERCASE-junk-not-a-token-here!").unwrap();
        std::fs::set_permissions(store.path(), std::fs::Permissions::from_mode(0o600)).unwrap();

        let token = store.fetch().unwrap();
        assert!(is_hex_token(&token));
    }

    #[test]
    fn regenerates_when_length_is_wrong() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        store.fetch().unwrap();
        std::fs::write(store.path(), "abc123").unwrap();
        std::fs::set_permissions(store.path(), std::fs::Permissions::from_mode(0o600)).unwrap();

        let token = store.fetch().unwrap();
        assert_eq!(token.len(), TOKEN_LEN);
    }

    #[test]
    fn rejects_wrong_owner() {
        let dir = tempfile::tempdir().unwrap();
        let uid = nix::unistd::Uid::current().as_raw();
        let store = CredentialStore::at_dir(dir.path(), uid);
        store.fetch().unwrap();

        // Same file, viewed with a store expecting a different owner.
        let other = CredentialStore::at_dir(dir.path(), uid + 1);
        assert!(other.peek().is_none());
    }

    #[test]
    fn peek_never_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        assert!(store.peek().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn hex_token_validation() {
        assert!(is_hex_token(&"a1".repeat(16)));
        assert!(!is_hex_token(&"A1".repeat(16)));
        assert!(!is_hex_token(&"g1".repeat(16)));
        assert!(!is_hex_token("abc123"));
        assert!(!is_hex_token(&"a".repeat(33)));
    }
}
