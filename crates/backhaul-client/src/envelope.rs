//! Application envelope carried inside frame payloads.
//!
//! Forward direction: `base64("<user>|<token>|" + json({"function", "data"?}))`.
//! Reverse direction: a 4-byte big-endian status code followed by the raw
//! message body; status 0 is success, any positive status is an application
//! error paired with a human-readable message.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Field separator between user, token and request body.
pub const FIELD_SEPARATOR: char = '|';

/// One privileged operation requested from the backup daemon.
///
/// The operation set is open-ended (the daemon dispatches on `function`),
/// with typed constructors for the known operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Daemon-side dispatch key.
    pub function: String,
    /// Operation arguments, omitted when the operation takes none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Request {
    /// A request with no arguments.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            data: None,
        }
    }

    /// A request with arguments.
    pub fn with_data(function: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            function: function.into(),
            data: Some(data),
        }
    }

    /// Liveness probe; the daemon answers with `pong`.
    pub fn ping() -> Self {
        Self::new("ping")
    }

    /// Start the backup job with the given id.
    pub fn run_backup(job: &str) -> Self {
        Self::with_data("run_backup", serde_json::json!({ "job": job }))
    }

    /// Abort a running backup job.
    pub fn abort_backup(job: &str) -> Self {
        Self::with_data("abort_backup", serde_json::json!({ "job": job }))
    }

    /// Restore from an archive path known to the daemon.
    pub fn restore_archive(archive: &str) -> Self {
        Self::with_data("restore_archive", serde_json::json!({ "archive": archive }))
    }
}

/// A decoded request envelope, as the daemon sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Login name claimed by the caller.
    pub user: String,
    /// Credential token presented by the caller.
    pub token: String,
    /// The request carried in the envelope.
    pub request: Request,
}

/// Encode the wire payload for one request.
pub fn seal(user: &str, token: &str, request: &Request) -> Result<String, EnvelopeError> {
    let body = serde_json::to_string(request)?;
    let plain = format!("{user}{FIELD_SEPARATOR}{token}{FIELD_SEPARATOR}{body}");
    Ok(BASE64.encode(plain))
}

/// Decode a request envelope (daemon side).
pub fn unseal(payload: &[u8]) -> Result<Envelope, EnvelopeError> {
    let decoded = BASE64.decode(payload)?;
    let plain = String::from_utf8(decoded)?;

    let mut parts = plain.splitn(3, FIELD_SEPARATOR);
    let user = parts.next().ok_or(EnvelopeError::MissingField("user"))?;
    let token = parts.next().ok_or(EnvelopeError::MissingField("token"))?;
    let body = parts.next().ok_or(EnvelopeError::MissingField("request"))?;
    if user.is_empty() {
        return Err(EnvelopeError::MissingField("user"));
    }
    if token.is_empty() {
        return Err(EnvelopeError::MissingField("token"));
    }

    let request: Request = serde_json::from_str(body)?;
    Ok(Envelope {
        user: user.to_string(),
        token: token.to_string(),
        request,
    })
}

/// A decoded daemon reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// 0 = success; any positive value is an application error code.
    pub status: u32,
    /// Raw message body (UTF-8 text or JSON, caller-interpreted).
    pub body: Vec<u8>,
}

/// Decode a reply payload: 4-byte big-endian status, then the raw body.
pub fn parse_reply(payload: &[u8]) -> Result<Reply, EnvelopeError> {
    if payload.len() < 4 {
        return Err(EnvelopeError::TruncatedReply { len: payload.len() });
    }
    let status = u32::from_be_bytes(payload[..4].try_into().unwrap());
    Ok(Reply {
        status,
        body: payload[4..].to_vec(),
    })
}

/// Encode a reply payload (daemon and test-double side).
pub fn encode_reply(status: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&status.to_be_bytes());
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_json_shape() {
        let json = serde_json::to_value(Request::ping()).unwrap();
        assert_eq!(json, serde_json::json!({ "function": "ping" }));

        let json = serde_json::to_value(Request::run_backup("nightly")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "function": "run_backup", "data": { "job": "nightly" } })
        );
    }

    #[test]
    fn seal_unseal_roundtrip() {
        let request = Request::restore_archive("/var/backups/site.tar");
        let wire = seal("wwwrun", &"ab12".repeat(8), &request).unwrap();

        let envelope = unseal(wire.as_bytes()).unwrap();
        assert_eq!(envelope.user, "wwwrun");
        assert_eq!(envelope.token, "ab12".repeat(8));
        assert_eq!(envelope.request, request);
    }

    #[test]
    fn sealed_payload_is_base64() {
        let wire = seal("user", "token", &Request::ping()).unwrap();
        assert!(wire
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+/=".contains(c)));
    }

    #[test]
    fn pipe_in_request_body_survives() {
        // splitn(3) keeps separators inside the JSON body intact.
        let request = Request::with_data("run_backup", serde_json::json!({ "job": "a|b" }));
        let wire = seal("user", "token", &request).unwrap();
        let envelope = unseal(wire.as_bytes()).unwrap();
        assert_eq!(envelope.request, request);
    }

    #[test]
    fn unseal_rejects_bad_base64() {
        let err = unseal(b"!!!not-base64!!!").unwrap_err();
        assert!(matches!(err, EnvelopeError::Base64(_)));
    }

    #[test]
    fn unseal_rejects_missing_fields() {
        let wire = BASE64.encode("only-user");
        let err = unseal(wire.as_bytes()).unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingField(_)));

        let wire = BASE64.encode("user|token-without-body");
        let err = unseal(wire.as_bytes()).unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingField("request")));
    }

    #[test]
    fn unseal_rejects_non_json_body() {
        let wire = BASE64.encode("user|token|not-json");
        let err = unseal(wire.as_bytes()).unwrap_err();
        assert!(matches!(err, EnvelopeError::Json(_)));
    }

    #[test]
    fn reply_roundtrip() {
        let payload = encode_reply(0, b"pong");
        assert_eq!(payload, b"\x00\x00\x00\x00pong");

        let reply = parse_reply(&payload).unwrap();
        assert_eq!(reply.status, 0);
        assert_eq!(reply.body, b"pong");
    }

    #[test]
    fn reply_error_status() {
        let reply = parse_reply(b"\x00\x00\x00\x05denied").unwrap();
        assert_eq!(reply.status, 5);
        assert_eq!(reply.body, b"denied");
    }

    #[test]
    fn reply_empty_body() {
        let reply = parse_reply(&encode_reply(0, b"")).unwrap();
        assert_eq!(reply.status, 0);
        assert!(reply.body.is_empty());
    }

    #[test]
    fn truncated_reply_rejected() {
        let err = parse_reply(b"\x00\x00").unwrap_err();
        assert!(matches!(err, EnvelopeError::TruncatedReply { len: 2 }));
    }
}
