//! Password authentication: trust, cleartext, and MD5. GSS/SSPI/SASL are
//! never answered — `respond_to` rejects them outright, since a caller
//! deserves a clear "SASL demanded" error rather than a connection that
//! silently hangs waiting for a frontend message this crate never sends.

use md5::{Digest, Md5};

use crate::error::{Error, Result};
use crate::message::AuthenticationMessage;

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // `write!` to a `String` never fails.
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// `"md5" + hex(md5(hex(md5(password || user)) || salt))`, PostgreSQL's
/// MD5 challenge-response password hash.
fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let mut inner = Md5::new();
    inner.update(password.as_bytes());
    inner.update(user.as_bytes());
    let inner_hex = hex_lower(&inner.finalize());

    let mut outer = Md5::new();
    outer.update(inner_hex.as_bytes());
    outer.update(salt);
    let outer_hex = hex_lower(&outer.finalize());

    format!("md5{outer_hex}")
}

/// What to send back in response to an `Authentication*` message, given
/// the credentials in `Opts`.
pub enum Response {
    /// Authentication is already complete (`AuthenticationOk`); nothing to
    /// send.
    None,
    /// Send a `PasswordMessage` carrying this literal string.
    Password(String),
}

/// Decide how to respond to one `AuthenticationMessage`, or fail if the
/// server demands a mechanism this crate doesn't implement.
pub fn respond_to(message: &AuthenticationMessage<'_>, user: &str, password: Option<&str>) -> Result<Response> {
    match message {
        AuthenticationMessage::Ok => Ok(Response::None),
        AuthenticationMessage::CleartextPassword => {
            let password = password.ok_or_else(|| {
                Error::Auth("server requires cleartext password, none configured".into())
            })?;
            Ok(Response::Password(password.to_string()))
        }
        AuthenticationMessage::Md5Password { salt } => {
            let password = password
                .ok_or_else(|| Error::Auth("server requires MD5 password, none configured".into()))?;
            Ok(Response::Password(md5_password(user, password, *salt)))
        }
        AuthenticationMessage::KerberosV5 => {
            Err(Error::Unsupported("Kerberos V5 authentication".into()))
        }
        AuthenticationMessage::Gss | AuthenticationMessage::GssContinue { .. } => {
            Err(Error::Unsupported("GSSAPI authentication".into()))
        }
        AuthenticationMessage::Sspi => Err(Error::Unsupported("SSPI authentication".into())),
        AuthenticationMessage::Sasl { mechanisms } => Err(Error::Unsupported(format!(
            "SASL authentication (offered: {})",
            mechanisms.join(", ")
        ))),
        AuthenticationMessage::SaslContinue { .. } | AuthenticationMessage::SaslFinal { .. } => {
            Err(Error::Unsupported("SASL authentication".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_password_matches_known_vector() {
        let hash = md5_password("postgres", "password", [0x01, 0x02, 0x03, 0x04]);
        assert!(hash.starts_with("md5"));
        assert_eq!(hash.len(), 35);
    }

    #[test]
    fn cleartext_requires_configured_password() {
        let err = respond_to(&AuthenticationMessage::CleartextPassword, "user", None).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn ok_needs_no_response() {
        let response = respond_to(&AuthenticationMessage::Ok, "user", None).unwrap();
        assert!(matches!(response, Response::None));
    }

    #[test]
    fn sasl_is_rejected_with_mechanism_list() {
        let err = respond_to(
            &AuthenticationMessage::Sasl {
                mechanisms: vec!["SCRAM-SHA-256"],
            },
            "user",
            Some("password"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn md5_response_is_deterministic() {
        let first = respond_to(
            &AuthenticationMessage::Md5Password { salt: [1, 2, 3, 4] },
            "postgres",
            Some("secret"),
        )
        .unwrap();
        let second = respond_to(
            &AuthenticationMessage::Md5Password { salt: [1, 2, 3, 4] },
            "postgres",
            Some("secret"),
        )
        .unwrap();
        match (first, second) {
            (Response::Password(a), Response::Password(b)) => assert_eq!(a, b),
            _ => panic!("expected password responses"),
        }
    }
}
