//! HMAC-SHA256 request signatures.
//!
//! Signatures are the standard base64 encoding of the MAC with `+` and `/`
//! replaced by `-` and `_`. Padding is kept.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, SessionError};

type HmacSha256 = Hmac<Sha256>;

/// Signs `input` with `secret`.
///
/// Pure and deterministic: the same pair always yields the same signature,
/// and the output never contains `+` or `/`.
///
/// # Errors
///
/// Returns `SessionError::Configuration` if the secret is rejected as an
/// HMAC key.
///
/// # Example
///
/// ```
/// use pubrelay_client::sign;
///
/// # fn main() -> pubrelay_client::Result<()> {
/// let signature = sign("secret", "sub\npub\ngrant\nchannel=news")?;
/// assert_eq!(signature, sign("secret", "sub\npub\ngrant\nchannel=news")?);
/// assert!(!signature.contains('+') && !signature.contains('/'));
/// # Ok(())
/// # }
/// ```
pub fn sign(secret: &str, input: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SessionError::configuration("invalid secret key"))?;

    mac.update(input.as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_vector() {
        // RFC 4231 test case 2, re-encoded with the url-safe alphabet.
        let signature = sign("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(signature, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn signature_is_deterministic() {
        let a = sign("secret", "pub/sub/secret/chat/{}").unwrap();
        let b = sign("secret", "pub/sub/secret/chat/{}").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn different_secrets_differ() {
        assert_ne!(sign("one", "input").unwrap(), sign("two", "input").unwrap());
    }

    #[test]
    fn empty_secret_still_signs() {
        assert_eq!(sign("", "input").unwrap().len(), 44);
    }
}
