//! WireGuard key material
//!
//! Keys are Curve25519 (x25519) pairs encoded as standard base64, the format
//! WireGuard configuration files use. The private half is wrapped in
//! [`PrivateKey`], which never prints itself.

use std::fmt;

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};

/// Length of a raw x25519 key in bytes
const KEY_LEN: usize = 32;

/// A base64-encoded WireGuard private key
///
/// `Debug` and `Display` are redacted so the key can't leak through logs or
/// error messages. Use [`PrivateKey::expose`] only when writing the key into
/// a configuration document.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateKey(String);

impl PrivateKey {
    /// Wrap an already encoded key, validating its shape
    pub fn from_base64(encoded: &str) -> Result<Self, String> {
        let bytes = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|e| format!("invalid base64: {}", e))?;
        if bytes.len() != KEY_LEN {
            return Err(format!(
                "private key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ));
        }
        Ok(Self(encoded.trim().to_string()))
    }

    /// The encoded key, for rendering into a configuration document
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Derive the matching base64 public key
    pub fn public_key(&self) -> Result<String, String> {
        let bytes = BASE64_STANDARD
            .decode(&self.0)
            .map_err(|e| format!("invalid base64: {}", e))?;
        let raw: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| "private key has wrong length".to_string())?;
        let secret = StaticSecret::from(raw);
        Ok(BASE64_STANDARD.encode(PublicKey::from(&secret).as_bytes()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Generate a fresh key pair, returning `(public, private)`
pub fn generate_keypair() -> (String, PrivateKey) {
    let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let public = PublicKey::from(&secret);
    (
        BASE64_STANDARD.encode(public.as_bytes()),
        PrivateKey(BASE64_STANDARD.encode(secret.to_bytes())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_wireguard_shaped() {
        let (public, private) = generate_keypair();
        // 32 bytes of base64 with padding is 44 chars
        assert_eq!(public.len(), 44);
        assert_eq!(private.expose().len(), 44);
        assert!(PrivateKey::from_base64(private.expose()).is_ok());
    }

    #[test]
    fn test_public_key_derivation_matches() {
        let (public, private) = generate_keypair();
        assert_eq!(private.public_key().unwrap(), public);
    }

    #[test]
    fn test_keypairs_are_unique() {
        let (a, _) = generate_keypair();
        let (b, _) = generate_keypair();
        assert_ne!(a, b);
    }

    #[test]
    fn test_private_key_is_redacted() {
        let (_, private) = generate_keypair();
        let debug = format!("{:?}", private);
        let display = format!("{}", private);
        assert!(!debug.contains(private.expose()));
        assert!(!display.contains(private.expose()));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_from_base64_rejects_short_key() {
        let short = BASE64_STANDARD.encode([1u8; 16]);
        assert!(PrivateKey::from_base64(&short).is_err());
        assert!(PrivateKey::from_base64("not base64!").is_err());
    }
}
