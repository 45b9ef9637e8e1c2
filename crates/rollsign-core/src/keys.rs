//! Ed25519 key pairs for an issuance epoch.
//!
//! A fresh key pair is drawn for every run. The private half is stored in
//! the conventional 64-byte "keypair" layout (seed followed by public key)
//! so secret files written by older tooling keep loading. A bare 32-byte
//! seed is accepted as well.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::error::{IssueError, Result};

/// Length of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of a stored private key (seed || public key).
pub const PRIVATE_KEY_LEN: usize = 64;

/// Length of the secret seed.
pub const SEED_LEN: usize = 32;

/// Published half of a key pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// Wrap raw public key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a lowercase or uppercase hex public key.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| IssueError::Crypto(format!("public key is not hex: {e}")))?;
        let bytes: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            IssueError::Crypto(format!(
                "public key must be {PUBLIC_KEY_LEN} bytes, got {}",
                b.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Secret half of a key pair. Zeroized on drop, never printed.
#[derive(Clone)]
pub struct PrivateKey(Zeroizing<[u8; PRIVATE_KEY_LEN]>);

impl PrivateKey {
    /// Accept either the 64-byte keypair layout or a 32-byte seed.
    ///
    /// For the 64-byte form the embedded public half must match the seed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let signing_key = match bytes.len() {
            PRIVATE_KEY_LEN => {
                let mut buf = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
                buf.copy_from_slice(bytes);
                SigningKey::from_keypair_bytes(&buf).map_err(|_| {
                    IssueError::Crypto("private key does not match its embedded public key".into())
                })?
            }
            SEED_LEN => {
                let mut seed = Zeroizing::new([0u8; SEED_LEN]);
                seed.copy_from_slice(bytes);
                SigningKey::from_bytes(&seed)
            }
            n => {
                return Err(IssueError::Crypto(format!(
                    "private key must be {PRIVATE_KEY_LEN} or {SEED_LEN} bytes, got {n}"
                )))
            }
        };
        Ok(Self::from_signing_key(&signing_key))
    }

    /// Parse a hex-encoded private key.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(s.trim())
                .map_err(|_| IssueError::Crypto("private key is not valid hex".into()))?,
        );
        Self::from_bytes(&bytes)
    }

    fn from_signing_key(signing_key: &SigningKey) -> Self {
        Self(Zeroizing::new(signing_key.to_keypair_bytes()))
    }

    /// Lowercase hex of the 64-byte keypair layout.
    #[must_use]
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.0[..]))
    }

    /// Raw 64-byte keypair layout.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_LEN] {
        &self.0
    }

    /// The dalek signing key for this secret.
    pub(crate) fn signing_key(&self) -> SigningKey {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        seed.copy_from_slice(&self.0[..SEED_LEN]);
        SigningKey::from_bytes(&seed)
    }

    /// Derive the matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key().verifying_key().to_bytes())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// A signing key pair for one issuance epoch.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Published half
    pub public_key: PublicKey,
    /// Secret half
    pub private_key: PrivateKey,
}

impl KeyPair {
    /// Rebuild a key pair from its private half.
    #[must_use]
    pub fn from_private_key(private_key: PrivateKey) -> Self {
        Self {
            public_key: private_key.public_key(),
            private_key,
        }
    }
}

/// Generate a new key pair from the operating system's CSPRNG.
///
/// # Errors
///
/// Returns `IssueError::Crypto` if the random source is unavailable.
pub fn generate_key_pair() -> Result<KeyPair> {
    let mut seed = Zeroizing::new([0u8; SEED_LEN]);
    OsRng
        .try_fill_bytes(&mut seed[..])
        .map_err(|e| IssueError::Crypto(format!("random source unavailable: {e}")))?;

    let signing_key = SigningKey::from_bytes(&seed);
    Ok(KeyPair::from_private_key(PrivateKey::from_signing_key(
        &signing_key,
    )))
}

/// The public half of a key pair.
#[must_use]
pub const fn expose_public_key(key_pair: &KeyPair) -> PublicKey {
    key_pair.public_key
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 8032, section 7.1, TEST 1
    const RFC8032_SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const RFC8032_PUBLIC: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    #[test]
    fn derivation_matches_rfc8032_vector() {
        let key = PrivateKey::from_hex(RFC8032_SEED).unwrap();
        let pair = KeyPair::from_private_key(key);
        assert_eq!(expose_public_key(&pair).to_hex(), RFC8032_PUBLIC);
    }

    #[test]
    fn generated_pair_is_consistent() {
        let pair = generate_key_pair().unwrap();
        assert_eq!(pair.private_key.public_key(), expose_public_key(&pair));
        assert_eq!(&pair.private_key.as_bytes()[SEED_LEN..], pair.public_key.as_bytes());
    }

    #[test]
    fn generation_never_repeats() {
        let a = generate_key_pair().unwrap();
        let b = generate_key_pair().unwrap();
        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn keypair_layout_round_trips_through_hex() {
        let pair = generate_key_pair().unwrap();
        let hex = pair.private_key.to_hex();
        assert_eq!(hex.len(), PRIVATE_KEY_LEN * 2);

        let reloaded = PrivateKey::from_hex(&hex).unwrap();
        assert_eq!(reloaded.as_bytes(), pair.private_key.as_bytes());
    }

    #[test]
    fn seed_and_keypair_forms_agree() {
        let from_seed = PrivateKey::from_hex(RFC8032_SEED).unwrap();
        let full = format!("{RFC8032_SEED}{RFC8032_PUBLIC}");
        let from_full = PrivateKey::from_hex(&full).unwrap();
        assert_eq!(from_seed.as_bytes(), from_full.as_bytes());
    }

    #[test]
    fn mismatched_embedded_public_key_rejected() {
        let other = generate_key_pair().unwrap();
        let bad = format!("{RFC8032_SEED}{}", other.public_key.to_hex());
        assert!(matches!(
            PrivateKey::from_hex(&bad),
            Err(IssueError::Crypto(_))
        ));
    }

    #[test]
    fn wrong_lengths_rejected() {
        assert!(PrivateKey::from_bytes(&[0u8; 31]).is_err());
        assert!(PrivateKey::from_bytes(&[0u8; 65]).is_err());
        assert!(PrivateKey::from_hex("zz").is_err());
        assert!(PublicKey::from_hex("abcd").is_err());
    }

    #[test]
    fn debug_hides_secret() {
        let pair = generate_key_pair().unwrap();
        let printed = format!("{pair:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(pair.private_key.to_hex().as_str()));
    }

    #[test]
    fn public_key_serde_is_hex_string() {
        let key = PublicKey::from_hex(RFC8032_PUBLIC).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{RFC8032_PUBLIC}\""));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
