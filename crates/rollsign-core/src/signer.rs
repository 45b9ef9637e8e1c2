//! Deterministic Ed25519 signatures over roster codes.
//!
//! Ed25519 signing (RFC 8032) derives its nonce from the key and message,
//! so re-signing a code under the same key always reproduces the same bytes.
//! That is what makes re-issuance idempotent.

use ed25519_dalek::{Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};

use crate::error::{IssueError, Result};
use crate::keys::{PrivateKey, PublicKey, PUBLIC_KEY_LEN, SEED_LEN};

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Signature over a single code.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    /// Parse hex-encoded signature bytes.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| IssueError::Crypto(format!("signature is not hex: {e}")))?;
        let bytes: [u8; SIGNATURE_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            IssueError::Crypto(format!(
                "signature must be {SIGNATURE_LEN} bytes, got {}",
                b.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// A code together with its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Roster code that was signed
    pub code: String,
    /// Signature over the code's UTF-8 bytes
    pub signature: Signature,
}

impl Credential {
    /// Check this credential against a published public key.
    #[must_use]
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        verify(public_key.as_bytes(), &self.code, self.signature.as_bytes())
    }
}

/// Sign a code.
///
/// # Errors
///
/// Returns `IssueError::Crypto` only if the key material is structurally
/// invalid. Never fails for lack of randomness.
pub fn sign(private_key: &PrivateKey, code: &str) -> Result<Signature> {
    let signer = CredentialSigner::new(private_key)?;
    Ok(signer.sign_code(code))
}

/// Verify a signature over `code`.
///
/// Total over untrusted input: wrong lengths, invalid points and bad
/// signatures all return `false`.
#[must_use]
pub fn verify(public_key: &[u8], code: &str, signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; PUBLIC_KEY_LEN]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(code.as_bytes(), &signature).is_ok()
}

/// Holds a parsed signing key for bulk issuance.
pub struct CredentialSigner {
    signing_key: SigningKey,
    public_key: PublicKey,
}

impl CredentialSigner {
    /// Prepare a signer for the given private key.
    pub fn new(private_key: &PrivateKey) -> Result<Self> {
        let signing_key = private_key.signing_key();
        let derived = signing_key.verifying_key().to_bytes();
        if derived != private_key.as_bytes()[SEED_LEN..] {
            return Err(IssueError::Crypto(
                "private key does not match its embedded public key".into(),
            ));
        }
        Ok(Self {
            signing_key,
            public_key: PublicKey::from_bytes(derived),
        })
    }

    /// Public key that verifies this signer's output.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    fn sign_code(&self, code: &str) -> Signature {
        Signature(self.signing_key.sign(code.as_bytes()).to_bytes())
    }

    /// Issue a credential for one code.
    #[must_use]
    pub fn issue(&self, code: &str) -> Credential {
        Credential {
            code: code.to_string(),
            signature: self.sign_code(code),
        }
    }
}

impl std::fmt::Debug for CredentialSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSigner")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}
