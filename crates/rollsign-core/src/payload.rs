//! The string carried inside each QR symbol.
//!
//! Format: `<code>-<lowercase hex signature>`. Codes are restricted to
//! `[A-Za-z0-9_.]` so the `-` delimiter never appears inside one, and
//! parsing splits on the last `-` since hex never contains it.

use crate::signer::{Credential, Signature, SIGNATURE_LEN};

/// Separator between the code and the signature.
pub const DELIMITER: char = '-';

/// Longest accepted code.
pub const MAX_CODE_LEN: usize = 64;

/// Why a code was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeViolation {
    /// Code is empty
    Empty,
    /// Code is longer than [`MAX_CODE_LEN`]
    TooLong,
    /// Code starts with `.`
    LeadingDot,
    /// Code contains a character outside `[A-Za-z0-9_.]`
    InvalidChar(char),
}

impl std::fmt::Display for CodeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "code is empty"),
            Self::TooLong => write!(f, "code exceeds {MAX_CODE_LEN} characters"),
            Self::LeadingDot => write!(f, "code must not start with '.'"),
            Self::InvalidChar(c) => write!(f, "code contains invalid character {c:?}"),
        }
    }
}

/// Check that a code is usable as a payload prefix and a file name.
pub fn validate_code(code: &str) -> Result<(), CodeViolation> {
    if code.is_empty() {
        return Err(CodeViolation::Empty);
    }
    if code.len() > MAX_CODE_LEN {
        return Err(CodeViolation::TooLong);
    }
    if code.starts_with('.') {
        return Err(CodeViolation::LeadingDot);
    }
    if let Some(c) = code
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.')))
    {
        return Err(CodeViolation::InvalidChar(c));
    }
    Ok(())
}

impl Credential {
    /// Render the canonical QR payload.
    #[must_use]
    pub fn payload(&self) -> String {
        encode_payload(&self.code, &self.signature)
    }
}

/// Join a code and signature into the canonical payload.
#[must_use]
pub fn encode_payload(code: &str, signature: &Signature) -> String {
    format!("{code}{DELIMITER}{}", signature.to_hex())
}

/// Split a scanned payload back into a credential.
///
/// Returns `None` unless the code is valid and exactly
/// `2 * SIGNATURE_LEN` lowercase hex digits follow the last delimiter.
#[must_use]
pub fn parse_payload(payload: &str) -> Option<Credential> {
    let (code, sig_hex) = payload.rsplit_once(DELIMITER)?;
    validate_code(code).ok()?;
    if sig_hex.len() != SIGNATURE_LEN * 2
        || !sig_hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        return None;
    }
    let signature = Signature::from_hex(sig_hex).ok()?;
    Some(Credential {
        code: code.to_string(),
        signature,
    })
}
