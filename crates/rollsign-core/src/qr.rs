//! QR code generation for credentials.
//!
//! Each credential becomes one PNG named after its code. The symbol
//! carries the canonical payload (`<code>-<hex signature>`) so any
//! phone scanner can read it and check it against the public key on the
//! published page.
//!
//! Rendering is deterministic: the same payload and settings always
//! produce byte-identical PNG output.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Luma};
use qrcode::types::QrError;
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IssueError, Result};
use crate::fsio::{self, Visibility};
use crate::signer::Credential;

/// Default minimum edge length of a rendered image, in pixels.
pub const DEFAULT_SIZE: u32 = 256;

/// QR error-correction level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCorrection {
    /// ~7% recovery
    Low,
    /// ~15% recovery
    #[default]
    Medium,
    /// ~25% recovery
    Quartile,
    /// ~30% recovery
    High,
}

impl From<ErrorCorrection> for EcLevel {
    fn from(level: ErrorCorrection) -> Self {
        match level {
            ErrorCorrection::Low => Self::L,
            ErrorCorrection::Medium => Self::M,
            ErrorCorrection::Quartile => Self::Q,
            ErrorCorrection::High => Self::H,
        }
    }
}

impl std::fmt::Display for ErrorCorrection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::Quartile => write!(f, "quartile"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Renders payloads into PNG QR codes.
#[derive(Debug, Clone, Copy)]
pub struct QrEncoder {
    error_correction: ErrorCorrection,
    size: u32,
}

impl Default for QrEncoder {
    fn default() -> Self {
        Self::new(ErrorCorrection::default(), DEFAULT_SIZE)
    }
}

impl QrEncoder {
    /// Encoder with the given error correction and minimum image edge.
    #[must_use]
    pub const fn new(error_correction: ErrorCorrection, size: u32) -> Self {
        Self {
            error_correction,
            size,
        }
    }

    fn symbol(&self, payload: &str) -> Result<QrCode> {
        QrCode::with_error_correction_level(payload.as_bytes(), self.error_correction.into())
            .map_err(|e| match e {
                QrError::DataTooLong => IssueError::Encoding(format!(
                    "payload of {} bytes exceeds QR capacity at {} error correction",
                    payload.len(),
                    self.error_correction
                )),
                other => IssueError::Encoding(other.to_string()),
            })
    }

    /// Render a payload to PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns `IssueError::Encoding` if the payload does not fit the
    /// largest symbol at this error-correction level.
    pub fn encode(&self, payload: &str) -> Result<Vec<u8>> {
        let code = self.symbol(payload)?;

        let image = code
            .render::<Luma<u8>>()
            .quiet_zone(true)
            .min_dimensions(self.size, self.size)
            .build();

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| IssueError::Encoding(format!("png encoding failed: {e}")))?;
        Ok(png)
    }

    /// Encode a credential and write it to `<dir>/<code>.png`.
    ///
    /// # Errors
    ///
    /// `IssueError::Encoding` on capacity overflow, `IssueError::Io` if the
    /// image cannot be written.
    pub fn write_credential(&self, dir: &Path, credential: &Credential) -> Result<PathBuf> {
        let png = self.encode(&credential.payload())?;
        let path = image_path(dir, &credential.code);
        fsio::write_atomic(&path, &png, Visibility::Public)?;
        debug!(code = %credential.code, path = %path.display(), bytes = png.len(), "wrote qr image");
        Ok(path)
    }

    /// Render a payload with block characters for terminal display.
    pub fn render_terminal(&self, payload: &str) -> Result<String> {
        let code = self.symbol(payload)?;
        Ok(code
            .render()
            .dark_color('\u{2588}') // Full block
            .light_color(' ')
            .quiet_zone(true)
            .build())
    }
}

/// Where the image for `code` lives.
#[must_use]
pub fn image_path(dir: &Path, code: &str) -> PathBuf {
    dir.join(format!("{code}.png"))
}

/// Decode the single QR symbol in a PNG.
#[cfg(test)]
pub(crate) fn decode_png(png: &[u8]) -> Option<String> {
    let img = image::load_from_memory(png).ok()?.to_luma8();
    let (width, height) = (img.width() as usize, img.height() as usize);
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
        img.get_pixel(u32::try_from(x).unwrap(), u32::try_from(y).unwrap())[0]
    });
    let grids = prepared.detect_grids();
    let [grid] = grids.as_slice() else {
        return None;
    };
    grid.decode().ok().map(|(_, content)| content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key_pair;
    use crate::signer::CredentialSigner;
    use tempfile::TempDir;

    fn credential(code: &str) -> Credential {
        let pair = generate_key_pair().unwrap();
        CredentialSigner::new(&pair.private_key).unwrap().issue(code)
    }

    #[test]
    fn encoding_is_deterministic() {
        let encoder = QrEncoder::default();
        let payload = credential("ABC123").payload();
        assert_eq!(encoder.encode(&payload).unwrap(), encoder.encode(&payload).unwrap());
    }

    #[test]
    fn png_holds_the_payload() {
        let encoder = QrEncoder::default();
        let payload = credential("ABC123").payload();
        let png = encoder.encode(&payload).unwrap();

        assert_eq!(decode_png(&png).as_deref(), Some(payload.as_str()));
    }

    #[test]
    fn respects_minimum_size() {
        let png = QrEncoder::new(ErrorCorrection::High, 512)
            .encode("hello")
            .unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert!(img.width() >= 512);
        assert_eq!(img.width(), img.height());
        assert_eq!(decode_png(&png).as_deref(), Some("hello"));
    }

    #[test]
    fn oversized_payload_is_encoding_error() {
        let payload = "A".repeat(4000);
        let err = QrEncoder::new(ErrorCorrection::High, DEFAULT_SIZE)
            .encode(&payload)
            .unwrap_err();
        assert!(matches!(err, IssueError::Encoding(_)));
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn write_credential_names_file_by_code() {
        let dir = TempDir::new().unwrap();
        let encoder = QrEncoder::default();
        let cred = credential("ABC123");

        let path = encoder.write_credential(dir.path(), &cred).unwrap();
        assert_eq!(path, dir.path().join("ABC123.png"));

        let first = std::fs::read(&path).unwrap();
        encoder.write_credential(dir.path(), &cred).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn terminal_render_non_empty() {
        let rendered = QrEncoder::default().render_terminal("ABC123").unwrap();
        assert!(rendered.contains('\u{2588}'));
    }

    #[test]
    fn error_correction_serde_is_lowercase() {
        let json = serde_json::to_string(&ErrorCorrection::Quartile).unwrap();
        assert_eq!(json, "\"quartile\"");
    }
}
