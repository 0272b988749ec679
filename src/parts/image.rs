//! Image parts: content-type lookup by extension and SHA-1 identity.
//!
//! Images are never decoded here; the engine only needs to know what to call
//! them and whether two blobs are the same picture.

use crate::opc::constants::content_type as ct;
use crate::opc::error::{OpcError, Result};
use sha1::{Digest, Sha1};
use std::fmt::Write;

/// Partname template for new image parts; `%d` is the image number and
/// the file extension follows the dot.
pub const IMAGE_PARTNAME_TEMPLATE: &str = "/word/media/image%d.";

/// Per-image state kept on image parts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageInfo {
    sha1: String,
}

impl ImageInfo {
    pub fn from_blob(blob: &[u8]) -> Self {
        Self { sha1: sha1_hex(blob) }
    }

    /// Hex SHA-1 of the image bytes. Empty until the part has been
    /// unmarshalled or created from a blob.
    #[inline]
    pub fn sha1(&self) -> &str {
        &self.sha1
    }

    pub(crate) fn refresh(&mut self, blob: &[u8]) {
        self.sha1 = sha1_hex(blob);
    }
}

/// Lower-case hex SHA-1 digest of `blob`.
pub fn sha1_hex(blob: &[u8]) -> String {
    let digest = Sha1::digest(blob);
    let mut hex = String::with_capacity(40);
    for byte in digest.iter() {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// Content type for an image file extension (case-insensitive).
pub fn content_type_for_ext(ext: &str) -> Result<&'static str> {
    let content_type = match ext.to_ascii_lowercase().as_str() {
        "png" => ct::PNG,
        "jpg" | "jpeg" | "jpe" => ct::JPEG,
        "gif" => ct::GIF,
        "bmp" => ct::BMP,
        "tif" | "tiff" => ct::TIFF,
        "emf" => ct::X_EMF,
        "wmf" => ct::X_WMF,
        "wdp" => ct::MS_PHOTO,
        _ => {
            return Err(OpcError::InvalidValue(format!(
                "unsupported image extension '{}'",
                ext
            )));
        },
    };
    Ok(content_type)
}

/// Extension of a filename without its dot, lower-cased. `None` when the
/// name has no extension.
pub fn filename_ext(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_hex() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_content_type_for_ext() {
        assert_eq!(content_type_for_ext("PNG").unwrap(), "image/png");
        assert_eq!(content_type_for_ext("jpg").unwrap(), "image/jpeg");
        assert!(content_type_for_ext("psd").is_err());
    }

    #[test]
    fn test_filename_ext() {
        assert_eq!(filename_ext("photos/Cat.JPG").as_deref(), Some("jpg"));
        assert_eq!(filename_ext("C:\\img\\logo.png").as_deref(), Some("png"));
        assert_eq!(filename_ext("README"), None);
        assert_eq!(filename_ext(".hidden"), None);
    }
}
