//! Image loading: receipt file → media type → base64 data URL.
//!
//! The whole file is read before any provider is contacted, so a missing or
//! unreadable image fails the run without a single network call. The media
//! type is chosen by [`MediaTypePolicy`]: sniffed from magic bytes by
//! default, or declared by the caller.

use crate::config::MediaTypePolicy;
use crate::error::ReceiptError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A receipt image ready to embed in a chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Where the bytes came from; `None` for in-memory input.
    pub source: Option<PathBuf>,
    /// Media type declared in the data URL, e.g. `image/jpeg`.
    pub media_type: String,
    /// Size of the raw image in bytes.
    pub byte_len: usize,
    data_url: String,
}

impl ImagePayload {
    /// Build a payload from raw bytes.
    ///
    /// `origin` is only used in error messages.
    pub fn from_bytes(
        bytes: &[u8],
        policy: &MediaTypePolicy,
        origin: &Path,
    ) -> Result<Self, ReceiptError> {
        if bytes.is_empty() {
            return Err(ReceiptError::EmptyImage {
                path: origin.to_path_buf(),
            });
        }

        let media_type = resolve_media_type(bytes, policy, origin)?;
        let data_url = to_data_url(&media_type, bytes);
        debug!(
            "Encoded {} ({} bytes, {}) → {} bytes data URL",
            origin.display(),
            bytes.len(),
            media_type,
            data_url.len()
        );

        Ok(Self {
            source: None,
            media_type,
            byte_len: bytes.len(),
            data_url,
        })
    }

    /// The `data:<mime>;base64,<payload>` string.
    pub fn data_url(&self) -> &str {
        &self.data_url
    }
}

/// Read the image at `path` fully into memory and encode it.
pub async fn load_image(path: &Path, policy: &MediaTypePolicy) -> Result<ImagePayload, ReceiptError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ReceiptError::ImageNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => ReceiptError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ReceiptError::ImageReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let mut payload = ImagePayload::from_bytes(&bytes, policy, path)?;
    payload.source = Some(path.to_path_buf());
    Ok(payload)
}

/// Choose the media type for `bytes` according to `policy`.
pub fn resolve_media_type(
    bytes: &[u8],
    policy: &MediaTypePolicy,
    origin: &Path,
) -> Result<String, ReceiptError> {
    match policy {
        MediaTypePolicy::AssumeJpeg => Ok("image/jpeg".to_string()),
        MediaTypePolicy::Declared(mime) => Ok(mime.clone()),
        MediaTypePolicy::Sniff => sniff_media_type(bytes)
            .map(str::to_string)
            .ok_or_else(|| ReceiptError::UnsupportedImage {
                path: origin.to_path_buf(),
            }),
    }
}

/// Detect the media type from magic bytes. Only formats the chat APIs
/// accept are recognised.
pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        fmt @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP) => {
            Some(fmt.to_mime_type())
        }
        _ => None,
    }
}

/// Encode bytes as a base64 data URL.
pub fn to_data_url(media_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", media_type, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");
        buf
    }

    #[test]
    fn sniffs_png_and_jpeg() {
        assert_eq!(sniff_media_type(&png_bytes()), Some("image/png"));
        assert_eq!(
            sniff_media_type(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F']),
            Some("image/jpeg")
        );
        assert_eq!(sniff_media_type(b"GIF89a\x01\x00"), Some("image/gif"));
    }

    #[test]
    fn unknown_bytes_are_unsupported_when_sniffing() {
        let err = resolve_media_type(b"%PDF-1.7", &MediaTypePolicy::Sniff, Path::new("r.pdf"))
            .unwrap_err();
        assert!(matches!(err, ReceiptError::UnsupportedImage { .. }));
    }

    #[test]
    fn bmp_and_tiff_are_not_sent_when_sniffing() {
        let bmp = b"BM\x3a\x00\x00\x00\x00\x00\x00\x00\x36\x00\x00\x00";
        assert_eq!(sniff_media_type(bmp), None);
        let err = resolve_media_type(bmp, &MediaTypePolicy::Sniff, Path::new("r.bmp")).unwrap_err();
        assert!(matches!(err, ReceiptError::UnsupportedImage { .. }));

        assert_eq!(sniff_media_type(b"II*\x00\x08\x00\x00\x00"), None);

        let declared = MediaTypePolicy::Declared("image/bmp".into());
        assert_eq!(
            resolve_media_type(bmp, &declared, Path::new("r.bmp")).unwrap(),
            "image/bmp"
        );
    }

    #[test]
    fn assume_jpeg_ignores_content() {
        let mime =
            resolve_media_type(&png_bytes(), &MediaTypePolicy::AssumeJpeg, Path::new("r.png"))
                .unwrap();
        assert_eq!(mime, "image/jpeg");
    }

    #[test]
    fn declared_type_wins() {
        let policy = MediaTypePolicy::Declared("image/webp".into());
        let mime = resolve_media_type(b"anything", &policy, Path::new("x")).unwrap();
        assert_eq!(mime, "image/webp");
    }

    #[test]
    fn data_url_round_trips_payload() {
        let bytes = png_bytes();
        let payload =
            ImagePayload::from_bytes(&bytes, &MediaTypePolicy::Sniff, Path::new("r.png")).unwrap();
        let url = payload.data_url();
        let b64 = url
            .strip_prefix("data:image/png;base64,")
            .expect("data URL prefix");
        assert_eq!(STANDARD.decode(b64).unwrap(), bytes);
        assert_eq!(payload.byte_len, bytes.len());
    }

    #[test]
    fn empty_bytes_rejected() {
        let err = ImagePayload::from_bytes(&[], &MediaTypePolicy::AssumeJpeg, Path::new("e.jpg"))
            .unwrap_err();
        assert!(matches!(err, ReceiptError::EmptyImage { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = load_image(
            Path::new("/definitely/not/a/receipt.jpeg"),
            &MediaTypePolicy::Sniff,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReceiptError::ImageNotFound { .. }));
    }

    #[tokio::test]
    async fn loads_file_and_records_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.png");
        std::fs::write(&path, png_bytes()).unwrap();

        let payload = load_image(&path, &MediaTypePolicy::Sniff).await.unwrap();
        assert_eq!(payload.media_type, "image/png");
        assert_eq!(payload.source.as_deref(), Some(path.as_path()));
    }
}
