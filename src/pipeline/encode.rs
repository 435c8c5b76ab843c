//! Image encoding: PNG bytes, base64 payloads and transient page files.
//!
//! PNG is used everywhere a page leaves memory because it is lossless; text
//! crispness matters far more than file size for recognition accuracy.

use crate::error::OcrError;
use crate::pipeline::render::Page;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{ImageFormat, RgbImage};
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Encode an RGB raster as PNG.
pub fn png_bytes(image: &RgbImage) -> Result<Vec<u8>, OcrError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| OcrError::Internal(format!("PNG encoding failed: {e}")))?;
    Ok(buf)
}

/// Encode an RGB raster as a base64 PNG string.
pub fn base64_png(image: &RgbImage) -> Result<String, OcrError> {
    let b64 = STANDARD.encode(png_bytes(image)?);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(b64)
}

/// Wrap PNG bytes for a multimodal chat request.
///
/// ## Why `detail: "high"`?
/// OpenAI's tiling algorithm divides images into 512 px tiles. `detail: "high"`
/// enables up to 10 tiles, allowing fine print, small tables and math
/// notation to be seen. `detail: "low"` forces a single 512 px overview tile
/// and loses all fine structure.
pub fn image_data(png: &[u8]) -> ImageData {
    ImageData::new(STANDARD.encode(png), "image/png").with_detail("high")
}

/// Persist a page as a PNG inside `dir`.
///
/// The file is deleted when the returned handle drops, on success and on
/// error alike.
pub fn write_page_file(page: &Page, dir: &Path) -> Result<NamedTempFile, OcrError> {
    let png = png_bytes(page.image())?;
    let mut file = tempfile::Builder::new()
        .prefix(&format!("page{}_", page.index()))
        .suffix(".png")
        .tempfile_in(dir)
        .map_err(|e| OcrError::Internal(format!("Failed to create page file: {e}")))?;
    file.write_all(&png)
        .and_then(|_| file.flush())
        .map_err(|e| OcrError::Internal(format!("Failed to write page file: {e}")))?;
    debug!(
        "Page {} written to {} ({} bytes)",
        page.index(),
        file.path().display(),
        png.len()
    );
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb};

    #[test]
    fn encode_small_image() {
        let img = RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]));
        let b64 = base64_png(&img).expect("encode should succeed");
        let decoded = STANDARD.decode(&b64).expect("valid base64");
        assert!(decoded.starts_with(b"\x89PNG"));
    }

    #[test]
    fn image_data_is_high_detail_png() {
        let data = image_data(b"\x89PNG");
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), b"\x89PNG");
    }

    #[test]
    fn page_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let page = Page::new(2, DynamicImage::new_rgb8(3, 3));
        let file = write_page_file(&page, dir.path()).unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
        drop(file);
        assert!(!path.exists());
    }
}
