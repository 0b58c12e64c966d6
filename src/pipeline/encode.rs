//! Payload encoding for the two reader backends.
//!
//! The file reader uploads the PDF itself as a base64 data URL. The
//! page-image reader sends lossless PNGs so thin table digits survive.

use crate::error::ReaderError;
use crate::model::Attachment;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// `data:application/pdf;base64,...` for an attachment.
pub fn pdf_data_url(attachment: &Attachment) -> String {
    format!("data:application/pdf;base64,{}", STANDARD.encode(&attachment.bytes))
}

/// PNG-encode every rendered page for a vision request.
pub fn encode_pages(filename: &str, pages: &[DynamicImage]) -> Result<Vec<ImageData>, ReaderError> {
    pages
        .iter()
        .enumerate()
        .map(|(i, img)| {
            let mut png = Vec::new();
            img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                .map_err(|e| ReaderError::Document {
                    filename: filename.to_string(),
                    detail: format!("PNG encoding of page {} failed: {e}", i + 1),
                })?;
            debug!("{}: page {} PNG is {} bytes", filename, i + 1, png.len());
            Ok(ImageData::new(STANDARD.encode(&png), "image/png").with_detail("high"))
        })
        .collect()
}
