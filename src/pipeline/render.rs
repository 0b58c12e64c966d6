//! PDF rasterisation for the page-image reader.
//!
//! pdfium is a blocking C library, so rendering runs on the blocking pool.
//! The longest edge of each page is capped in pixels rather than by DPI:
//! the daily report is a single A4 table and 1600 px keeps every digit of the
//! unit-value column legible without inflating the request.

use crate::error::{PipelineError, ReaderError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Longest rendered edge in pixels.
pub const MAX_RENDERED_PIXELS: u32 = 1600;

/// Environment variable pointing at a pdfium shared library (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then the system loader.
pub fn bind_pdfium() -> Result<Pdfium, PipelineError> {
    if let Ok(raw) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        let path = PathBuf::from(raw.trim());
        let lib = if path.is_dir() {
            path.join(platform_library_name())
        } else {
            path.clone()
        };
        match Pdfium::bind_to_library(&lib) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", lib.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => warn!(
                "{}={} could not be loaded ({}), trying system library",
                PDFIUM_LIB_PATH_ENV,
                path.display(),
                e
            ),
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| PipelineError::PdfiumBindingFailed(e.to_string()))
}

/// File name of the pdfium shared library on this platform.
fn platform_library_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "libpdfium.dylib",
        "windows" => "pdfium.dll",
        _ => "libpdfium.so",
    }
}

/// Render up to `max_pages` pages of an in-memory PDF.
pub async fn render_pdf(
    filename: &str,
    bytes: Vec<u8>,
    max_pages: usize,
) -> Result<Vec<DynamicImage>, ReaderError> {
    let name = filename.to_string();
    tokio::task::spawn_blocking(move || render_blocking(&name, &bytes, max_pages))
        .await
        .map_err(|e| ReaderError::Document {
            filename: filename.to_string(),
            detail: format!("render task panicked: {e}"),
        })?
}

fn render_blocking(
    filename: &str,
    bytes: &[u8],
    max_pages: usize,
) -> Result<Vec<DynamicImage>, ReaderError> {
    let doc_err = |detail: String| ReaderError::Document {
        filename: filename.to_string(),
        detail,
    };

    let pdfium = bind_pdfium().map_err(|e| doc_err(e.to_string()))?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| doc_err(format!("not a readable PDF: {e:?}")))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if total == 0 {
        return Err(doc_err("PDF has no pages".into()));
    }
    let count = total.min(max_pages.max(1));
    if count < total {
        info!("{}: rendering first {} of {} pages", filename, count, total);
    }

    let config = PdfRenderConfig::new()
        .set_target_width(MAX_RENDERED_PIXELS as i32)
        .set_maximum_height(MAX_RENDERED_PIXELS as i32);

    let mut images = Vec::with_capacity(count);
    for idx in 0..count {
        let page = pages
            .get(idx as u16)
            .map_err(|e| doc_err(format!("page {}: {e:?}", idx + 1)))?;
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| doc_err(format!("page {}: {e:?}", idx + 1)))?;
        let image = bitmap.as_image();
        debug!("{}: page {} → {}x{}", filename, idx + 1, image.width(), image.height());
        images.push(image);
    }
    Ok(images)
}
