//! Page rasterization for layout analysis.
//!
//! [`PageRenderer`] is a seam so the analyzer can be exercised without a
//! pdfium binary; [`PdfiumRenderer`] is the production implementation.
//! Rendering is synchronous — pdfium is not async-safe, and pages are
//! processed one at a time anyway.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use pdfium_render::prelude::*;

/// Renders every page of a PDF to an image at a target width.
pub trait PageRenderer: Send + Sync {
    fn render_pages(&self, pdf_path: &Path, target_width: u32) -> Result<Vec<DynamicImage>>;
}

/// pdfium-backed renderer. Binds the system pdfium library once at
/// construction and reuses it for every document.
pub struct PdfiumRenderer {
    pdfium: Pdfium,
}

impl PdfiumRenderer {
    /// Bind pdfium from the current directory or the system library path.
    pub fn new() -> Result<Self> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| anyhow!("failed to bind pdfium library: {:?}", e))?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_pages(&self, pdf_path: &Path, target_width: u32) -> Result<Vec<DynamicImage>> {
        let path_str = pdf_path
            .to_str()
            .with_context(|| format!("non-UTF-8 path: {}", pdf_path.display()))?;

        let document = self
            .pdfium
            .load_pdf_from_file(path_str, None)
            .map_err(|e| anyhow!("failed to open {}: {:?}", pdf_path.display(), e))?;

        let render_config = PdfRenderConfig::new().set_target_width(target_width as i32);

        let mut images = Vec::new();
        for page in document.pages().iter() {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| anyhow!("failed to render page of {}: {:?}", pdf_path.display(), e))?;
            images.push(bitmap.as_image());
        }
        Ok(images)
    }
}
