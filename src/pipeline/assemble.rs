//! Page assembly: turn fetched SVG pages into one PDF.
//!
//! ## Why spawn_blocking?
//!
//! Both halves of the work are CPU-bound and synchronous: `resvg` rasterises
//! each page, and pdfium (a C++ library with thread-local state) composes
//! the document. Running them on the blocking pool keeps the Tokio workers
//! free for any fetches still in flight elsewhere.
//!
//! ## Page geometry
//!
//! Each SVG is scaled uniformly to fit an A4 page (595 × 842 pt) and
//! anchored at the top-left corner. The bitmap is rendered at the
//! configured DPI for that fitted size, so output resolution does not
//! depend on the SVG's own units.

use crate::error::ScoreError;
use crate::pipeline::fetch::ScratchPage;
use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use resvg::{tiny_skia, usvg};
use std::path::Path;
use tracing::{debug, info};

/// A4 portrait in PDF points.
pub const A4_WIDTH_PT: f32 = 595.0;
pub const A4_HEIGHT_PT: f32 = 842.0;

/// Combines per-page files into a single artifact.
///
/// `pages` arrive sorted by index. Implementations must append them in
/// exactly that order.
#[async_trait]
pub trait PageAssembler: Send + Sync {
    async fn assemble(&self, pages: &[ScratchPage]) -> Result<Vec<u8>, ScoreError>;
}

/// Rasterise SVG pages and compose them into an A4 PDF with pdfium.
#[derive(Debug, Clone, Copy)]
pub struct PdfAssembler {
    pub dpi: u32,
}

impl PdfAssembler {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }
}

#[async_trait]
impl PageAssembler for PdfAssembler {
    async fn assemble(&self, pages: &[ScratchPage]) -> Result<Vec<u8>, ScoreError> {
        let paths: Vec<_> = pages.iter().map(|p| (p.index, p.path.clone())).collect();
        let dpi = self.dpi;

        tokio::task::spawn_blocking(move || {
            let mut rendered = Vec::with_capacity(paths.len());
            for (index, path) in &paths {
                rendered.push(rasterise_page(*index, path, dpi)?);
            }
            compose_pdf(&rendered)
        })
        .await
        .map_err(|e| ScoreError::Internal(format!("Assembly task panicked: {}", e)))?
    }
}

/// One page bitmap and its placed size in points.
struct FittedPage {
    image: DynamicImage,
    width_pt: f32,
    height_pt: f32,
}

/// Uniform scale factor that fits `width × height` inside A4.
pub fn fit_to_a4(width: f32, height: f32) -> f32 {
    (A4_WIDTH_PT / width).min(A4_HEIGHT_PT / height)
}

fn rasterise_page(index: usize, path: &Path, dpi: u32) -> Result<FittedPage, ScoreError> {
    let data = std::fs::read(path).map_err(|e| ScoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let tree = usvg::Tree::from_data(&data, &usvg::Options::default())
        .map_err(|e| ScoreError::parse(format!("SVG page {}", index + 1), e.to_string()))?;

    let size = tree.size();
    let (svg_w, svg_h) = (size.width(), size.height());
    let scale = fit_to_a4(svg_w, svg_h);
    let (width_pt, height_pt) = (svg_w * scale, svg_h * scale);

    let px_per_pt = dpi as f32 / 72.0;
    let px_w = (width_pt * px_per_pt).round().max(1.0) as u32;
    let px_h = (height_pt * px_per_pt).round().max(1.0) as u32;

    let mut pixmap = tiny_skia::Pixmap::new(px_w, px_h).ok_or_else(|| {
        ScoreError::Internal(format!("Cannot allocate {}x{} bitmap", px_w, px_h))
    })?;
    pixmap.fill(tiny_skia::Color::WHITE);
    let transform = tiny_skia::Transform::from_scale(px_w as f32 / svg_w, px_h as f32 / svg_h);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    // Opaque after the white fill, so premultiplied and straight RGBA agree.
    let image = RgbaImage::from_raw(px_w, px_h, pixmap.take())
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| ScoreError::Internal("Bitmap buffer size mismatch".into()))?;

    debug!(
        "Rasterised page {} → {}x{} px ({:.0}x{:.0} pt)",
        index + 1,
        px_w,
        px_h,
        width_pt,
        height_pt
    );

    Ok(FittedPage {
        image: DynamicImage::ImageRgb8(image.to_rgb8()),
        width_pt,
        height_pt,
    })
}

fn compose_pdf(pages: &[FittedPage]) -> Result<Vec<u8>, ScoreError> {
    let pdfium = bind_pdfium()?;
    let pdf_err = |e: PdfiumError| ScoreError::Internal(format!("pdfium: {:?}", e));

    let mut document = pdfium.create_new_pdf().map_err(pdf_err)?;
    for page in pages {
        let mut pdf_page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .map_err(pdf_err)?;
        // PDF origin is bottom-left; anchor the image to the top edge.
        let y = A4_HEIGHT_PT - page.height_pt;
        pdf_page
            .objects_mut()
            .create_image_object(
                PdfPoints::new(0.0),
                PdfPoints::new(y),
                &page.image,
                Some(PdfPoints::new(page.width_pt)),
                Some(PdfPoints::new(page.height_pt)),
            )
            .map_err(pdf_err)?;
    }

    let bytes = document.save_to_bytes().map_err(pdf_err)?;
    info!("Assembled {} page(s) into {} byte PDF", pages.len(), bytes.len());
    Ok(bytes)
}

/// Bind pdfium from `PDFIUM_LIB_PATH` when set, else the system library.
fn bind_pdfium() -> Result<Pdfium, ScoreError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) => Pdfium::bind_to_library(&path),
        Err(_) => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ScoreError::PdfEngineUnavailable(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}
