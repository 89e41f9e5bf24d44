use crate::error::IngestError;
use pdfium_render::prelude::*;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Span geometry in page coordinates, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanBounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// One contiguous text run as reported by the PDF library.
#[derive(Debug, Clone)]
pub struct TextSpan {
    pub text: String,
    pub bounds: SpanBounds,
}

#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// 1-based page number.
    pub number: u32,
    pub full_text: String,
    pub spans: Vec<TextSpan>,
}

/// The PDF library seam: something that can report a page count and yield
/// per-page text spans with geometry.
pub trait PageSource {
    fn page_count(&self) -> Result<u32, IngestError>;
    fn extract_page(&self, number: u32) -> Result<ExtractedPage, IngestError>;
}

/// Production page source backed by pdfium. The document is re-opened per
/// call; the pipeline walks pages once, sequentially.
pub struct PdfiumSource {
    pdfium: Pdfium,
    path: PathBuf,
}

impl PdfiumSource {
    /// Binds the pdfium library from `PDFIUM_DYNAMIC_LIB_PATH`, then the
    /// working directory, then the system paths.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, IngestError> {
        let lib_dir =
            std::env::var("PDFIUM_DYNAMIC_LIB_PATH").unwrap_or_else(|_| "./".to_string());

        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
            lib_dir.as_str(),
        ))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|error| {
            IngestError::PdfParse(format!("failed to load the pdfium library: {error:?}"))
        })?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
            path: path.into(),
        })
    }

    fn load(&self) -> Result<PdfDocument<'_>, IngestError> {
        self.pdfium
            .load_pdf_from_file(&self.path, None)
            .map_err(|error| {
                IngestError::PdfParse(format!("{}: {error:?}", self.path.display()))
            })
    }
}

impl PageSource for PdfiumSource {
    fn page_count(&self) -> Result<u32, IngestError> {
        let document = self.load()?;
        Ok(document.pages().len() as u32)
    }

    fn extract_page(&self, number: u32) -> Result<ExtractedPage, IngestError> {
        if number == 0 {
            return Err(IngestError::InvalidArgument(
                "page numbers are 1-based".to_string(),
            ));
        }

        let document = self.load()?;
        let pages = document.pages();
        let page = pages
            .get((number - 1) as u16)
            .map_err(|error| IngestError::PdfParse(format!("page {number}: {error:?}")))?;

        let page_height = page.height().value;
        let text = page
            .text()
            .map_err(|error| IngestError::PdfParse(format!("page {number} text: {error:?}")))?;
        let full_text = text.all();

        let mut spans = Vec::new();
        for segment in text.segments().iter() {
            let content = segment.text();
            if content.trim().is_empty() {
                continue;
            }

            let rect = segment.bounds();
            spans.push(TextSpan {
                text: content,
                bounds: to_top_left(
                    rect.left.value,
                    rect.top.value,
                    rect.right.value,
                    rect.bottom.value,
                    page_height,
                ),
            });
        }

        Ok(ExtractedPage {
            number,
            full_text,
            spans,
        })
    }
}

/// pdfium reports rects with a bottom-left origin; blocks are stored with a
/// top-left origin like the rest of the pipeline.
pub fn to_top_left(left: f32, top: f32, right: f32, bottom: f32, page_height: f32) -> SpanBounds {
    SpanBounds {
        left,
        top: page_height - top,
        right,
        bottom: page_height - bottom,
    }
}

/// Idempotency key for a page: SHA-256 over the page text and the rounded
/// geometry of every span. Stable across runs for an unchanged PDF.
pub fn page_sha(page: &ExtractedPage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(page.number.to_le_bytes());
    hasher.update(page.full_text.as_bytes());

    for span in &page.spans {
        hasher.update(span.text.as_bytes());
        for value in [
            span.bounds.left,
            span.bounds.top,
            span.bounds.right,
            span.bounds.bottom,
        ] {
            hasher.update((value.round() as i32).to_le_bytes());
        }
    }

    format!("{:x}", hasher.finalize())
}
