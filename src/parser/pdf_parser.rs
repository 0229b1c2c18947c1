//! PDF text-layer extraction using lopdf.

use std::path::Path;

use lopdf::{Document as LopdfDocument, Object, ObjectId};
use rayon::prelude::*;
use regex::Regex;

use crate::detect::{pdf_version_from_bytes, pdf_version_from_path};
use crate::error::{Error, Result};
use crate::model::{ExtractedDocument, ExtractedPage};

use super::layout::LayoutAnalyzer;
use super::options::{ErrorMode, ExtractOptions};

/// US Letter, used when a page has no usable MediaBox.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// A block holding nothing but a page number ("12", "- 12 -", "Page 12").
const PAGE_NUMBER_PATTERN: &str = r"^\s*(?:[Pp]age\s+)?[-–—]?\s*\d{1,4}\s*[-–—]?\s*$";

/// PDF text-layer extractor.
pub struct PdfParser {
    doc: LopdfDocument,
    options: ExtractOptions,
    page_number: Regex,
}

impl PdfParser {
    /// Open a PDF file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ExtractOptions::default())
    }

    /// Open a PDF file with custom options.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ExtractOptions) -> Result<Self> {
        let path = path.as_ref();
        pdf_version_from_path(path)?;

        let data = std::fs::read(path)?;
        Self::from_bytes_with_options(&data, options)
    }

    /// Parse a PDF from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with_options(data, ExtractOptions::default())
    }

    /// Parse a PDF from bytes with custom options.
    pub fn from_bytes_with_options(data: &[u8], options: ExtractOptions) -> Result<Self> {
        // Reject non-PDF input before handing it to lopdf
        pdf_version_from_bytes(data)?;

        let doc = LopdfDocument::load_mem(data)?;
        if doc.is_encrypted() {
            return Err(Error::UnreadableDocument("document is encrypted".to_string()));
        }

        let page_number =
            Regex::new(PAGE_NUMBER_PATTERN).map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            doc,
            options,
            page_number,
        })
    }

    /// Total number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Get the PDF version.
    pub fn version(&self) -> String {
        self.doc.version.to_string()
    }

    /// Extract the text layer of the selected pages.
    ///
    /// Fails with [`Error::UnreadableDocument`] when no selected page yields
    /// any text (for example a scanned document without OCR).
    pub fn extract(&self) -> Result<ExtractedDocument> {
        let page_ids = self.doc.get_pages();
        let selected: Vec<(usize, ObjectId)> = page_ids
            .iter()
            .filter(|(num, _)| self.options.pages.includes(**num))
            .map(|(num, id)| ((*num as usize).saturating_sub(1), *id))
            .collect();

        log::debug!(
            "extracting {} of {} page(s){}",
            selected.len(),
            page_ids.len(),
            if self.options.parallel { " in parallel" } else { "" }
        );

        let pages: Vec<ExtractedPage> = if self.options.parallel {
            selected
                .par_iter()
                .map(|&(index, id)| self.extract_page(index, id))
                .collect::<Result<_>>()?
        } else {
            selected
                .iter()
                .map(|&(index, id)| self.extract_page(index, id))
                .collect::<Result<_>>()?
        };

        let document = ExtractedDocument {
            pdf_version: self.version(),
            page_count: page_ids.len(),
            pages,
        };

        if document.is_empty() {
            return Err(Error::UnreadableDocument(
                "no extractable text layer".to_string(),
            ));
        }

        log::info!(
            "extracted {} block(s) from {} page(s)",
            document.block_count(),
            document.pages.len()
        );
        Ok(document)
    }

    fn extract_page(&self, page_index: usize, page_id: ObjectId) -> Result<ExtractedPage> {
        let (width, height) = page_size(&self.doc, page_id);
        let mut page = ExtractedPage::new(page_index, width, height);

        match LayoutAnalyzer::new(&self.doc).analyze_page(page_index, page_id) {
            Ok(blocks) => {
                let min = self.options.min_block_chars;
                page.blocks = blocks
                    .into_iter()
                    .filter(|b| b.text.trim().chars().count() >= min)
                    .filter(|b| !self.page_number.is_match(&b.text))
                    .collect();
            }
            Err(e) => {
                if self.options.error_mode == ErrorMode::Strict {
                    return Err(e);
                }
                log::warn!("Failed to extract text from page {}: {}", page_index + 1, e);
            }
        }

        Ok(page)
    }
}

/// Page size from the MediaBox, following `/Parent` inheritance.
///
/// Falls back to US Letter when no usable box is found.
pub(crate) fn page_size(doc: &LopdfDocument, page_id: ObjectId) -> (f32, f32) {
    let mut current = doc.get_dictionary(page_id).ok();
    // Bounded walk in case of a cyclic page tree
    for _ in 0..32 {
        let Some(dict) = current else { break };
        if let Some(size) = dict
            .get(b"MediaBox")
            .ok()
            .and_then(|o| media_box_size(doc, o))
        {
            return size;
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    DEFAULT_PAGE_SIZE
}

fn media_box_size(doc: &LopdfDocument, obj: &Object) -> Option<(f32, f32)> {
    let array = match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
        other => other.as_array().ok()?,
    };
    if array.len() < 4 {
        return None;
    }
    let n: Vec<f32> = array.iter().filter_map(|o| o.as_float().ok()).collect();
    (n.len() >= 4).then(|| ((n[2] - n[0]).abs(), (n[3] - n[1]).abs()))
}
