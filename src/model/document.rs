//! Extracted document structure.

use serde::{Deserialize, Serialize};

use super::TextBlock;

/// Text layer of one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    /// Zero-based page index
    pub page_index: usize,

    /// Page width in points (1 point = 1/72 inch)
    pub width: f32,

    /// Page height in points
    pub height: f32,

    /// Blocks in reading order
    pub blocks: Vec<TextBlock>,
}

impl ExtractedPage {
    pub fn new(page_index: usize, width: f32, height: f32) -> Self {
        Self {
            page_index,
            width,
            height,
            blocks: Vec::new(),
        }
    }
}

/// Address of a block inside an [`ExtractedDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    /// Position of the page in [`ExtractedDocument::pages`]
    pub page: usize,
    /// Position of the block in that page's `blocks`
    pub block: usize,
}

/// The result of text extraction: pages in document order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// PDF version from the file header
    pub pdf_version: String,

    /// Total page count of the source, including unselected pages
    pub page_count: usize,

    /// Extracted pages (only the selected ones)
    pub pages: Vec<ExtractedPage>,
}

impl ExtractedDocument {
    /// Look up a block by reference.
    pub fn block(&self, r: BlockRef) -> Option<&TextBlock> {
        self.pages.get(r.page).and_then(|p| p.blocks.get(r.block))
    }

    /// All blocks in reading order, with their references.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockRef, &TextBlock)> {
        self.pages.iter().enumerate().flat_map(|(page, p)| {
            p.blocks
                .iter()
                .enumerate()
                .map(move |(block, b)| (BlockRef { page, block }, b))
        })
    }

    pub fn block_count(&self) -> usize {
        self.pages.iter().map(|p| p.blocks.len()).sum()
    }

    /// Whether no page produced any text.
    pub fn is_empty(&self) -> bool {
        self.block_count() == 0
    }

    /// Page metadata for a zero-based source page index.
    pub fn page_by_index(&self, page_index: usize) -> Option<&ExtractedPage> {
        self.pages.iter().find(|p| p.page_index == page_index)
    }
}
