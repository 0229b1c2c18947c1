//! PDF text extraction.

mod layout;
mod options;
mod pdf_parser;

pub use layout::{blocks_from_spans, LayoutAnalyzer, TextSpan};
pub use options::{ErrorMode, ExtractOptions, PageSelection};
pub use pdf_parser::PdfParser;

pub(crate) use pdf_parser::page_size;
