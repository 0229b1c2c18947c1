//! Document model types shared by the pipeline stages.
//!
//! Extraction produces [`ExtractedDocument`] (pages of positioned
//! [`TextBlock`]s), the analysis stage produces [`AnnotationRequest`]s, and the
//! resolver turns those into [`ResolvedSpan`]s that the annotator draws.

mod annotation;
mod document;
mod geometry;
mod text;

pub use annotation::{AnnotationKind, AnnotationRequest, ResolvedSpan, Rgb};
pub use document::{BlockRef, ExtractedDocument, ExtractedPage};
pub use geometry::BBox;
pub use text::{TextBlock, TextLine, TextRun};

pub(crate) use text::is_spaceless_script_char;
