//! Annotation requests from the model and their resolved placements.

use serde::{Deserialize, Serialize};

use super::BBox;

/// What the model asked to annotate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotationRequest {
    /// An important sentence, highlighted with an explanatory comment
    KeyPoint { quoted_text: String, comment: String },

    /// A technical term, highlighted with its translation
    Term {
        quoted_text: String,
        translation: String,
    },

    /// A paragraph, marked at its start with a summary note
    ParagraphSummary {
        quoted_text_prefix: String,
        summary: String,
    },
}

impl AnnotationRequest {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            AnnotationRequest::KeyPoint { .. } => AnnotationKind::KeyPoint,
            AnnotationRequest::Term { .. } => AnnotationKind::Term,
            AnnotationRequest::ParagraphSummary { .. } => AnnotationKind::ParagraphSummary,
        }
    }

    /// The text to look for on the page.
    pub fn quote(&self) -> &str {
        match self {
            AnnotationRequest::KeyPoint { quoted_text, .. }
            | AnnotationRequest::Term { quoted_text, .. } => quoted_text,
            AnnotationRequest::ParagraphSummary {
                quoted_text_prefix, ..
            } => quoted_text_prefix,
        }
    }

    /// The text shown in the popup.
    pub fn note(&self) -> &str {
        match self {
            AnnotationRequest::KeyPoint { comment, .. } => comment,
            AnnotationRequest::Term { translation, .. } => translation,
            AnnotationRequest::ParagraphSummary { summary, .. } => summary,
        }
    }
}

/// Discriminant of [`AnnotationRequest`], used for colours and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    KeyPoint,
    Term,
    ParagraphSummary,
}

/// An annotation request located on a page.
///
/// `boxes` holds one rectangle per rendered line covered by the quote; it is
/// empty when the quote could not be found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSpan {
    /// Zero-based page index
    pub page_index: usize,
    pub boxes: Vec<BBox>,
    pub request: AnnotationRequest,
}

impl ResolvedSpan {
    pub fn is_resolved(&self) -> bool {
        !self.boxes.is_empty()
    }
}

/// An RGB colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb(pub [f32; 3]);

impl Rgb {
    pub const YELLOW: Rgb = Rgb([1.0, 1.0, 0.0]);
    pub const LIGHT_BLUE: Rgb = Rgb([0.5, 0.8, 1.0]);
    pub const LIGHT_RED: Rgb = Rgb([1.0, 0.7, 0.7]);

    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|c| (0.0..=1.0).contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accessors() {
        let term = AnnotationRequest::Term {
            quoted_text: "amygdala".into(),
            translation: "杏仁核".into(),
        };
        assert_eq!(term.kind(), AnnotationKind::Term);
        assert_eq!(term.quote(), "amygdala");
        assert_eq!(term.note(), "杏仁核");

        let summary = AnnotationRequest::ParagraphSummary {
            quoted_text_prefix: "We recruited".into(),
            summary: "Sampling procedure".into(),
        };
        assert_eq!(summary.quote(), "We recruited");
        assert_eq!(summary.kind(), AnnotationKind::ParagraphSummary);
    }

    #[test]
    fn test_rgb_validation() {
        assert!(Rgb::YELLOW.is_valid());
        assert!(!Rgb([1.2, 0.0, 0.0]).is_valid());
        assert!(!Rgb([0.0, -0.1, 0.0]).is_valid());
    }
}
