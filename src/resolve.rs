//! Mapping quoted text back to page coordinates.
//!
//! The quote is searched in the chunk's blocks joined by single spaces, so a
//! match may run across line wraps and block boundaries. The matched character
//! range is then cut per rendered line and each piece is converted to a box.

use crate::chunk::Chunk;
use crate::model::{AnnotationKind, AnnotationRequest, BBox, ExtractedDocument, ResolvedSpan};

/// Where a character of the search text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CharOrigin {
    /// Position of the block in the chunk
    slot: usize,
    line: usize,
    offset: usize,
}

/// Searchable text of one chunk with per-character provenance.
struct SearchText {
    chars: Vec<char>,
    /// `None` for separators inserted between lines and blocks
    origins: Vec<Option<CharOrigin>>,
}

impl SearchText {
    fn build(doc: &ExtractedDocument, chunk: &Chunk) -> Self {
        let mut chars = Vec::new();
        let mut origins = Vec::new();

        for (slot, block) in chunk
            .blocks
            .iter()
            .filter_map(|r| doc.block(*r))
            .enumerate()
        {
            if slot > 0 {
                chars.push(' ');
                origins.push(None);
            }
            for (idx, c) in block.text.chars().enumerate() {
                chars.push(c);
                origins.push(block.locate(idx).map(|(line, offset)| CharOrigin {
                    slot,
                    line,
                    offset,
                }));
            }
        }

        Self { chars, origins }
    }

    /// Char range of the first exact occurrence.
    fn find_exact(&self, quote: &str) -> Option<(usize, usize)> {
        let needle: Vec<char> = quote.chars().collect();
        find_chars(&self.chars, &needle).map(|start| (start, start + needle.len()))
    }

    /// Char range of the first occurrence after collapsing whitespace (and
    /// lower-casing when `fold_case`).
    fn find_normalized(&self, quote: &str, fold_case: bool) -> Option<(usize, usize)> {
        let (needle, _) = normalize(quote.trim().chars(), fold_case);
        if needle.is_empty() {
            return None;
        }
        let (haystack, map) = normalize(self.chars.iter().copied(), fold_case);
        let start = find_chars(&haystack, &needle)?;
        let end = start + needle.len();
        Some((map[start], map[end - 1] + 1))
    }
}

/// Collapse whitespace runs into one space, optionally lower-casing.
///
/// Returns the normalized characters and, for each, the index of the source
/// character it came from.
fn normalize(chars: impl Iterator<Item = char>, fold_case: bool) -> (Vec<char>, Vec<usize>) {
    let mut out = Vec::new();
    let mut map = Vec::new();
    let mut in_space = false;

    for (idx, c) in chars.enumerate() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
                map.push(idx);
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if fold_case {
            for lower in c.to_lowercase() {
                out.push(lower);
                map.push(idx);
            }
        } else {
            out.push(c);
            map.push(idx);
        }
    }

    (out, map)
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Locate an annotation request within the chunk that produced it.
///
/// Returns a [`ResolvedSpan`] with no boxes when the quote is not found.
pub fn resolve(doc: &ExtractedDocument, chunk: &Chunk, request: AnnotationRequest) -> ResolvedSpan {
    let fallback_page = chunk
        .blocks
        .first()
        .and_then(|r| doc.block(*r))
        .map_or(0, |b| b.page_index);
    let unresolved = |request| ResolvedSpan {
        page_index: fallback_page,
        boxes: Vec::new(),
        request,
    };

    let quote = request.quote();
    if quote.trim().is_empty() {
        return unresolved(request);
    }

    let text = SearchText::build(doc, chunk);
    let fold_case = request.kind() == AnnotationKind::Term;
    let range = text.find_exact(quote).or_else(|| {
        let found = text.find_normalized(quote, fold_case);
        if found.is_some() {
            log::debug!("matched {:?} after normalization", quote);
        }
        found
    });

    let Some((start, end)) = range else {
        return unresolved(request);
    };

    let blocks: Vec<_> = chunk.blocks.iter().filter_map(|r| doc.block(*r)).collect();
    let Some((page_index, boxes)) = line_boxes(&blocks, &text.origins[start..end]) else {
        return unresolved(request);
    };

    ResolvedSpan {
        page_index,
        boxes,
        request,
    }
}

/// One box per rendered line touched by the matched characters, restricted
/// to the page of the first matched character.
fn line_boxes(
    blocks: &[&crate::model::TextBlock],
    origins: &[Option<CharOrigin>],
) -> Option<(usize, Vec<BBox>)> {
    let first = origins.iter().flatten().next()?;
    let page_index = blocks.get(first.slot)?.page_index;

    // (slot, line, first offset, last offset) per touched line, in order
    let mut segments: Vec<(usize, usize, usize, usize)> = Vec::new();
    for origin in origins.iter().flatten() {
        match segments.last_mut() {
            Some(seg) if seg.0 == origin.slot && seg.1 == origin.line => seg.3 = origin.offset,
            _ => segments.push((origin.slot, origin.line, origin.offset, origin.offset)),
        }
    }

    let mut boxes = Vec::new();
    let mut dropped = 0usize;
    for (slot, line, from, to) in segments {
        let Some(block) = blocks.get(slot) else {
            continue;
        };
        if block.page_index != page_index {
            dropped += 1;
            continue;
        }
        if let Some(bbox) = block
            .lines
            .get(line)
            .and_then(|l| l.range_bbox(from, to + 1))
        {
            boxes.push(bbox);
        }
    }

    if dropped > 0 {
        log::debug!(
            "quote continues onto another page; kept page {} only",
            page_index + 1
        );
    }
    (!boxes.is_empty()).then_some((page_index, boxes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockRef, ExtractedPage, TextBlock, TextLine, TextRun};

    /// A block of single-run lines, 10pt high, 5pt per character.
    fn block(page_index: usize, top: f32, lines: &[&str]) -> TextBlock {
        let lines = lines
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let y0 = top - 12.0 * (i as f32 + 1.0);
                let width = 5.0 * text.chars().count() as f32;
                let run = TextRun::new(*text, BBox::new(72.0, y0, 72.0 + width, y0 + 10.0));
                TextLine::from_runs(vec![run], 10.0).unwrap()
            })
            .collect();
        TextBlock::from_lines(page_index, lines).unwrap()
    }

    fn document(pages: Vec<Vec<TextBlock>>) -> (ExtractedDocument, Chunk) {
        let mut refs = Vec::new();
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(p, blocks)| {
                refs.extend((0..blocks.len()).map(|b| BlockRef { page: p, block: b }));
                ExtractedPage {
                    page_index: p,
                    width: 612.0,
                    height: 792.0,
                    blocks,
                }
            })
            .collect();
        let doc = ExtractedDocument {
            pdf_version: "1.7".into(),
            page_count: refs.len(),
            pages,
        };
        let chunk = Chunk {
            chunk_id: 0,
            blocks: refs,
            estimated_token_count: 0,
        };
        (doc, chunk)
    }

    fn key_point(quote: &str) -> AnnotationRequest {
        AnnotationRequest::KeyPoint {
            quoted_text: quote.into(),
            comment: "c".into(),
        }
    }

    fn term(quote: &str) -> AnnotationRequest {
        AnnotationRequest::Term {
            quoted_text: quote.into(),
            translation: "t".into(),
        }
    }

    #[test]
    fn test_exact_match_single_line() {
        let (doc, chunk) = document(vec![vec![block(0, 700.0, &["The amygdala responds."])]]);
        let span = resolve(&doc, &chunk, key_point("amygdala"));

        assert!(span.is_resolved());
        assert_eq!(span.page_index, 0);
        assert_eq!(span.boxes.len(), 1);
        // "The " is 4 chars at 5pt each
        assert!((span.boxes[0].x0 - 92.0).abs() < 1e-3);
        assert!((span.boxes[0].x1 - 132.0).abs() < 1e-3);
    }

    #[test]
    fn test_line_wrap_gives_box_per_line() {
        let (doc, chunk) = document(vec![vec![block(
            0,
            700.0,
            &["We show that oxytocin", "modulates bonding."],
        )]]);
        let span = resolve(&doc, &chunk, key_point("oxytocin modulates"));

        assert_eq!(span.boxes.len(), 2);
        assert!(span.boxes[0].y0 > span.boxes[1].y0);
    }

    #[test]
    fn test_whitespace_normalized_match() {
        let (doc, chunk) = document(vec![vec![block(0, 700.0, &["a strong   effect"])]]);
        let span = resolve(&doc, &chunk, key_point(" a strong effect "));
        assert!(span.is_resolved());
    }

    #[test]
    fn test_case_folding_only_for_terms() {
        let (doc, chunk) = document(vec![vec![block(0, 700.0, &["Functional MRI scans"])]]);

        assert!(resolve(&doc, &chunk, term("functional mri")).is_resolved());
        assert!(!resolve(&doc, &chunk, key_point("functional mri")).is_resolved());
        let summary = AnnotationRequest::ParagraphSummary {
            quoted_text_prefix: "functional".into(),
            summary: "s".into(),
        };
        assert!(!resolve(&doc, &chunk, summary).is_resolved());
    }

    #[test]
    fn test_absent_and_empty_quotes() {
        let (doc, chunk) = document(vec![vec![block(0, 700.0, &["Some text here"])]]);
        assert!(!resolve(&doc, &chunk, key_point("not present")).is_resolved());
        assert!(!resolve(&doc, &chunk, key_point("   ")).is_resolved());
    }

    #[test]
    fn test_match_across_blocks() {
        let (doc, chunk) = document(vec![vec![
            block(0, 700.0, &["End of one."]),
            block(0, 600.0, &["Start of two."]),
        ]]);
        let span = resolve(&doc, &chunk, key_point("one. Start"));
        assert_eq!(span.boxes.len(), 2);
    }

    #[test]
    fn test_cross_page_match_keeps_first_page() {
        let (doc, chunk) = document(vec![
            vec![block(0, 100.0, &["continues on the"])],
            vec![block(1, 700.0, &["next page"])],
        ]);
        let span = resolve(&doc, &chunk, key_point("on the next page"));
        assert_eq!(span.page_index, 0);
        assert_eq!(span.boxes.len(), 1);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let (doc, chunk) = document(vec![
            vec![block(0, 700.0, &["repeat"])],
            vec![block(1, 700.0, &["repeat"])],
        ]);
        assert_eq!(resolve(&doc, &chunk, key_point("repeat")).page_index, 0);
    }
}
