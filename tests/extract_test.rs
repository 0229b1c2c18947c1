//! Text-layer extraction on synthetic papers.

mod common;

use common::build_paper;
use pdfgloss::{extract_bytes, Chunker, ExtractOptions, PageSelection, PdfParser};

const INTRO: &[&str] = &["Transformers dominate modern", "sequence modelling benchmarks."];
const METHOD: &[&str] = &["We propose a sparse variant", "with linear memory cost."];
const RESULTS: &[&str] = &["Results on three corpora show", "consistent gains in accuracy."];

#[test]
fn test_paragraphs_become_blocks() {
    let bytes = build_paper(&[&[INTRO, METHOD], &[RESULTS]]);
    let doc = extract_bytes(&bytes).unwrap();

    assert_eq!(doc.page_count, 2);
    assert_eq!(doc.pages.len(), 2);
    assert_eq!(doc.pages[0].blocks.len(), 2);
    assert_eq!(doc.pages[1].blocks.len(), 1);
    assert_eq!(doc.pages[0].width, 612.0);
    assert_eq!(doc.pages[0].height, 792.0);

    let first = &doc.pages[0].blocks[0];
    assert_eq!(
        first.text,
        "Transformers dominate modern sequence modelling benchmarks."
    );
    assert_eq!(first.lines.len(), 2);
    assert!(first.bbox.y1 > doc.pages[0].blocks[1].bbox.y1);
}

#[test]
fn test_page_selection() {
    let bytes = build_paper(&[&[INTRO], &[METHOD], &[RESULTS]]);
    let options = ExtractOptions::new().with_pages(PageSelection::parse("2-3").unwrap());
    let doc = PdfParser::from_bytes_with_options(&bytes, options)
        .unwrap()
        .extract()
        .unwrap();

    assert_eq!(doc.page_count, 3);
    let indices: Vec<usize> = doc.pages.iter().map(|p| p.page_index).collect();
    assert_eq!(indices, vec![1, 2]);
    assert!(doc.pages[0].blocks[0].text.starts_with("We propose"));
}

#[test]
fn test_min_block_chars_filters_short_blocks() {
    let bytes = build_paper(&[&[&["Fig. 3"], INTRO]]);

    let all = extract_bytes(&bytes).unwrap();
    assert_eq!(all.block_count(), 2);

    let options = ExtractOptions::new().with_min_block_chars(10);
    let filtered = PdfParser::from_bytes_with_options(&bytes, options)
        .unwrap()
        .extract()
        .unwrap();
    assert_eq!(filtered.block_count(), 1);
    assert!(filtered.pages[0].blocks[0].text.starts_with("Transformers"));
}

#[test]
fn test_page_without_text_is_unreadable() {
    let bytes = build_paper(&[&[]]);
    let result = extract_bytes(&bytes);
    assert!(matches!(result, Err(pdfgloss::Error::UnreadableDocument(_))));
}

#[test]
fn test_chunks_cover_every_block_in_order() {
    let bytes = build_paper(&[&[INTRO, METHOD], &[RESULTS]]);
    let doc = extract_bytes(&bytes).unwrap();
    let chunks = Chunker::new(20).unwrap().chunk(&doc);

    let refs: Vec<_> = chunks.iter().flat_map(|c| c.blocks.iter().copied()).collect();
    let expected: Vec<_> = doc.blocks().map(|(r, _)| r).collect();
    assert_eq!(refs, expected);
    assert!(chunks.windows(2).all(|w| w[0].chunk_id + 1 == w[1].chunk_id));
}

#[test]
fn test_page_number_blocks_dropped() {
    let bytes = build_paper(&[&[INTRO, &["7"]]]);
    let doc = extract_bytes(&bytes).unwrap();
    assert_eq!(doc.block_count(), 1);
    assert!(doc.pages[0].blocks[0].text.starts_with("Transformers"));
}
