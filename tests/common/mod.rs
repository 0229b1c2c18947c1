//! Shared fixtures: synthetic papers and a scripted completion backend.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use pdfgloss::{CallOutcome, CompletionBackend, CompletionRequest, Config};

const LINE_HEIGHT: f32 = 14.0;
const PARAGRAPH_GAP: f32 = 60.0;

/// Build a Letter-size PDF. Each page is a list of paragraphs, each
/// paragraph a list of lines set in 12pt Helvetica from the top margin.
pub fn build_paper(pages: &[&[&[&str]]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for paragraphs in pages {
        let mut operations = Vec::new();
        let mut y = 700.0;
        for paragraph in paragraphs.iter() {
            for line in paragraph.iter() {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                operations.push(Operation::new("Td", vec![72.into(), y.into()]));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                operations.push(Operation::new("ET", vec![]));
                y -= LINE_HEIGHT;
            }
            y -= PARAGRAPH_GAP - LINE_HEIGHT;
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save fixture");
    bytes
}

/// Config with a dummy key, no retry delay and deterministic workers.
pub fn test_config() -> Config {
    Config {
        api_key: Some("test-key".to_string()),
        retry_backoff_ms: 0,
        max_attempts: 1,
        ..Config::default()
    }
}

/// Answers each call with the reply of the first rule whose marker occurs
/// in the user prompt, or an empty analysis.
pub struct MockBackend {
    rules: Vec<(String, String)>,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on(mut self, marker: &str, reply: &str) -> Self {
        self.rules.push((marker.to_string(), reply.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, request: &CompletionRequest) -> CallOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .rules
            .iter()
            .find(|(marker, _)| request.user.contains(marker.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| r#"{"key_points": [], "terms": [], "summaries": []}"#.to_string());
        CallOutcome::Success(reply)
    }
}

/// Every annotation dictionary in a saved PDF with its page number, page order.
pub fn annotation_dicts(bytes: &[u8]) -> Vec<(u32, Dictionary)> {
    let doc = Document::load_mem(bytes).expect("load output");
    let mut found = Vec::new();
    for (number, page_id) in doc.get_pages() {
        let page = doc.get_dictionary(page_id).expect("page dict");
        let annots = match page.get(b"Annots") {
            Ok(Object::Reference(id)) => doc
                .get_object(*id)
                .and_then(Object::as_array)
                .cloned()
                .unwrap_or_default(),
            Ok(Object::Array(array)) => array.clone(),
            _ => Vec::new(),
        };
        for annot in annots {
            let dict = doc
                .get_dictionary(annot.as_reference().expect("annotation ref"))
                .expect("annotation dict");
            found.push((number, dict.clone()));
        }
    }
    found
}

/// `(subtype, page number)` of every annotation in a saved PDF, page order.
pub fn annotations(bytes: &[u8]) -> Vec<(String, u32)> {
    annotation_dicts(bytes)
        .into_iter()
        .map(|(number, dict)| {
            let subtype = dict.get(b"Subtype").and_then(Object::as_name).expect("subtype");
            (String::from_utf8_lossy(subtype).into_owned(), number)
        })
        .collect()
}

/// Numbers of an array entry such as `/Rect` or `/QuadPoints`.
pub fn numbers(dict: &Dictionary, key: &[u8]) -> Vec<f32> {
    dict.get(key)
        .and_then(Object::as_array)
        .expect("number array")
        .iter()
        .map(|o| o.as_float().expect("number"))
        .collect()
}
