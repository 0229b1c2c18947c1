//! Writing highlight and note annotations into the PDF.

use std::path::{Path, PathBuf};

use lopdf::{dictionary, Document as LopdfDocument, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{AnnotationKind, BBox, ResolvedSpan, Rgb};
use crate::parser::page_size;

/// Side of the square sticky-note icon, in points.
const NOTE_ICON_SIZE: f32 = 18.0;
/// Gap between the note icon and the paragraph.
const NOTE_MARGIN: f32 = 2.0;
const POPUP_WIDTH: f32 = 220.0;
const POPUP_HEIGHT: f32 = 110.0;

/// Colours per annotation kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HighlightColors {
    pub keypoint: Rgb,
    pub term: Rgb,
    pub summary: Rgb,
}

impl Default for HighlightColors {
    fn default() -> Self {
        Self {
            keypoint: Rgb::YELLOW,
            term: Rgb::LIGHT_BLUE,
            summary: Rgb::LIGHT_RED,
        }
    }
}

impl HighlightColors {
    pub fn for_kind(&self, kind: AnnotationKind) -> Rgb {
        match kind {
            AnnotationKind::KeyPoint => self.keypoint,
            AnnotationKind::Term => self.term,
            AnnotationKind::ParagraphSummary => self.summary,
        }
    }
}

/// Appearance settings shared by all annotations of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationStyle {
    pub colors: HighlightColors,
    /// Shown as the popup title
    pub author: String,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            colors: HighlightColors::default(),
            author: "AI".to_string(),
        }
    }
}

/// What to draw for one resolved span.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayShape {
    /// Highlight over each box (one per line)
    Highlight { boxes: Vec<BBox> },
    /// Sticky note beside the anchor box
    Note { anchor: BBox },
}

/// One annotation waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    /// Zero-based page index
    pub page_index: usize,
    pub shape: OverlayShape,
    pub color: Rgb,
    pub contents: String,
}

/// A loaded PDF plus the overlays to add to it.
///
/// Overlays are collected with [`Annotator::add`] and written in one pass by
/// [`Annotator::save`]; the source file is never modified.
pub struct Annotator {
    doc: LopdfDocument,
    source: Option<PathBuf>,
    style: AnnotationStyle,
    overlays: Vec<Overlay>,
}

impl Annotator {
    /// Load the PDF to annotate.
    pub fn open<P: AsRef<Path>>(path: P, style: AnnotationStyle) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let mut annotator = Self::from_bytes(&data, style)?;
        annotator.source = Some(path.to_path_buf());
        Ok(annotator)
    }

    pub fn from_bytes(data: &[u8], style: AnnotationStyle) -> Result<Self> {
        let doc = LopdfDocument::load_mem(data)?;
        Ok(Self {
            doc,
            source: None,
            style,
            overlays: Vec::new(),
        })
    }

    /// Queue the annotation for a resolved span.
    ///
    /// Returns `false` (and queues nothing) for unresolved spans and spans on
    /// pages the document does not have.
    pub fn add(&mut self, span: &ResolvedSpan) -> bool {
        if !span.is_resolved() || span.page_index >= self.doc.get_pages().len() {
            return false;
        }

        let kind = span.request.kind();
        let shape = match kind {
            AnnotationKind::KeyPoint | AnnotationKind::Term => OverlayShape::Highlight {
                boxes: span.boxes.clone(),
            },
            // Only the paragraph's first line anchors the note
            AnnotationKind::ParagraphSummary => OverlayShape::Note {
                anchor: span.boxes[0],
            },
        };

        self.overlays.push(Overlay {
            page_index: span.page_index,
            shape,
            color: self.style.colors.for_kind(kind),
            contents: span.request.note().to_string(),
        });
        true
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    /// Write the annotated PDF to `output`. Returns the number of annotations added.
    pub fn save<P: AsRef<Path>>(self, output: P) -> Result<usize> {
        let output = output.as_ref();
        if let Some(source) = &self.source {
            if same_file(source, output) {
                return Err(Error::WriteError(format!(
                    "refusing to overwrite the input file {}",
                    source.display()
                )));
            }
        }

        let (bytes, written) = self.into_bytes()?;
        std::fs::write(output, bytes)
            .map_err(|e| Error::WriteError(format!("{}: {}", output.display(), e)))?;

        log::info!("wrote {} annotation(s) to {}", written, output.display());
        Ok(written)
    }

    /// Apply the overlays and serialise the document.
    pub fn into_bytes(mut self) -> Result<(Vec<u8>, usize)> {
        let pages = self.doc.get_pages();
        let mut overlays = std::mem::take(&mut self.overlays);
        overlays.sort_by_key(|o| o.page_index);

        let mut written = 0usize;
        for overlay in &overlays {
            let Some(&page_id) = pages.get(&(overlay.page_index as u32 + 1)) else {
                continue;
            };
            let (page_width, _) = page_size(&self.doc, page_id);
            let annot_id = match &overlay.shape {
                OverlayShape::Highlight { boxes } => {
                    self.add_highlight(page_id, boxes, overlay.color, &overlay.contents)
                }
                OverlayShape::Note { anchor } => {
                    self.add_note(page_id, *anchor, page_width, overlay.color, &overlay.contents)
                }
            };
            let Some(annot_id) = annot_id else { continue };
            self.append_to_page(page_id, annot_id)?;
            written += 1;
        }

        let mut bytes = Vec::new();
        self.doc
            .save_to(&mut bytes)
            .map_err(|e| Error::WriteError(e.to_string()))?;
        Ok((bytes, written))
    }

    fn add_highlight(
        &mut self,
        page_id: ObjectId,
        boxes: &[BBox],
        color: Rgb,
        contents: &str,
    ) -> Option<ObjectId> {
        let rect = BBox::union_all(boxes)?;

        let quad_points: Vec<Object> = boxes
            .iter()
            .flat_map(|b| [b.x0, b.y1, b.x1, b.y1, b.x0, b.y0, b.x1, b.y0])
            .map(Object::Real)
            .collect();

        let mut appearance = String::from("/GS0 gs\n");
        appearance.push_str(&format!("{} rg\n", color_operands(color)));
        for b in boxes {
            appearance.push_str(&format!(
                "{:.3} {:.3} {:.3} {:.3} re f\n",
                b.x0,
                b.y0,
                b.width(),
                b.height()
            ));
        }
        let appearance_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => rect_array(rect),
                "Resources" => dictionary! {
                    "ExtGState" => dictionary! {
                        "GS0" => dictionary! {
                            "Type" => "ExtGState",
                            "BM" => "Multiply",
                        },
                    },
                },
            },
            appearance.into_bytes(),
        ));

        let annot_id = self.doc.new_object_id();
        let popup_id = self.add_popup(annot_id, page_id, rect);
        let annot = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Highlight",
            "Rect" => rect_array(rect),
            "QuadPoints" => quad_points,
            "C" => color_array(color),
            "Contents" => text_string(contents),
            "T" => text_string(&self.style.author),
            "F" => 4,
            "P" => page_id,
            "AP" => dictionary! { "N" => appearance_id },
            "Popup" => popup_id,
        };
        self.doc.objects.insert(annot_id, Object::Dictionary(annot));
        Some(annot_id)
    }

    fn add_note(
        &mut self,
        page_id: ObjectId,
        anchor: BBox,
        page_width: f32,
        color: Rgb,
        contents: &str,
    ) -> Option<ObjectId> {
        let left = anchor.x0 - NOTE_MARGIN - NOTE_ICON_SIZE;
        let x = if left >= 0.0 {
            left
        } else {
            (anchor.x1 + NOTE_MARGIN).min(page_width - NOTE_ICON_SIZE)
        };
        let rect = BBox::new(x, anchor.y1 - NOTE_ICON_SIZE, x + NOTE_ICON_SIZE, anchor.y1);

        let annot_id = self.doc.new_object_id();
        let popup_id = self.add_popup(annot_id, page_id, rect);
        let annot = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Text",
            "Rect" => rect_array(rect),
            "Name" => "Comment",
            "Open" => false,
            "C" => color_array(color),
            "Contents" => text_string(contents),
            "T" => text_string(&self.style.author),
            "F" => 4,
            "P" => page_id,
            "Popup" => popup_id,
        };
        self.doc.objects.insert(annot_id, Object::Dictionary(annot));
        Some(annot_id)
    }

    fn add_popup(&mut self, parent: ObjectId, page_id: ObjectId, anchor: BBox) -> ObjectId {
        let rect = BBox::new(
            anchor.x1,
            anchor.y1 - POPUP_HEIGHT,
            anchor.x1 + POPUP_WIDTH,
            anchor.y1,
        );
        self.doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Popup",
            "Rect" => rect_array(rect),
            "Parent" => parent,
            "P" => page_id,
            "Open" => false,
        })
    }

    /// Append an annotation (and its popup) to the page's `/Annots`.
    fn append_to_page(&mut self, page_id: ObjectId, annot_id: ObjectId) -> Result<()> {
        let mut refs = vec![Object::Reference(annot_id)];
        if let Ok(Object::Dictionary(annot)) = self.doc.get_object(annot_id) {
            if let Ok(popup) = annot.get(b"Popup") {
                refs.push(popup.clone());
            }
        }

        let page = self
            .doc
            .get_dictionary(page_id)
            .map_err(|e| Error::WriteError(format!("page object: {e}")))?;
        let existing = match page.get(b"Annots") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };

        if let Some(array_id) = existing {
            // Shared or indirect /Annots array
            if let Ok(Object::Array(array)) = self.doc.get_object_mut(array_id) {
                array.extend(refs);
                return Ok(());
            }
        }

        let page = self
            .doc
            .get_dictionary_mut(page_id)
            .map_err(|e| Error::WriteError(format!("page object: {e}")))?;
        match page.get_mut(b"Annots") {
            Ok(Object::Array(array)) => array.extend(refs),
            _ => page.set("Annots", Object::Array(refs)),
        }
        Ok(())
    }
}

/// Whether two paths name the same file, also when `b` does not exist yet.
pub(crate) fn same_file(a: &Path, b: &Path) -> bool {
    let canonical = |p: &Path| -> Option<PathBuf> {
        if let Ok(c) = p.canonicalize() {
            return Some(c);
        }
        let parent = match p.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize().ok()?,
            _ => std::env::current_dir().ok()?,
        };
        Some(parent.join(p.file_name()?))
    };
    match (canonical(a), canonical(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn rect_array(b: BBox) -> Vec<Object> {
    vec![
        Object::Real(b.x0),
        Object::Real(b.y0),
        Object::Real(b.x1),
        Object::Real(b.y1),
    ]
}

fn color_array(color: Rgb) -> Vec<Object> {
    color.0.iter().map(|&c| Object::Real(c)).collect()
}

fn color_operands(color: Rgb) -> String {
    let [r, g, b] = color.0;
    format!("{:.3} {:.3} {:.3}", r, g, b)
}

/// Encode a PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnnotationRequest;
    use lopdf::content::{Content, Operation};

    fn blank_pdf(pages: usize, existing_annots: bool) -> Vec<u8> {
        let mut doc = LopdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for _ in 0..pages {
            let content = Content {
                operations: vec![Operation::new("BT", vec![]), Operation::new("ET", vec![])],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            };
            if existing_annots {
                let link = doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Link",
                    "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
                });
                let array = doc.add_object(vec![Object::Reference(link)]);
                page.set("Annots", array);
            }
            kids.push(doc.add_object(page).into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn span(page_index: usize, request: AnnotationRequest, boxes: Vec<BBox>) -> ResolvedSpan {
        ResolvedSpan {
            page_index,
            boxes,
            request,
        }
    }

    fn annots_on_page(bytes: &[u8], page: u32) -> Vec<lopdf::Dictionary> {
        let doc = LopdfDocument::load_mem(bytes).unwrap();
        let page_id = doc.get_pages()[&page];
        let page_dict = doc.get_dictionary(page_id).unwrap();
        let array = match page_dict.get(b"Annots") {
            Ok(Object::Reference(id)) => doc.get_object(*id).unwrap().as_array().unwrap().clone(),
            Ok(Object::Array(a)) => a.clone(),
            _ => return Vec::new(),
        };
        array
            .iter()
            .map(|o| {
                doc.get_dictionary(o.as_reference().unwrap())
                    .unwrap()
                    .clone()
            })
            .collect()
    }

    fn subtype(dict: &lopdf::Dictionary) -> Vec<u8> {
        dict.get(b"Subtype").unwrap().as_name().unwrap().to_vec()
    }

    #[test]
    fn test_highlight_with_quads_and_popup() {
        let mut annotator =
            Annotator::from_bytes(&blank_pdf(2, false), AnnotationStyle::default())
                .unwrap();
        let boxes = vec![
            BBox::new(72.0, 700.0, 300.0, 712.0),
            BBox::new(72.0, 686.0, 150.0, 698.0),
        ];
        assert!(annotator.add(&span(
            0,
            AnnotationRequest::KeyPoint {
                quoted_text: "q".into(),
                comment: "重要发现".into(),
            },
            boxes,
        )));
        let (bytes, written) = annotator.into_bytes().unwrap();
        assert_eq!(written, 1);

        let annots = annots_on_page(&bytes, 1);
        let highlights: Vec<_> = annots.iter().filter(|a| subtype(a) == b"Highlight").collect();
        assert_eq!(highlights.len(), 1);
        assert_eq!(annots.iter().filter(|a| subtype(a) == b"Popup").count(), 1);

        let quads = highlights[0].get(b"QuadPoints").unwrap().as_array().unwrap();
        assert_eq!(quads.len(), 16);
        let rect = highlights[0].get(b"Rect").unwrap().as_array().unwrap();
        assert_eq!(rect[1].as_float().unwrap(), 686.0);
        assert_eq!(rect[2].as_float().unwrap(), 300.0);

        assert!(annots_on_page(&bytes, 2).is_empty());
    }

    #[test]
    fn test_summary_note_left_of_paragraph() {
        let mut annotator =
            Annotator::from_bytes(&blank_pdf(1, false), AnnotationStyle::default())
                .unwrap();
        annotator.add(&span(
            0,
            AnnotationRequest::ParagraphSummary {
                quoted_text_prefix: "q".into(),
                summary: "summary".into(),
            },
            vec![
                BBox::new(72.0, 700.0, 300.0, 712.0),
                BBox::new(72.0, 686.0, 300.0, 698.0),
            ],
        ));
        let (bytes, _) = annotator.into_bytes().unwrap();

        let annots = annots_on_page(&bytes, 1);
        let note = annots.iter().find(|a| subtype(a) == b"Text").unwrap();
        let rect = note.get(b"Rect").unwrap().as_array().unwrap();
        assert_eq!(rect[0].as_float().unwrap(), 52.0);
        assert_eq!(rect[3].as_float().unwrap(), 712.0);
        assert_eq!(note.get(b"Name").unwrap().as_name().unwrap(), b"Comment");
    }

    #[test]
    fn test_note_placement_uses_inherited_media_box() {
        let mut doc = LopdfDocument::load_mem(&blank_pdf(1, false)).unwrap();
        let pages_id = doc
            .catalog()
            .unwrap()
            .get(b"Pages")
            .unwrap()
            .as_reference()
            .unwrap();
        doc.get_dictionary_mut(pages_id)
            .unwrap()
            .set("MediaBox", vec![0.into(), 0.into(), 842.into(), 595.into()]);
        let mut landscape = Vec::new();
        doc.save_to(&mut landscape).unwrap();

        let mut annotator =
            Annotator::from_bytes(&landscape, AnnotationStyle::default()).unwrap();
        annotator.add(&span(
            0,
            AnnotationRequest::ParagraphSummary {
                quoted_text_prefix: "q".into(),
                summary: "summary".into(),
            },
            vec![BBox::new(5.0, 500.0, 800.0, 512.0)],
        ));
        let (bytes, _) = annotator.into_bytes().unwrap();

        let annots = annots_on_page(&bytes, 1);
        let note = annots.iter().find(|a| subtype(a) == b"Text").unwrap();
        let rect = note.get(b"Rect").unwrap().as_array().unwrap();
        // Right of the paragraph; a Letter-width fallback would clamp to 594
        assert_eq!(rect[0].as_float().unwrap(), 802.0);
    }

    #[test]
    fn test_existing_annots_preserved() {
        let mut annotator =
            Annotator::from_bytes(&blank_pdf(1, true), AnnotationStyle::default())
                .unwrap();
        annotator.add(&span(
            0,
            AnnotationRequest::Term {
                quoted_text: "q".into(),
                translation: "t".into(),
            },
            vec![BBox::new(72.0, 700.0, 120.0, 712.0)],
        ));
        let (bytes, _) = annotator.into_bytes().unwrap();

        let annots = annots_on_page(&bytes, 1);
        assert_eq!(annots.iter().filter(|a| subtype(a) == b"Link").count(), 1);
        assert_eq!(annots.iter().filter(|a| subtype(a) == b"Highlight").count(), 1);
    }

    #[test]
    fn test_unresolved_and_out_of_range_spans_skipped() {
        let mut annotator =
            Annotator::from_bytes(&blank_pdf(1, false), AnnotationStyle::default())
                .unwrap();
        let request = AnnotationRequest::KeyPoint {
            quoted_text: "q".into(),
            comment: "c".into(),
        };
        assert!(!annotator.add(&span(0, request.clone(), vec![])));
        assert!(!annotator.add(&span(5, request, vec![BBox::new(0.0, 0.0, 1.0, 1.0)])));
        assert!(annotator.overlays().is_empty());
    }

    #[test]
    fn test_refuses_to_overwrite_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("paper.pdf");
        std::fs::write(&input, blank_pdf(1, false)).unwrap();

        let annotator = Annotator::open(&input, AnnotationStyle::default()).unwrap();
        assert!(matches!(annotator.save(&input), Err(Error::WriteError(_))));
    }

    #[test]
    fn test_unwritable_output() {
        let annotator =
            Annotator::from_bytes(&blank_pdf(1, false), AnnotationStyle::default())
                .unwrap();
        let result = annotator.save("/nonexistent-dir/for/sure/out.pdf");
        assert!(matches!(result, Err(Error::WriteError(_))));
    }

    #[test]
    fn test_text_string_encoding() {
        match text_string("abc") {
            Object::String(bytes, StringFormat::Literal) => assert_eq!(bytes, b"abc"),
            other => panic!("unexpected {:?}", other),
        }
        match text_string("杏") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(bytes, vec![0xFE, 0xFF, 0x67, 0x4F])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_colors_by_kind() {
        let colors = HighlightColors::default();
        assert_eq!(colors.for_kind(AnnotationKind::KeyPoint), Rgb::YELLOW);
        assert_eq!(colors.for_kind(AnnotationKind::Term), Rgb::LIGHT_BLUE);
        assert_eq!(colors.for_kind(AnnotationKind::ParagraphSummary), Rgb::LIGHT_RED);
    }
}
