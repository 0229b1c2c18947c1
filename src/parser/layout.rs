//! Layout analysis for PDF pages.
//!
//! Walks a page's content stream tracking the text and graphics state, turns
//! every text-showing operator into a positioned span, then groups spans into
//! lines (respecting a two-column gutter when one is detected) and lines into
//! paragraph blocks.

use std::collections::{BTreeMap, HashMap};

use lopdf::{Document as LopdfDocument, Object, ObjectId};
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};
use crate::model::{is_spaceless_script_char, BBox, TextBlock, TextLine, TextRun};

/// A shown string with its position in user space.
#[derive(Debug, Clone)]
pub struct TextSpan {
    /// The text content (NFKC-normalised)
    pub text: String,
    /// X position (left edge)
    pub x: f32,
    /// Y position (baseline)
    pub y: f32,
    /// Advance width
    pub width: f32,
    /// Effective font size in points
    pub font_size: f32,
}

impl TextSpan {
    /// Approximate descender line.
    pub fn bottom(&self) -> f32 {
        self.y - self.font_size * 0.2
    }

    /// Approximate ascender line.
    pub fn top(&self) -> f32 {
        self.y + self.font_size * 0.8
    }

    pub fn bbox(&self) -> BBox {
        BBox::new(self.x, self.bottom(), self.x + self.width, self.top())
    }
}

/// Analyzes pages of one loaded document.
pub struct LayoutAnalyzer<'a> {
    doc: &'a LopdfDocument,
}

impl<'a> LayoutAnalyzer<'a> {
    pub fn new(doc: &'a LopdfDocument) -> Self {
        Self { doc }
    }

    /// Extract the blocks of a page in reading order.
    pub fn analyze_page(&self, page_index: usize, page_id: ObjectId) -> Result<Vec<TextBlock>> {
        let spans = self.extract_page_spans(page_id)?;
        Ok(blocks_from_spans(page_index, spans))
    }

    /// Extract text spans from a page with position and size information.
    pub fn extract_page_spans(&self, page_id: ObjectId) -> Result<Vec<TextSpan>> {
        let fonts = self
            .doc
            .get_page_fonts(page_id)
            .map_err(|e| Error::UnreadableDocument(e.to_string()))?;
        let metrics: HashMap<Vec<u8>, FontMetrics> = fonts
            .iter()
            .map(|(name, dict)| (name.clone(), FontMetrics::from_dict(self.doc, dict)))
            .collect();

        let content = self.page_content(page_id)?;
        if content.is_empty() {
            return Ok(Vec::new());
        }
        self.walk_content(&content, &fonts, &metrics)
    }

    /// Concatenated, decompressed content streams of a page.
    fn page_content(&self, page_id: ObjectId) -> Result<Vec<u8>> {
        let page_dict = self
            .doc
            .get_dictionary(page_id)
            .map_err(|e| Error::UnreadableDocument(e.to_string()))?;

        let stream_data = |id: ObjectId| -> Option<Vec<u8>> {
            match self.doc.get_object(id) {
                Ok(Object::Stream(s)) => s
                    .decompressed_content()
                    .ok()
                    .or_else(|| Some(s.content.clone())),
                _ => None,
            }
        };

        match page_dict.get(b"Contents") {
            Ok(Object::Reference(r)) => stream_data(*r).ok_or_else(|| {
                Error::UnreadableDocument(format!("invalid content stream {:?}", r))
            }),
            Ok(Object::Array(arr)) => {
                let mut content = Vec::new();
                for id in arr.iter().filter_map(|o| o.as_reference().ok()) {
                    if let Some(data) = stream_data(id) {
                        content.extend_from_slice(&data);
                        content.push(b'\n');
                    }
                }
                Ok(content)
            }
            // A page without /Contents is blank
            _ => Ok(Vec::new()),
        }
    }

    fn walk_content(
        &self,
        content: &[u8],
        fonts: &BTreeMap<Vec<u8>, &lopdf::Dictionary>,
        metrics: &HashMap<Vec<u8>, FontMetrics>,
    ) -> Result<Vec<TextSpan>> {
        let content = lopdf::content::Content::decode(content)
            .map_err(|e| Error::UnreadableDocument(format!("content stream: {}", e)))?;

        let mut spans = Vec::new();
        let mut ctm = Matrix::IDENTITY;
        let mut ctm_stack: Vec<Matrix> = Vec::new();
        let mut ts = TextState::default();

        for op in &content.operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => ctm_stack.push(ctm),
                "Q" => ctm = ctm_stack.pop().unwrap_or(Matrix::IDENTITY),
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        ctm = m.multiply(&ctm);
                    }
                }
                "BT" => {
                    ts.tm = Matrix::IDENTITY;
                    ts.tlm = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        ts.font = name.clone();
                    }
                    ts.font_size = operands.get(1).and_then(get_number).unwrap_or(ts.font_size);
                }
                "TL" => ts.leading = operands.first().and_then(get_number).unwrap_or(0.0),
                "Tc" => ts.char_spacing = operands.first().and_then(get_number).unwrap_or(0.0),
                "Tw" => ts.word_spacing = operands.first().and_then(get_number).unwrap_or(0.0),
                "Tz" => {
                    ts.horizontal_scale =
                        operands.first().and_then(get_number).unwrap_or(100.0) / 100.0
                }
                "Td" | "TD" => {
                    let tx = operands.first().and_then(get_number).unwrap_or(0.0);
                    let ty = operands.get(1).and_then(get_number).unwrap_or(0.0);
                    if op.operator == "TD" {
                        ts.leading = -ty;
                    }
                    ts.move_line(tx, ty);
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        ts.tm = m;
                        ts.tlm = m;
                    }
                }
                "T*" => ts.next_line(),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(
                            &mut ts,
                            &ctm,
                            &[ShowItem::Text(bytes)],
                            fonts,
                            metrics,
                            &mut spans,
                        );
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(arr)) = operands.first() {
                        let items: Vec<ShowItem> = arr
                            .iter()
                            .filter_map(|item| match item {
                                Object::String(bytes, _) => Some(ShowItem::Text(bytes)),
                                other => get_number(other).map(ShowItem::Adjust),
                            })
                            .collect();
                        self.show(&mut ts, &ctm, &items, fonts, metrics, &mut spans);
                    }
                }
                "'" => {
                    ts.next_line();
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(
                            &mut ts,
                            &ctm,
                            &[ShowItem::Text(bytes)],
                            fonts,
                            metrics,
                            &mut spans,
                        );
                    }
                }
                "\"" => {
                    ts.word_spacing = operands.first().and_then(get_number).unwrap_or(0.0);
                    ts.char_spacing = operands.get(1).and_then(get_number).unwrap_or(0.0);
                    ts.next_line();
                    if let Some(Object::String(bytes, _)) = operands.get(2) {
                        self.show(
                            &mut ts,
                            &ctm,
                            &[ShowItem::Text(bytes)],
                            fonts,
                            metrics,
                            &mut spans,
                        );
                    }
                }
                _ => {}
            }
        }

        Ok(spans)
    }

    /// Show strings (with TJ kerning adjustments) as one span and advance the
    /// text matrix past them.
    fn show(
        &self,
        ts: &mut TextState,
        ctm: &Matrix,
        items: &[ShowItem<'_>],
        fonts: &BTreeMap<Vec<u8>, &lopdf::Dictionary>,
        metrics: &HashMap<Vec<u8>, FontMetrics>,
        spans: &mut Vec<TextSpan>,
    ) {
        let encoding = fonts
            .get(&ts.font)
            .and_then(|f| f.get_font_encoding(self.doc).ok());
        let font_metrics = metrics.get(&ts.font);

        let start = ts.tm.multiply(ctm);
        let mut text = String::new();
        let mut advance = 0.0f32;

        for item in items {
            match item {
                ShowItem::Text(bytes) => {
                    let decoded = match &encoding {
                        Some(enc) => LopdfDocument::decode_text(enc, bytes)
                            .unwrap_or_else(|_| decode_text_simple(bytes)),
                        None => decode_text_simple(bytes),
                    };
                    advance += ts.advance(font_metrics, bytes, &decoded);
                    text.push_str(&decoded);
                }
                ShowItem::Adjust(n) => {
                    // Kerning in thousandths of text space; large negative values are word gaps
                    advance -= n / 1000.0 * ts.font_size * ts.horizontal_scale;
                    if -n > TJ_SPACE_THRESHOLD
                        && !text.is_empty()
                        && !text.ends_with(char::is_whitespace)
                        && !text.chars().last().is_some_and(is_spaceless_script_char)
                    {
                        text.push(' ');
                    }
                }
            }
        }

        ts.tm = Matrix::translation(advance, 0.0).multiply(&ts.tm);

        let text: String = text.nfkc().collect();
        if text.trim().is_empty() {
            return;
        }

        let font_size = ts.font_size * start.vertical_scale();
        if font_size <= 0.0 {
            return;
        }
        spans.push(TextSpan {
            text,
            x: start.e,
            y: start.f,
            width: (advance * start.horizontal_scale()).abs(),
            font_size,
        });
    }
}

/// TJ adjustment (thousandths of an em) treated as a word break.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

enum ShowItem<'b> {
    Text(&'b [u8]),
    Adjust(f32),
}

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translation(tx: f32, ty: f32) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() < 6 {
            return None;
        }
        let n: Vec<f32> = operands[..6].iter().filter_map(get_number).collect();
        (n.len() == 6).then(|| Matrix {
            a: n[0],
            b: n[1],
            c: n[2],
            d: n[3],
            e: n[4],
            f: n[5],
        })
    }

    /// `self × other`: apply `self` first, then `other`.
    fn multiply(&self, o: &Matrix) -> Matrix {
        Matrix {
            a: self.a * o.a + self.b * o.c,
            b: self.a * o.b + self.b * o.d,
            c: self.c * o.a + self.d * o.c,
            d: self.c * o.b + self.d * o.d,
            e: self.e * o.a + self.f * o.c + o.e,
            f: self.e * o.b + self.f * o.d + o.f,
        }
    }

    fn horizontal_scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    fn vertical_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

/// Text state parameters tracked across operators.
#[derive(Debug, Clone)]
struct TextState {
    tm: Matrix,
    tlm: Matrix,
    font: Vec<u8>,
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font: Vec::new(),
            font_size: 12.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translation(tx, ty).multiply(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        // Producers that never set TL still expect T* to move down a line
        let leading = if self.leading != 0.0 {
            self.leading
        } else {
            self.font_size * 1.2
        };
        self.move_line(0.0, -leading);
    }

    /// Horizontal advance, in unscaled text space, of one shown string.
    fn advance(&self, metrics: Option<&FontMetrics>, bytes: &[u8], decoded: &str) -> f32 {
        let (glyph_width, glyphs, spaces) = match metrics.and_then(|m| m.width_of(bytes)) {
            Some(width) => (
                width * self.font_size,
                bytes.len(),
                bytes.iter().filter(|&&b| b == b' ').count(),
            ),
            None => (
                decoded.chars().map(estimate_char_width).sum::<f32>() * self.font_size,
                decoded.chars().count(),
                decoded.chars().filter(|&c| c == ' ').count(),
            ),
        };
        (glyph_width + glyphs as f32 * self.char_spacing + spaces as f32 * self.word_spacing)
            * self.horizontal_scale
    }
}

/// Glyph widths of a simple font, from its `/Widths` array.
#[derive(Debug, Clone, Default)]
struct FontMetrics {
    first_char: i64,
    /// Widths in thousandths of an em
    widths: Vec<f32>,
    composite: bool,
}

impl FontMetrics {
    fn from_dict(doc: &LopdfDocument, dict: &lopdf::Dictionary) -> Self {
        let composite =
            matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n.as_slice() == b"Type0");
        let first_char = dict
            .get(b"FirstChar")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0);
        let widths = match dict.get(b"Widths") {
            Ok(Object::Array(arr)) => arr.iter().map(|o| get_number(o).unwrap_or(0.0)).collect(),
            Ok(Object::Reference(r)) => match doc.get_object(*r) {
                Ok(Object::Array(arr)) => {
                    arr.iter().map(|o| get_number(o).unwrap_or(0.0)).collect()
                }
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        Self {
            first_char,
            widths,
            composite,
        }
    }

    /// Width of a byte string in ems, when every code has a known width.
    fn width_of(&self, bytes: &[u8]) -> Option<f32> {
        if self.composite || self.widths.is_empty() {
            return None;
        }
        bytes
            .iter()
            .map(|&code| {
                let idx = usize::try_from(i64::from(code) - self.first_char).ok()?;
                self.widths.get(idx).copied().filter(|w| *w > 0.0)
            })
            .sum::<Option<f32>>()
            .map(|w| w / 1000.0)
    }
}

/// Rough advance of a character in ems, for fonts without width tables.
fn estimate_char_width(c: char) -> f32 {
    if c.is_whitespace() {
        0.28
    } else if is_spaceless_script_char(c) {
        1.0
    } else if c.is_ascii_uppercase() {
        0.68
    } else if c.is_ascii_digit() {
        0.55
    } else if c.is_ascii_punctuation() {
        0.3
    } else {
        0.5
    }
}

/// A detected column in the page layout.
#[derive(Debug, Clone)]
struct Column {
    left: f32,
    right: f32,
}

impl Column {
    fn contains_span(&self, span: &TextSpan) -> bool {
        let center = span.x + span.width / 2.0;
        (self.left..=self.right).contains(&span.x) || (self.left..=self.right).contains(&center)
    }
}

/// Group spans into blocks for one page.
pub fn blocks_from_spans(page_index: usize, spans: Vec<TextSpan>) -> Vec<TextBlock> {
    let columns = detect_columns(&spans);
    log::debug!("page {}: {} column(s)", page_index, columns.len());

    let mut per_column: Vec<Vec<TextSpan>> = vec![Vec::new(); columns.len().max(1)];
    for span in spans {
        let col = columns
            .iter()
            .position(|c| c.contains_span(&span))
            .unwrap_or(0);
        per_column[col].push(span);
    }

    // Reading order: the whole left column, then the right one
    let lines: Vec<(usize, TextLine)> = per_column
        .into_iter()
        .enumerate()
        .flat_map(|(col, spans)| {
            group_into_lines(spans)
                .into_iter()
                .map(move |line| (col, line))
        })
        .collect();

    group_into_blocks(page_index, lines)
}

/// Find a vertical gutter splitting the page into two columns.
///
/// Returns one column when no convincing gutter exists.
fn detect_columns(spans: &[TextSpan]) -> Vec<Column> {
    const SLICE_WIDTH: f32 = 3.0;
    const MIN_GUTTER: f32 = 12.0;
    const MIN_COLUMN_WIDTH: f32 = 80.0;

    let Some(min_x) = spans.iter().map(|s| s.x).reduce(f32::min) else {
        return Vec::new();
    };
    let max_x = spans.iter().map(|s| s.x + s.width).fold(min_x, f32::max);
    let single = vec![Column {
        left: min_x - 10.0,
        right: max_x + 10.0,
    }];

    let page_width = max_x - min_x;
    if page_width < 250.0 {
        return single;
    }

    let num_slices = (page_width / SLICE_WIDTH) as usize + 1;
    let mut occupancy = vec![0usize; num_slices];
    for span in spans {
        let start = ((span.x - min_x) / SLICE_WIDTH) as usize;
        let end = (((span.x + span.width) - min_x) / SLICE_WIDTH) as usize;
        for slot in occupancy
            .iter_mut()
            .take(end.min(num_slices - 1) + 1)
            .skip(start)
        {
            *slot += 1;
        }
    }

    // Longest empty run in the middle 70% of the page, ties broken toward the centre
    let search = (num_slices * 15 / 100)..(num_slices * 85 / 100);
    let center = num_slices as f32 / 2.0;
    let mut best: Option<(usize, usize)> = None;
    let mut run_start: Option<usize> = None;

    let consider = |start: usize, len: usize, best: &mut Option<(usize, usize)>| {
        if (len as f32) * SLICE_WIDTH < 10.0 {
            return;
        }
        let dist = ((start + len / 2) as f32 - center).abs();
        let better = match *best {
            None => true,
            Some((bs, bl)) => {
                let best_dist = ((bs + bl / 2) as f32 - center).abs();
                len as f32 > bl as f32 * 1.5 || (len as f32 >= bl as f32 * 0.7 && dist < best_dist)
            }
        };
        if better {
            *best = Some((start, len));
        }
    };

    for i in search.clone() {
        if occupancy[i] == 0 {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            consider(start, i - start, &mut best);
        }
    }
    if let Some(start) = run_start {
        consider(start, search.end - start, &mut best);
    }

    let Some((gap_start, gap_len)) = best else {
        return single;
    };
    if gap_len as f32 * SLICE_WIDTH < MIN_GUTTER {
        return single;
    }

    let gutter = min_x + (gap_start as f32 + gap_len as f32 / 2.0) * SLICE_WIDTH;
    if gutter - min_x < MIN_COLUMN_WIDTH || max_x - gutter < MIN_COLUMN_WIDTH {
        log::debug!("column too narrow, treating as single column");
        return single;
    }

    let left_spans = spans.iter().filter(|s| s.x + s.width / 2.0 < gutter).count();
    let right_spans = spans.len() - left_spans;
    let min_spans = (spans.len() / 10).max(2);
    if left_spans < min_spans || right_spans < min_spans {
        log::debug!("spans too imbalanced, treating as single column");
        return single;
    }

    vec![
        Column {
            left: min_x - 10.0,
            right: gutter,
        },
        Column {
            left: gutter,
            right: max_x + 10.0,
        },
    ]
}

/// Group one column's spans into lines by baseline.
fn group_into_lines(mut spans: Vec<TextSpan>) -> Vec<TextLine> {
    // PDF y grows upward: top of the page first
    spans.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines = Vec::new();
    let mut current: Vec<TextSpan> = Vec::new();

    for span in spans {
        let same_line = current.first().is_some_and(|first| {
            (span.y - first.y).abs() <= span.font_size.max(first.font_size) * 0.3
        });
        if !same_line && !current.is_empty() {
            lines.extend(line_from_spans(std::mem::take(&mut current)));
        }
        current.push(span);
    }
    lines.extend(line_from_spans(current));

    lines
}

fn line_from_spans(spans: Vec<TextSpan>) -> Option<TextLine> {
    let total_chars: usize = spans.iter().map(|s| s.text.chars().count()).sum();
    let font_size = if total_chars > 0 {
        spans
            .iter()
            .map(|s| s.font_size * s.text.chars().count() as f32)
            .sum::<f32>()
            / total_chars as f32
    } else {
        spans.first()?.font_size
    };
    let runs = spans
        .into_iter()
        .map(|s| {
            let bbox = s.bbox();
            TextRun::new(s.text, bbox)
        })
        .collect();
    TextLine::from_runs(runs, font_size)
}

/// Group consecutive lines of the same column into paragraph blocks.
fn group_into_blocks(page_index: usize, lines: Vec<(usize, TextLine)>) -> Vec<TextBlock> {
    let avg_spacing = average_line_spacing(&lines);

    let mut blocks = Vec::new();
    let mut current: Vec<TextLine> = Vec::new();
    let mut prev: Option<(usize, BBox, f32)> = None;

    for (col, line) in lines {
        if let Some((prev_col, prev_bbox, prev_size)) = prev {
            let spacing = prev_bbox.y0 - line.bbox.y0;
            let breaks = col != prev_col
                || spacing < 0.0
                || spacing > avg_spacing * 1.5
                || (prev_size - line.font_size).abs() > 1.0
                || (prev_bbox.x0 - line.bbox.x0).abs() > 20.0;
            if breaks {
                blocks.extend(TextBlock::from_lines(page_index, std::mem::take(&mut current)));
            }
        }
        prev = Some((col, line.bbox, line.font_size));
        current.push(line);
    }
    blocks.extend(TextBlock::from_lines(page_index, current));

    blocks
}

fn average_line_spacing(lines: &[(usize, TextLine)]) -> f32 {
    let spacings: Vec<f32> = lines
        .windows(2)
        .filter(|w| w[0].0 == w[1].0)
        .map(|w| w[0].1.bbox.y0 - w[1].1.bbox.y0)
        .filter(|s| *s > 0.1)
        .collect();

    if spacings.is_empty() {
        return 12.0;
    }
    spacings.iter().sum::<f32>() / spacings.len() as f32
}

/// Decode a string without a font encoding: UTF-16BE with BOM, UTF-8, then Latin-1.
fn decode_text_simple(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let utf16: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    bytes.iter().map(|&b| b as char).collect()
}

/// Helper to extract number from PDF object.
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}
