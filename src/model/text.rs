//! Positioned text: runs, lines and blocks.

use serde::{Deserialize, Serialize};

use super::BBox;

/// A piece of text drawn by one text-showing operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub bbox: BBox,
}

impl TextRun {
    pub fn new(text: impl Into<String>, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// One rendered line: runs sharing a baseline, ordered left to right.
///
/// The line text is the run texts joined with a space wherever the horizontal
/// gap between two runs looks like a word break. Character offsets into that
/// text can be mapped back to x coordinates with [`TextLine::range_bbox`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    runs: Vec<TextRun>,
    /// Char offset of each run inside `text`
    run_starts: Vec<usize>,
    text: String,
    pub bbox: BBox,
    pub font_size: f32,
}

impl TextLine {
    /// Build a line from runs. Returns `None` for an empty run list.
    pub fn from_runs(mut runs: Vec<TextRun>, font_size: f32) -> Option<Self> {
        runs.sort_by(|a, b| {
            a.bbox
                .x0
                .partial_cmp(&b.bbox.x0)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let bbox = BBox::union_all(runs.iter().map(|r| &r.bbox))?;

        let mut text = String::new();
        let mut run_starts = Vec::with_capacity(runs.len());
        let mut char_count = 0usize;

        for (i, run) in runs.iter().enumerate() {
            if i > 0 && needs_space(&runs[i - 1], run, font_size) {
                text.push(' ');
                char_count += 1;
            }
            run_starts.push(char_count);
            text.push_str(&run.text);
            char_count += run.char_len();
        }

        Some(Self {
            runs,
            run_starts,
            text,
            bbox,
            font_size,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Bounding box of the characters `start..end` of [`TextLine::text`].
    ///
    /// Positions inside a run are interpolated linearly over its characters.
    pub fn range_bbox(&self, start: usize, end: usize) -> Option<BBox> {
        if start >= end || end > self.char_count() {
            return None;
        }
        let left = self.char_left(start);
        let right = self.char_right(end - 1);
        Some(BBox::new(left, self.bbox.y0, right.max(left), self.bbox.y1))
    }

    /// Run containing char `idx`, with the offset inside it and its length.
    fn run_at(&self, idx: usize) -> Option<(&TextRun, usize, usize)> {
        self.runs
            .iter()
            .zip(&self.run_starts)
            .find_map(|(run, &start)| {
                let len = run.char_len();
                idx.checked_sub(start)
                    .filter(|offset| *offset < len)
                    .map(|offset| (run, offset, len))
            })
    }

    fn char_left(&self, idx: usize) -> f32 {
        match self.run_at(idx) {
            Some((run, offset, len)) => {
                run.bbox.x0 + run.bbox.width() * offset as f32 / len as f32
            }
            // Inserted separator: starts where the previous run ends
            None => self
                .runs
                .iter()
                .zip(&self.run_starts)
                .take_while(|(_, &start)| start <= idx)
                .last()
                .map(|(run, _)| run.bbox.x1)
                .unwrap_or(self.bbox.x0),
        }
    }

    fn char_right(&self, idx: usize) -> f32 {
        match self.run_at(idx) {
            Some((run, offset, len)) => {
                run.bbox.x0 + run.bbox.width() * (offset + 1) as f32 / len as f32
            }
            None => self
                .runs
                .iter()
                .zip(&self.run_starts)
                .find(|(_, &start)| start > idx)
                .map(|(run, _)| run.bbox.x0)
                .unwrap_or(self.bbox.x1),
        }
    }
}

/// Decide whether a word space separates two adjacent runs.
fn needs_space(prev: &TextRun, curr: &TextRun, font_size: f32) -> bool {
    if prev.text.ends_with(char::is_whitespace) || curr.text.starts_with(char::is_whitespace) {
        return false;
    }

    let gap = curr.bbox.x0 - prev.bbox.x1;
    let chars = curr.char_len();
    let avg_char_width = if chars > 0 && curr.bbox.width() > 0.0 {
        curr.bbox.width() / chars as f32
    } else {
        font_size * 0.5
    };
    if gap <= avg_char_width * 0.2 {
        return false;
    }

    // Chinese and Japanese text does not use word spaces
    let prev_spaceless = prev.text.chars().last().is_some_and(is_spaceless_script_char);
    let curr_spaceless = curr.text.chars().next().is_some_and(is_spaceless_script_char);
    !(prev_spaceless && curr_spaceless)
}

/// Check if a character belongs to a script written without word spaces.
///
/// Hangul is deliberately absent: Korean uses spaces between words.
pub(crate) fn is_spaceless_script_char(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF       // CJK Unified Ideographs
        | 0x3400..=0x4DBF     // Extension A
        | 0x20000..=0x2EBEF   // Extensions B-F
        | 0x3040..=0x309F     // Hiragana
        | 0x30A0..=0x30FF     // Katakana
        | 0x3000..=0x303F     // CJK symbols and punctuation
    )
}

/// A paragraph-like group of consecutive lines on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    /// Zero-based page index
    pub page_index: usize,
    /// Union of the line boxes
    pub bbox: BBox,
    /// Line texts joined with single spaces
    pub text: String,
    /// Character-weighted mean font size
    pub font_size: f32,
    pub lines: Vec<TextLine>,
    /// Char offset of each line inside `text`
    line_starts: Vec<usize>,
}

impl TextBlock {
    /// Build a block from its lines. Returns `None` for an empty line list.
    pub fn from_lines(page_index: usize, lines: Vec<TextLine>) -> Option<Self> {
        let bbox = BBox::union_all(lines.iter().map(|l| &l.bbox))?;

        let mut text = String::new();
        let mut line_starts = Vec::with_capacity(lines.len());
        let mut offset = 0usize;
        let mut weighted_size = 0.0f32;
        let mut total_chars = 0usize;

        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                text.push(' ');
                offset += 1;
            }
            line_starts.push(offset);
            text.push_str(line.text());
            let n = line.char_count();
            offset += n;
            weighted_size += line.font_size * n as f32;
            total_chars += n;
        }

        let font_size = if total_chars > 0 {
            weighted_size / total_chars as f32
        } else {
            lines[0].font_size
        };

        Some(Self {
            page_index,
            bbox,
            text,
            font_size,
            lines,
            line_starts,
        })
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Map a char offset in [`TextBlock::text`] to `(line index, offset in line)`.
    ///
    /// Returns `None` for the spaces inserted between lines.
    pub fn locate(&self, idx: usize) -> Option<(usize, usize)> {
        self.lines
            .iter()
            .zip(&self.line_starts)
            .enumerate()
            .find_map(|(i, (line, &start))| {
                idx.checked_sub(start)
                    .filter(|offset| *offset < line.char_count())
                    .map(|offset| (i, offset))
            })
    }
}
