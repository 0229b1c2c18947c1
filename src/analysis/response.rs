//! Parsing of the model's JSON answer into annotation requests.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::AnnotationRequest;

#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    #[serde(default, alias = "highlights")]
    key_points: Vec<KeyPointEntry>,
    #[serde(default)]
    terms: Vec<TermEntry>,
    #[serde(default)]
    summaries: Vec<SummaryEntry>,
}

#[derive(Debug, Deserialize)]
struct KeyPointEntry {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TermEntry {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    translation: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryEntry {
    #[serde(default)]
    text_prefix: Option<String>,
    #[serde(default)]
    paragraph_start: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// First non-blank value among the candidates, trimmed.
fn first_filled(candidates: [Option<String>; 3]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

/// Remove a Markdown code fence wrapped around the JSON, if any.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a completion into requests: key points, then terms, then summaries.
///
/// Missing arrays count as empty and entries without quoted text are dropped.
/// Anything that is not a JSON object of the expected shape is a
/// [`Error::MalformedResponse`].
pub fn parse_response(content: &str) -> Result<Vec<AnnotationRequest>> {
    let json = strip_code_fence(content);
    let payload: AnalysisPayload =
        serde_json::from_str(json).map_err(|e| Error::MalformedResponse(e.to_string()))?;

    let mut requests = Vec::new();
    let mut dropped = 0usize;

    for entry in payload.key_points {
        match first_filled([entry.text, None, None]) {
            Some(quoted_text) => requests.push(AnnotationRequest::KeyPoint {
                quoted_text,
                comment: first_filled([entry.comment, entry.note, entry.reason])
                    .unwrap_or_default(),
            }),
            None => dropped += 1,
        }
    }

    for entry in payload.terms {
        match first_filled([entry.text, None, None]) {
            Some(quoted_text) => requests.push(AnnotationRequest::Term {
                quoted_text,
                translation: first_filled([entry.translation, entry.note, None])
                    .unwrap_or_default(),
            }),
            None => dropped += 1,
        }
    }

    for entry in payload.summaries {
        match first_filled([entry.text_prefix, entry.paragraph_start, None]) {
            Some(quoted_text_prefix) => requests.push(AnnotationRequest::ParagraphSummary {
                quoted_text_prefix,
                summary: first_filled([entry.summary, None, None]).unwrap_or_default(),
            }),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        log::debug!("dropped {} entries without quoted text", dropped);
    }
    Ok(requests)
}
