//! Prompt construction for chunk analysis.

use serde::{Deserialize, Serialize};

/// How eagerly the model should mark vocabulary as terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermAggressiveness {
    /// Only core technical terms and abbreviations
    Conservative,
    /// Technical terms plus hard academic vocabulary
    #[default]
    Moderate,
    /// Anything beyond basic vocabulary
    Aggressive,
}

impl TermAggressiveness {
    fn instructions(self) -> &'static str {
        match self {
            TermAggressiveness::Conservative => {
                "Be conservative: mark only core technical terms (for example oxytocin, \
                 amygdala, hippocampus, dopamine) and every abbreviation (fMRI, HPA, ANOVA, SEM). \
                 Do not mark general academic vocabulary or common adjectives and verbs."
            }
            TermAggressiveness::Moderate => {
                "Mark technical terms and harder vocabulary, in this order of priority: \
                 adjectival technical words (mesolimbic, dopaminergic, hypothalamic), compound \
                 technical terms (mesolimbic dopaminergic system), technical nouns (oxytocin, \
                 amygdala), uncommon long words of 8 or more letters (neuroplasticity, \
                 conceptualization), academic verbs and adjectives (attenuate, facilitate, \
                 salient) and every abbreviation (fMRI, HPA, ANOVA, SEM). Do not mark very \
                 common words such as study, research or important."
            }
            TermAggressiveness::Aggressive => {
                "Be aggressive and prefer marking too much over missing a difficult word: mark \
                 every technical term, every adjectival technical word, every uncommon long word \
                 of 8 or more letters, all strongly academic vocabulary and every abbreviation. \
                 Anything beyond basic high-school vocabulary may be marked."
            }
        }
    }
}

impl std::fmt::Display for TermAggressiveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TermAggressiveness::Conservative => "conservative",
            TermAggressiveness::Moderate => "moderate",
            TermAggressiveness::Aggressive => "aggressive",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for TermAggressiveness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(TermAggressiveness::Conservative),
            "moderate" => Ok(TermAggressiveness::Moderate),
            "aggressive" => Ok(TermAggressiveness::Aggressive),
            other => Err(format!("unknown term aggressiveness: {other}")),
        }
    }
}

/// What the model is asked to produce for each chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    /// Key points per chunk, `[min, max]`
    pub key_point_count: [u32; 2],
    /// Paragraph summaries per chunk, `[min, max]`
    pub summary_count: [u32; 2],
    /// Summary length in words (characters for CJK note languages), `[min, max]`
    pub summary_length: [u32; 2],
    pub term_aggressiveness: TermAggressiveness,
    /// Language of comments, translations and summaries
    pub note_language: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            key_point_count: [3, 6],
            summary_count: [1, 3],
            summary_length: [40, 80],
            term_aggressiveness: TermAggressiveness::Moderate,
            note_language: "Simplified Chinese".to_string(),
        }
    }
}

const SYSTEM_PROMPT: &str = "You are an assistant for reading academic papers. You identify the \
key claims, findings and methods of a text, quote the sentences that carry them exactly as they \
appear in the source, and explain them in concise notes for a reader whose first language is \
{language}. You always answer with a single JSON object.";

const RESPONSE_SCHEMA: &str = r#"{
  "key_points": [
    {"text": "exact sentence copied from the text", "comment": "why it matters"}
  ],
  "terms": [
    {"text": "exact term as it appears", "translation": "translation of the term"}
  ],
  "summaries": [
    {"text_prefix": "first words of the paragraph, copied exactly", "summary": "what the paragraph says"}
  ]
}"#;

/// The system message for every request.
pub fn build_system_prompt(settings: &AnalysisSettings) -> String {
    SYSTEM_PROMPT.replace("{language}", &settings.note_language)
}

/// The user message for one chunk.
pub fn build_user_prompt(settings: &AnalysisSettings, chunk_text: &str) -> String {
    let [kp_min, kp_max] = settings.key_point_count;
    let [sc_min, sc_max] = settings.summary_count;
    let [len_min, len_max] = settings.summary_length;
    let language = &settings.note_language;

    format!(
        "Read the following excerpt of an academic paper and complete three tasks.\n\
         \n\
         Task 1: key points. Select {kp_min}-{kp_max} sentences that carry the excerpt's \
         important claims, findings, methods or conclusions, spread across the whole excerpt. \
         Quote each sentence completely and exactly as it appears in the text, and add a comment \
         in {language} of 30-50 characters explaining its significance.\n\
         \n\
         Task 2: terms. {terms}\n\
         Quote each term exactly as it appears in the text and give a {language} translation of \
         5-15 characters. List every term only once and cover the whole excerpt, not just its \
         beginning.\n\
         \n\
         Task 3: paragraph summaries. Choose {sc_min}-{sc_max} substantial paragraphs. For each, \
         copy the first 20 or so characters of the paragraph exactly, and write a summary in \
         {language} of {len_min}-{len_max} words (characters for Chinese or Japanese) covering \
         its key method, finding or conclusion.\n\
         \n\
         Every quoted string must be copied verbatim from the text so that it can be located on \
         the page. Do not paraphrase, translate or shorten quotes.\n\
         \n\
         Return exactly one JSON object with this structure:\n\
         {schema}\n\
         \n\
         Text:\n\
         \"\"\"\n\
         {chunk_text}\n\
         \"\"\"\n",
        terms = settings.term_aggressiveness.instructions(),
        schema = RESPONSE_SCHEMA,
    )
}
