//! Run configuration: defaults, TOML file, environment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisSettings, OpenAiSettings, RetryPolicy, TermAggressiveness};
use crate::annotate::{AnnotationStyle, HighlightColors};
use crate::chunk::DEFAULT_MAX_TOKENS_PER_CHUNK;
use crate::error::{Error, Result};

/// Config file looked up in the working directory when none is given.
pub const CONFIG_FILE_NAME: &str = "pdfgloss.toml";

/// Everything a run needs to know.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub model: String,
    pub max_tokens_per_chunk: usize,
    pub key_point_count_range: [u32; 2],
    pub summary_count_range: [u32; 2],
    pub summary_length_range: [u32; 2],
    pub term_aggressiveness: TermAggressiveness,
    /// Language of comments, translations and summaries
    pub note_language: String,
    pub highlight_colors: HighlightColors,
    /// Chunks analyzed concurrently
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    /// Blocks shorter than this many characters are not sent to the model
    pub min_block_chars: usize,
    pub annotation_author: String,
}

impl Default for Config {
    fn default() -> Self {
        let analysis = AnalysisSettings::default();
        Self {
            api_key: None,
            api_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            max_tokens_per_chunk: DEFAULT_MAX_TOKENS_PER_CHUNK,
            key_point_count_range: analysis.key_point_count,
            summary_count_range: analysis.summary_count,
            summary_length_range: analysis.summary_length,
            term_aggressiveness: analysis.term_aggressiveness,
            note_language: analysis.note_language,
            highlight_colors: HighlightColors::default(),
            workers: 4,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            request_timeout_secs: 120,
            temperature: 0.3,
            min_block_chars: 0,
            annotation_author: "AI".to_string(),
        }
    }
}

// Keeps the API key out of logs
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("model", &self.model)
            .field("max_tokens_per_chunk", &self.max_tokens_per_chunk)
            .field("key_point_count_range", &self.key_point_count_range)
            .field("summary_count_range", &self.summary_count_range)
            .field("summary_length_range", &self.summary_length_range)
            .field("term_aggressiveness", &self.term_aggressiveness)
            .field("note_language", &self.note_language)
            .field("highlight_colors", &self.highlight_colors)
            .field("workers", &self.workers)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("temperature", &self.temperature)
            .field("min_block_chars", &self.min_block_chars)
            .field("annotation_author", &self.annotation_author)
            .finish()
    }
}

impl Config {
    /// Parse a TOML document. Unknown keys are rejected.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Defaults, then the config file, then the process environment.
    ///
    /// `path` must exist when given; otherwise [`CONFIG_FILE_NAME`] in the
    /// working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE_NAME).is_file() => {
                log::debug!("using {}", CONFIG_FILE_NAME);
                Self::from_file(CONFIG_FILE_NAME)?
            }
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from environment variables read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("OPENAI_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("PDFGLOSS_MAX_TOKENS_PER_CHUNK") {
            self.max_tokens_per_chunk = parse_env("PDFGLOSS_MAX_TOKENS_PER_CHUNK", &v)?;
        }
        if let Some(v) = get("PDFGLOSS_WORKERS") {
            self.workers = parse_env("PDFGLOSS_WORKERS", &v)?;
        }
        Ok(())
    }

    /// Check value ranges and that an API key is present.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens_per_chunk == 0 {
            return Err(Error::Config(
                "max_tokens_per_chunk must be greater than 0".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        for (name, [min, max]) in [
            ("key_point_count_range", self.key_point_count_range),
            ("summary_count_range", self.summary_count_range),
            ("summary_length_range", self.summary_length_range),
        ] {
            if min > max {
                return Err(Error::Config(format!("{name}: {min} is greater than {max}")));
            }
        }
        for (name, color) in [
            ("keypoint", self.highlight_colors.keypoint),
            ("term", self.highlight_colors.term),
            ("summary", self.highlight_colors.summary),
        ] {
            if !color.is_valid() {
                return Err(Error::Config(format!(
                    "highlight_colors.{name}: components must be within 0.0..=1.0"
                )));
            }
        }
        if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(Error::MissingCredentials);
        }
        Ok(())
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            key_point_count: self.key_point_count_range,
            summary_count: self.summary_count_range,
            summary_length: self.summary_length_range,
            term_aggressiveness: self.term_aggressiveness,
            note_language: self.note_language.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn annotation_style(&self) -> AnnotationStyle {
        AnnotationStyle {
            colors: self.highlight_colors,
            author: self.annotation_author.clone(),
        }
    }

    /// Connection settings for the OpenAI backend.
    pub fn openai_settings(&self) -> Result<OpenAiSettings> {
        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(Error::MissingCredentials)?;
        Ok(OpenAiSettings {
            base_url: self.api_base_url.clone(),
            api_key,
            model: self.model.clone(),
            temperature: self.temperature,
            timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key}: invalid value {value:?}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::model::Rgb;

    fn with_key() -> Config {
        Config {
            api_key: Some("sk-test".into()),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.max_tokens_per_chunk, 2000);
        assert_eq!(config.workers, 4);
        assert_eq!(config.term_aggressiveness, TermAggressiveness::Moderate);
        assert_eq!(config.highlight_colors.term, Rgb([0.5, 0.8, 1.0]));
    }

    #[test]
    fn test_toml_partial_file() {
        let config = Config::from_toml_str(
            r#"
            model = "gpt-4o-mini"
            key_point_count_range = [5, 10]
            term_aggressiveness = "aggressive"

            [highlight_colors]
            keypoint = [0.9, 0.9, 0.2]
            "#,
        )
        .unwrap();

        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.key_point_count_range, [5, 10]);
        assert_eq!(config.term_aggressiveness, TermAggressiveness::Aggressive);
        assert_eq!(config.highlight_colors.keypoint, Rgb([0.9, 0.9, 0.2]));
        // Untouched keys keep their defaults
        assert_eq!(config.highlight_colors.summary, Rgb::LIGHT_RED);
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        assert!(matches!(
            Config::from_toml_str("modle = \"typo\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml_str("term_aggressiveness = \"extreme\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("OPENAI_BASE_URL", "  "),
            ("PDFGLOSS_WORKERS", "8"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_with(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.model, "gpt-4o");
        // Blank values are ignored
        assert_eq!(config.api_base_url, "https://api.openai.com/v1");
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn test_env_invalid_number() {
        let mut config = Config::default();
        let result = config.apply_env_with(|k| {
            (k == "PDFGLOSS_MAX_TOKENS_PER_CHUNK").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate() {
        assert!(with_key().validate().is_ok());
        assert!(matches!(
            Config::default().validate(),
            Err(Error::MissingCredentials)
        ));

        let invalid = [
            Config {
                max_tokens_per_chunk: 0,
                ..with_key()
            },
            Config {
                workers: 0,
                ..with_key()
            },
            Config {
                summary_count_range: [5, 1],
                ..with_key()
            },
            Config {
                highlight_colors: HighlightColors {
                    term: Rgb([0.0, 2.0, 0.0]),
                    ..HighlightColors::default()
                },
                ..with_key()
            },
        ];
        for config in invalid {
            assert!(matches!(config.validate(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", with_key());
        assert!(!debug.contains("sk-test"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_openai_settings_require_key() {
        assert!(matches!(
            Config::default().openai_settings(),
            Err(Error::MissingCredentials)
        ));
        let settings = with_key().openai_settings().unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(120));
    }
}
