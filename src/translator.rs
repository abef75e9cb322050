//! Chunked translation of extracted full text
//!
//! Text is cut into fixed-size character chunks (no overlap, no sentence
//! awareness), each chunk goes through one backend call in order, and the
//! cleaned results are joined with a blank line. A failed chunk fails the
//! whole unit; nothing partial is returned.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::error::{PaperError, Result};
use crate::papers::http::build_client;
use crate::settings::Settings;
use crate::utils::body_preview;

/// Which backend translates the chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMode {
    /// Commercial machine translation API
    #[default]
    DeepL,
    /// Prompted language model
    Llm,
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationMode::DeepL => write!(f, "deepl"),
            TranslationMode::Llm => write!(f, "llm"),
        }
    }
}

impl FromStr for TranslationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deepl" => Ok(TranslationMode::DeepL),
            "llm" | "ai" => Ok(TranslationMode::Llm),
            other => Err(format!("unknown translation mode '{}' (expected deepl or llm)", other)),
        }
    }
}

/// Split text into chunks of at most `size` characters
///
/// Every chunk but the last holds exactly `size` characters and the chunks
/// concatenate back to the input.
pub fn chunk_text(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:\*\*)?\s*(?:translation|traducci[oó]n)\s*(?:\*\*)?\s*:\s*(?:\*\*)?\s*")
            .expect("valid label pattern")
    })
}

fn enumeration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*(?:\d+[.)]|[-•])\s+").expect("valid enumeration pattern"))
}

fn strong_emphasis_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\*\*([^\n]+?)\*\*|__([^\n]+?)__").expect("valid strong emphasis pattern"))
}

// The opening `*` must follow whitespace or line start; star alleles
// (CYP2D6*4) and significance stars (p<0.05*) stay as written
fn asterisk_emphasis_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(^|\s)\*([^*\s][^*\n]*?)\*").expect("valid emphasis pattern"))
}

fn underscore_emphasis_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(^|\s)_([^_\s][^_\n]*?)_").expect("valid emphasis pattern"))
}

fn spaces_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[ \t]{2,}").expect("valid spaces pattern"))
}

/// Strip prompt-leakage artifacts from one translated chunk
pub fn clean_translation(raw: &str) -> String {
    let text = label_pattern().replace(raw, "");
    let text = enumeration_pattern().replace(&text, "");
    let text = strong_emphasis_pattern().replace_all(&text, "$1$2");
    let text = asterisk_emphasis_pattern().replace_all(&text, "$1$2");
    let text = underscore_emphasis_pattern().replace_all(&text, "$1$2");
    let text = spaces_pattern().replace_all(&text, " ");
    text.trim().to_string()
}

/// One `(text) -> text` translation service
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    fn label(&self) -> &str;
    async fn translate_chunk(&self, chunk: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
}

/// DeepL form-POST backend
pub struct DeepLBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    target_lang: String,
}

impl DeepLBackend {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .deepl_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PaperError::Config("DeepL API key not configured".to_string()))?;

        Ok(Self {
            client: build_client(settings, settings.download_timeout())?,
            endpoint: settings.endpoints.deepl.clone(),
            api_key,
            target_lang: settings.target_lang.to_uppercase(),
        })
    }
}

#[async_trait]
impl TranslationBackend for DeepLBackend {
    fn label(&self) -> &str {
        "deepl"
    }

    async fn translate_chunk(&self, chunk: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .form(&[("text", chunk), ("target_lang", self.target_lang.as_str())])
            .send()
            .await
            .map_err(|e| PaperError::Transport(format!("DeepL request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaperError::Transport(format!("DeepL error {}: {}", status, body_preview(&body))));
        }

        let data: DeepLResponse = response
            .json()
            .await
            .map_err(|e| PaperError::Transport(format!("Failed to parse DeepL response: {}", e)))?;

        Ok(data
            .translations
            .into_iter()
            .map(|t| t.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

/// Anthropic API message format
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Anthropic API request format
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

fn language_name(code: &str) -> &str {
    match code.to_ascii_uppercase().as_str() {
        "ES" => "Spanish",
        "EN" | "EN-US" | "EN-GB" => "English",
        "FR" => "French",
        "DE" => "German",
        "IT" => "Italian",
        "PT" | "PT-BR" | "PT-PT" => "Portuguese",
        _ => code,
    }
}

/// Prompted language-model backend (Anthropic messages API)
pub struct LlmBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    target_lang: String,
}

impl LlmBackend {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .anthropic_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PaperError::Config("Anthropic API key not configured".to_string()))?;

        Ok(Self {
            client: build_client(settings, settings.download_timeout())?,
            endpoint: settings.endpoints.anthropic.clone(),
            api_key,
            model: settings.anthropic_model.clone(),
            target_lang: settings.target_lang.clone(),
        })
    }

    fn prompt(&self, chunk: &str) -> String {
        format!(
            r#"Translate the following excerpt of a biomedical paper into {}.
Keep technical terms, drug names, gene symbols and numbers exactly as written.
Return only the translated text, with no preamble, labels or formatting.

{}"#,
            language_name(&self.target_lang),
            chunk
        )
    }
}

#[async_trait]
impl TranslationBackend for LlmBackend {
    fn label(&self) -> &str {
        "llm"
    }

    async fn translate_chunk(&self, chunk: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 4096,
            messages: vec![Message {
                role: "user".to_string(),
                content: self.prompt(chunk),
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| PaperError::Transport(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaperError::Transport(format!("API error {}: {}", status, body_preview(&body))));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| PaperError::Transport(format!("Failed to parse response: {}", e)))?;

        Ok(api_response
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

/// Backend for a mode, built from settings
pub fn backend_for(mode: TranslationMode, settings: &Settings) -> Result<Box<dyn TranslationBackend>> {
    Ok(match mode {
        TranslationMode::DeepL => Box::new(DeepLBackend::new(settings)?),
        TranslationMode::Llm => Box::new(LlmBackend::new(settings)?),
    })
}

pub struct Translator {
    backend: Box<dyn TranslationBackend>,
    chunk_size: usize,
}

impl Translator {
    pub fn new(backend: Box<dyn TranslationBackend>, chunk_size: usize) -> Self {
        Self { backend, chunk_size }
    }

    pub fn from_settings(settings: &Settings, mode: TranslationMode) -> Result<Self> {
        Ok(Self::new(backend_for(mode, settings)?, settings.chunk_size))
    }

    pub fn chunk_count(&self, text: &str) -> usize {
        chunk_text(text, self.chunk_size).len()
    }

    /// Translate text chunk by chunk, in order
    pub async fn translate(&self, text: &str) -> Result<String> {
        let chunks = chunk_text(text, self.chunk_size);
        let total = chunks.len();
        let mut translated = Vec::with_capacity(total);

        for (i, chunk) in chunks.iter().enumerate() {
            debug!(backend = self.backend.label(), chunk = i + 1, total, "Translating chunk");
            let raw = self
                .backend
                .translate_chunk(chunk)
                .await
                .map_err(|e| PaperError::Translation {
                    chunk: i,
                    total,
                    reason: e.to_string(),
                })?;
            translated.push(clean_translation(&raw));
        }

        info!(backend = self.backend.label(), chunks = total, "Translation complete");
        Ok(translated.join("\n\n"))
    }
}
