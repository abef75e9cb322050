//! Application settings
//!
//! Stores configuration like API keys and endpoint URLs in a JSON file in the
//! user data directory. Loaded once at startup, overlaid with environment
//! variables, and then passed by value into every component. Nothing below
//! the CLI reads the environment directly.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PaperError, Result};

/// Base URLs for every external service. Overridden in tests to point at mock servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// E-utilities root (esearch.fcgi / efetch.fcgi live under it)
    pub eutils: String,
    /// Root of the PMC bulk archive tree
    pub pmc_archive: String,
    /// Per-article web delivery used when the archive misses
    pub pmc_archive_web: String,
    /// Legacy PMC article pages (Repository-Web adapter)
    pub pmc_articles: String,
    /// Europe PMC render endpoint
    pub europepmc_render: String,
    /// Europe PMC REST search
    pub europepmc_search: String,
    pub unpaywall: String,
    pub deepl: String,
    pub anthropic: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            eutils: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            pmc_archive: "https://ftp.ncbi.nlm.nih.gov/pub/pmc/oa_package".to_string(),
            pmc_archive_web: "https://pmc.ncbi.nlm.nih.gov/articles".to_string(),
            pmc_articles: "https://www.ncbi.nlm.nih.gov/pmc/articles".to_string(),
            europepmc_render: "https://europepmc.org/backend/ptpmcrender.fcgi".to_string(),
            europepmc_search: "https://www.ebi.ac.uk/europepmc/webservices/rest/search".to_string(),
            unpaywall: "https://api.unpaywall.org/v2".to_string(),
            deepl: "https://api-free.deepl.com/v2/translate".to_string(),
            anthropic: "https://api.anthropic.com/v1/messages".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Contact address sent to Unpaywall and NCBI (polite-pool identification)
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub ncbi_api_key: Option<String>,
    #[serde(default)]
    pub deepl_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    /// Target language for translation (DeepL code, e.g. "ES")
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
    #[serde(default)]
    pub endpoints: Endpoints,
    /// Timeout for metadata/API calls
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,
    /// Timeout for PDF and archive downloads
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_max_pdf_bytes")]
    pub max_pdf_bytes: usize,
    /// Opt-in gate for the unrestricted mirror source
    #[serde(default)]
    pub use_mirror: bool,
    #[serde(default)]
    pub mirror_url: Option<String>,
    /// Delay inserted before each network-bound source after the first
    #[serde(default = "default_source_delay")]
    pub source_delay_ms: u64,
    /// Delay inserted before the mirror source
    #[serde(default = "default_mirror_delay")]
    pub mirror_delay_ms: u64,
    /// Pages each extraction engine is allowed to read
    #[serde(default = "default_max_pages")]
    pub extraction_max_pages: usize,
    /// Minimum extracted characters for an engine's output to be accepted
    #[serde(default = "default_min_text")]
    pub extraction_min_chars: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_anthropic_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_target_lang() -> String {
    "ES".to_string()
}

fn default_api_timeout() -> u64 {
    10
}

fn default_download_timeout() -> u64 {
    30
}

fn default_max_pdf_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_source_delay() -> u64 {
    340 // NCBI allows ~3 requests/second without a key
}

fn default_mirror_delay() -> u64 {
    1000
}

fn default_max_pages() -> usize {
    15
}

fn default_min_text() -> usize {
    200
}

fn default_chunk_size() -> usize {
    4000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            contact_email: None,
            ncbi_api_key: None,
            deepl_api_key: None,
            anthropic_api_key: None,
            anthropic_model: default_anthropic_model(),
            target_lang: default_target_lang(),
            endpoints: Endpoints::default(),
            api_timeout_secs: default_api_timeout(),
            download_timeout_secs: default_download_timeout(),
            max_pdf_bytes: default_max_pdf_bytes(),
            use_mirror: false,
            mirror_url: None,
            source_delay_ms: default_source_delay(),
            mirror_delay_ms: default_mirror_delay(),
            extraction_max_pages: default_max_pages(),
            extraction_min_chars: default_min_text(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl Settings {
    /// Default location of the settings file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("paperchase"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("settings.json")
    }

    /// Load settings from disk, or defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| PaperError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| PaperError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PaperError::Config(format!("Failed to serialize settings: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PaperError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        fs::write(path, content)
            .map_err(|e| PaperError::Config(format!("Failed to write settings: {}", e)))
    }

    /// Apply environment overrides. Called once by the binary at startup.
    ///
    /// Environment variables take precedence over stored settings.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = non_empty("PAPERCHASE_CONTACT_EMAIL") {
            self.contact_email = Some(v);
        }
        if let Some(v) = non_empty("NCBI_API_KEY") {
            self.ncbi_api_key = Some(v);
        }
        if let Some(v) = non_empty("DEEPL_API_KEY") {
            self.deepl_api_key = Some(v);
        }
        if let Some(v) = non_empty("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(v);
        }
        if let Some(v) = non_empty("PAPERCHASE_MIRROR_URL") {
            self.mirror_url = Some(v);
        }
        self
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// User agent sent to every service; NCBI and Unpaywall ask for a contact address
    pub fn user_agent(&self) -> String {
        match &self.contact_email {
            Some(email) => format!("paperchase/{} (mailto:{})", env!("CARGO_PKG_VERSION"), email),
            None => format!("paperchase/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Mask an API key for display (shows first 8 / last 4 chars)
pub fn mask_key(key: &str) -> String {
    if key.len() > 12 && key.is_ascii() {
        format!("{}...{}", &key[..8], &key[key.len() - 4..])
    } else {
        "*".repeat(key.chars().count())
    }
}
