//! Unrestricted mirror source
//!
//! Opt-in only: the resolver never reaches this adapter unless the caller
//! sets `use_mirror`, and it does nothing without a configured mirror URL.
//! The mirror page for a DOI is fetched and the embedded PDF link followed.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use url::Url;

use super::http::{build_client, download_pdf, read_body_capped, status_error, validate_pdf};
use super::resolver::SourceAdapter;
use super::{DocumentIdentifier, ResolvedPdf, SourceAttemptResult};
use crate::error::{PaperError, Result};
use crate::settings::Settings;
use crate::utils::{encode_doi_path, is_pdf_magic};

pub const SOURCE: &str = "mirror";

fn embed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)<(?:embed|iframe)[^>]*?\bsrc\s*=\s*["']([^"'#]+)"#).expect("valid embed pattern")
    })
}

fn meta_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)<meta[^>]*?name\s*=\s*["']citation_pdf_url["'][^>]*?content\s*=\s*["']([^"']+)"#)
            .expect("valid meta pattern")
    })
}

/// Find the PDF link in a mirror page and make it absolute
pub fn find_pdf_link(html: &str, page_url: &Url) -> Option<Url> {
    let raw = meta_pattern()
        .captures(html)
        .or_else(|| embed_pattern().captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())?;

    page_url.join(raw).ok()
}

pub struct MirrorAdapter {
    client: Client,
    base_url: Option<String>,
    max_bytes: usize,
}

impl MirrorAdapter {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings, settings.download_timeout())?,
            base_url: settings
                .mirror_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            max_bytes: settings.max_pdf_bytes,
        })
    }

    async fn fetch(&self, base: &str, doi: &str) -> Result<ResolvedPdf> {
        let page_url = Url::parse(&format!("{}/{}", base, encode_doi_path(doi)))
            .map_err(|e| PaperError::Config(format!("invalid mirror URL: {}", e)))?;

        let response = self
            .client
            .get(page_url.clone())
            .send()
            .await
            .map_err(|e| PaperError::Transport(format!("Failed to reach mirror: {}", e)))?;

        if !response.status().is_success() {
            return Err(status_error("mirror", response.status()));
        }

        let final_url = response.url().clone();
        let body = read_body_capped(response, self.max_bytes)
            .await
            .map_err(|e| PaperError::Transport(format!("Failed to read mirror page: {}", e)))?
            .ok_or_else(|| PaperError::UnsupportedContent(format!("mirror response from {} is too large", final_url)))?;

        // Some mirrors answer with the PDF itself
        if is_pdf_magic(&body) {
            validate_pdf(&body, final_url.as_str(), self.max_bytes)?;
            return Ok(ResolvedPdf {
                bytes: body,
                source: SOURCE.to_string(),
                url: final_url.to_string(),
            });
        }

        let html = String::from_utf8_lossy(&body);
        let link = find_pdf_link(&html, &final_url)
            .ok_or_else(|| PaperError::NotFound("mirror page has no PDF link".to_string()))?;

        download_pdf(&self.client, link.as_str(), SOURCE, self.max_bytes).await
    }
}

#[async_trait]
impl SourceAdapter for MirrorAdapter {
    fn label(&self) -> &str {
        SOURCE
    }

    fn missing_requirement(&self, identifier: &DocumentIdentifier) -> Option<String> {
        if self.base_url.is_none() {
            Some("no mirror URL configured".to_string())
        } else if identifier.doi().is_none() {
            Some("no DOI available".to_string())
        } else {
            None
        }
    }

    async fn attempt(&self, identifier: &DocumentIdentifier) -> SourceAttemptResult {
        let (Some(base), Some(doi)) = (self.base_url.as_deref(), identifier.doi()) else {
            return SourceAttemptResult::Failure(
                self.missing_requirement(identifier).unwrap_or_default(),
            );
        };
        self.fetch(base, doi).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::papers::AuxiliaryId;

    #[test]
    fn test_find_embed_link_protocol_relative() {
        let page = Url::parse("https://mirror.example/10.1/x").unwrap();
        let html = r#"<div id="article"><embed type="application/pdf" src="//cdn.mirror.example/a/b.pdf#view=FitH"></div>"#;
        assert_eq!(
            find_pdf_link(html, &page).map(|u| u.to_string()),
            Some("https://cdn.mirror.example/a/b.pdf".to_string())
        );
    }

    #[test]
    fn test_find_iframe_relative_link() {
        let page = Url::parse("https://mirror.example/10.1/x").unwrap();
        let html = r#"<iframe id="pdf" src="/downloads/x.pdf"></iframe>"#;
        assert_eq!(
            find_pdf_link(html, &page).map(|u| u.to_string()),
            Some("https://mirror.example/downloads/x.pdf".to_string())
        );
    }

    #[test]
    fn test_meta_link_preferred() {
        let page = Url::parse("https://mirror.example/10.1/x").unwrap();
        let html = r#"<meta name="citation_pdf_url" content="https://files.example/p.pdf">
                      <iframe src="/other.pdf"></iframe>"#;
        assert_eq!(
            find_pdf_link(html, &page).map(|u| u.to_string()),
            Some("https://files.example/p.pdf".to_string())
        );
    }

    #[test]
    fn test_no_link() {
        let page = Url::parse("https://mirror.example/10.1/x").unwrap();
        assert!(find_pdf_link("<html><body>article not found</body></html>", &page).is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_mirror_fails_without_network() {
        let adapter = MirrorAdapter::new(&Settings::default()).unwrap();
        let id = DocumentIdentifier::new("1", vec![AuxiliaryId::Doi("10.1/x".to_string())]);
        assert_eq!(adapter.attempt(&id).await, SourceAttemptResult::failure("no mirror URL configured"));
    }

    #[tokio::test]
    async fn test_follows_embedded_link() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/10.1/x")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(r#"<html><embed src="/files/x.pdf"></html>"#)
            .create_async()
            .await;
        server
            .mock("GET", "/files/x.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(b"%PDF-1.3 mirrored".to_vec())
            .create_async()
            .await;

        let settings = Settings {
            mirror_url: Some(server.url()),
            ..Settings::default()
        };
        let adapter = MirrorAdapter::new(&settings).unwrap();
        let id = DocumentIdentifier::new("1", vec![AuxiliaryId::Doi("10.1/x".to_string())]);

        match adapter.attempt(&id).await {
            SourceAttemptResult::Success(pdf) => assert_eq!(pdf.bytes, b"%PDF-1.3 mirrored".to_vec()),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_doi_is_encoded_in_mirror_path() {
        let mut server = mockito::Server::new_async().await;
        let page = server
            .mock("GET", "/10.1002/abc%231%3Fv%3D2")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(b"%PDF-1.3 direct".to_vec())
            .create_async()
            .await;

        let settings = Settings {
            mirror_url: Some(server.url()),
            ..Settings::default()
        };
        let adapter = MirrorAdapter::new(&settings).unwrap();
        let id = DocumentIdentifier::new("1", vec![AuxiliaryId::Doi("10.1002/abc#1?v=2".to_string())]);

        match adapter.attempt(&id).await {
            SourceAttemptResult::Success(pdf) => assert_eq!(pdf.bytes, b"%PDF-1.3 direct".to_vec()),
            other => panic!("expected success, got {:?}", other),
        }
        page.assert_async().await;
    }
}
