//! Unpaywall API client
//!
//! Success rate: ~26% (lookup service, points to repository URLs that may 403)
//! Rate limit: None specified, but polite usage recommended
//! API key: Requires email (not a key, just for identification)
//! API docs: https://unpaywall.org/products/api

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{build_client, download_pdf, status_error};
use super::resolver::SourceAdapter;
use super::{DocumentIdentifier, ResolvedPdf, SourceAttemptResult};
use crate::error::{PaperError, Result};
use crate::settings::Settings;
use crate::utils::encode_doi_path;

pub const SOURCE: &str = "unpaywall";

#[derive(Debug, Deserialize, Serialize)]
pub struct UnpaywallResponse {
    pub doi: String,
    pub is_oa: bool,
    pub best_oa_location: Option<OaLocation>,
    pub oa_locations: Option<Vec<OaLocation>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OaLocation {
    pub url: Option<String>,
    pub url_for_pdf: Option<String>,
    pub url_for_landing_page: Option<String>,
    pub version: Option<String>,
    pub license: Option<String>,
    pub host_type: Option<String>, // "publisher" or "repository"
}

/// Open-Access Index adapter
pub struct UnpaywallAdapter {
    api_client: Client,
    download_client: Client,
    base_url: String,
    email: Option<String>,
    max_bytes: usize,
}

impl UnpaywallAdapter {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            api_client: build_client(settings, settings.api_timeout())?,
            download_client: build_client(settings, settings.download_timeout())?,
            base_url: settings.endpoints.unpaywall.trim_end_matches('/').to_string(),
            email: settings.contact_email.clone().filter(|e| !e.is_empty()),
            max_bytes: settings.max_pdf_bytes,
        })
    }

    /// Look up open access locations for a DOI
    ///
    /// API endpoint: {base}/{doi}?email={email}
    pub async fn lookup(&self, doi: &str, email: &str) -> Result<UnpaywallResponse> {
        let url = format!("{}/{}", self.base_url, encode_doi_path(doi));

        let response = self
            .api_client
            .get(&url)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|e| PaperError::Transport(format!("Failed to query Unpaywall API: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PaperError::NotFound(format!("Unpaywall does not know DOI {}", doi)));
        }
        if !response.status().is_success() {
            return Err(status_error("Unpaywall API", response.status()));
        }

        response
            .json()
            .await
            .map_err(|e| PaperError::Transport(format!("Failed to parse Unpaywall response: {}", e)))
    }

    /// Download PDF from Unpaywall OA locations
    ///
    /// Best location first; only if that fails, every other location,
    /// repositories before publishers. Per-candidate failures are swallowed.
    pub async fn download(&self, data: &UnpaywallResponse) -> Result<ResolvedPdf> {
        if !data.is_oa {
            return Err(PaperError::NotFound("not open access according to Unpaywall".to_string()));
        }

        let best_url = data.best_oa_location.as_ref().and_then(get_pdf_url);
        if let Some(url) = &best_url {
            match download_pdf(&self.download_client, url, SOURCE, self.max_bytes).await {
                Ok(pdf) => return Ok(pdf),
                Err(e) => debug!(url = %url, error = %e, "Best OA location failed"),
            }
        }

        for url in candidate_urls(data, best_url.as_deref()) {
            match download_pdf(&self.download_client, &url, SOURCE, self.max_bytes).await {
                Ok(pdf) => return Ok(pdf),
                Err(e) => debug!(url = %url, error = %e, "OA location failed"),
            }
        }

        Err(PaperError::NotFound("no accessible PDF found via Unpaywall".to_string()))
    }
}

/// Extract PDF URL from OA location (prefers direct PDF URL)
fn get_pdf_url(location: &OaLocation) -> Option<String> {
    location.url_for_pdf.clone().or_else(|| location.url.clone())
}

/// Alternate locations in try order, without duplicates or the best URL
fn candidate_urls(data: &UnpaywallResponse, skip: Option<&str>) -> Vec<String> {
    let Some(locations) = &data.oa_locations else {
        return Vec::new();
    };

    let is_repository = |l: &OaLocation| l.host_type.as_deref() == Some("repository");
    let ordered = locations
        .iter()
        .filter(|l| is_repository(l))
        .chain(locations.iter().filter(|l| !is_repository(l)));

    let mut urls: Vec<String> = Vec::new();
    for url in ordered.filter_map(get_pdf_url) {
        if Some(url.as_str()) != skip && !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

#[async_trait]
impl SourceAdapter for UnpaywallAdapter {
    fn label(&self) -> &str {
        SOURCE
    }

    fn missing_requirement(&self, identifier: &DocumentIdentifier) -> Option<String> {
        if identifier.doi().is_none() {
            Some("no DOI available".to_string())
        } else if self.email.is_none() {
            Some("no contact email configured".to_string())
        } else {
            None
        }
    }

    async fn attempt(&self, identifier: &DocumentIdentifier) -> SourceAttemptResult {
        if let Some(reason) = self.missing_requirement(identifier) {
            return SourceAttemptResult::Failure(reason);
        }
        let (Some(doi), Some(email)) = (identifier.doi(), self.email.as_deref()) else {
            return SourceAttemptResult::failure("no DOI available");
        };

        let data = match self.lookup(doi, email).await {
            Ok(data) => data,
            Err(e) => return SourceAttemptResult::Failure(e.to_string()),
        };
        self.download(&data).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::papers::AuxiliaryId;

    fn location(url: Option<&str>, pdf: Option<&str>, host: &str) -> OaLocation {
        OaLocation {
            url: url.map(str::to_string),
            url_for_pdf: pdf.map(str::to_string),
            url_for_landing_page: Some("https://example.com/page".to_string()),
            version: Some("publishedVersion".to_string()),
            license: Some("cc-by".to_string()),
            host_type: Some(host.to_string()),
        }
    }

    #[test]
    fn test_get_pdf_url_prefers_pdf() {
        let loc = location(Some("https://example.com/landing"), Some("https://example.com/file.pdf"), "repository");
        assert_eq!(get_pdf_url(&loc), Some("https://example.com/file.pdf".to_string()));
    }

    #[test]
    fn test_get_pdf_url_fallback_to_url() {
        let loc = location(Some("https://example.com/paper.pdf"), None, "repository");
        assert_eq!(get_pdf_url(&loc), Some("https://example.com/paper.pdf".to_string()));
    }

    #[test]
    fn test_get_pdf_url_none() {
        assert_eq!(get_pdf_url(&location(None, None, "repository")), None);
    }

    #[test]
    fn test_candidates_repositories_first_without_best() {
        let data = UnpaywallResponse {
            doi: "10.1/x".to_string(),
            is_oa: true,
            best_oa_location: None,
            oa_locations: Some(vec![
                location(None, Some("https://publisher.example/a.pdf"), "publisher"),
                location(None, Some("https://repo.example/best.pdf"), "repository"),
                location(None, Some("https://repo.example/b.pdf"), "repository"),
                location(None, Some("https://repo.example/b.pdf"), "repository"),
            ]),
        };
        assert_eq!(
            candidate_urls(&data, Some("https://repo.example/best.pdf")),
            vec!["https://repo.example/b.pdf", "https://publisher.example/a.pdf"]
        );
    }

    fn adapter(server: &mockito::Server, email: Option<&str>) -> UnpaywallAdapter {
        let mut settings = Settings::default();
        settings.endpoints.unpaywall = format!("{}/v2", server.url());
        settings.contact_email = email.map(str::to_string);
        UnpaywallAdapter::new(&settings).unwrap()
    }

    fn doi_id() -> DocumentIdentifier {
        DocumentIdentifier::new("1", vec![AuxiliaryId::Doi("10.1/x".to_string())])
    }

    #[tokio::test]
    async fn test_unknown_doi_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/10.1/x")
            .match_query(mockito::Matcher::UrlEncoded("email".into(), "lab@example.org".into()))
            .with_status(404)
            .with_body(r#"{"error": true, "message": "unknown DOI"}"#)
            .create_async()
            .await;

        let result = adapter(&server, Some("lab@example.org")).attempt(&doi_id()).await;
        assert_eq!(result, SourceAttemptResult::failure("not found: Unpaywall does not know DOI 10.1/x"));
    }

    #[tokio::test]
    async fn test_doi_reserved_characters_are_encoded() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("GET", "/v2/10.1002/abc%231%3Fv%3D2")
            .match_query(mockito::Matcher::UrlEncoded("email".into(), "lab@example.org".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"doi":"10.1002/abc#1?v=2","is_oa":false,"best_oa_location":null,"oa_locations":[]}"#)
            .create_async()
            .await;

        let id = DocumentIdentifier::new("1", vec![AuxiliaryId::Doi("10.1002/abc#1?v=2".to_string())]);
        let result = adapter(&server, Some("lab@example.org")).attempt(&id).await;
        assert_eq!(result, SourceAttemptResult::failure("not found: not open access according to Unpaywall"));
        lookup.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_email_skips_network() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server.mock("GET", mockito::Matcher::Any).expect(0).create_async().await;

        let result = adapter(&server, None).attempt(&doi_id()).await;
        assert_eq!(result, SourceAttemptResult::failure("no contact email configured"));
        lookup.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_open_access() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/10.1/x")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"doi":"10.1/x","is_oa":false,"best_oa_location":null,"oa_locations":[]}"#)
            .create_async()
            .await;

        let result = adapter(&server, Some("a@b.org")).attempt(&doi_id()).await;
        assert_eq!(result, SourceAttemptResult::failure("not found: not open access according to Unpaywall"));
    }

    #[tokio::test]
    async fn test_best_fails_then_alternate_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();
        let body = format!(
            r#"{{"doi":"10.1/x","is_oa":true,
                "best_oa_location":{{"url_for_pdf":"{base}/best.pdf","host_type":"publisher"}},
                "oa_locations":[
                    {{"url_for_pdf":"{base}/best.pdf","host_type":"publisher"}},
                    {{"url_for_pdf":"{base}/landing.pdf","host_type":"repository"}},
                    {{"url_for_pdf":"{base}/good.pdf","host_type":"repository"}}
                ]}}"#
        );
        server
            .mock("GET", "/v2/10.1/x")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;
        let best = server.mock("GET", "/best.pdf").with_status(403).expect(1).create_async().await;
        server
            .mock("GET", "/landing.pdf")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>landing</html>")
            .create_async()
            .await;
        server
            .mock("GET", "/good.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(b"%PDF-1.6 oa copy".to_vec())
            .create_async()
            .await;

        match adapter(&server, Some("a@b.org")).attempt(&doi_id()).await {
            SourceAttemptResult::Success(pdf) => {
                assert_eq!(pdf.source, SOURCE);
                assert!(pdf.url.ends_with("/good.pdf"));
            }
            other => panic!("expected success, got {:?}", other),
        }
        best.assert_async().await;
    }
}
