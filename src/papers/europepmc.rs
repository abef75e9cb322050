//! Europe PMC client
//!
//! Success rate: picks up open-access papers mirrored outside NCBI
//! Rate limit: none published, polite usage expected
//! API key: not required
//! API docs: https://europepmc.org/RestfulWebService
//!
//! With a known accession the render endpoint is tried directly. Otherwise,
//! or if that fails, the search API is asked whether it holds a PDF for the
//! PMID and the render URL is built from the returned accession.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, download_pdf, status_error};
use super::resolver::SourceAdapter;
use super::{DocumentIdentifier, ResolvedPdf, SourceAttemptResult};
use crate::error::{PaperError, Result};
use crate::settings::Settings;

pub const SOURCE: &str = "europepmc";

#[derive(Debug, Deserialize, Serialize)]
pub struct EuropePmcSearchResponse {
    #[serde(rename = "hitCount", default)]
    pub hit_count: u64,
    #[serde(rename = "resultList", default)]
    pub result_list: EuropePmcResultList,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct EuropePmcResultList {
    #[serde(default)]
    pub result: Vec<EuropePmcWork>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EuropePmcWork {
    pub id: Option<String>,
    pub source: Option<String>,
    pub pmcid: Option<String>,
    #[serde(rename = "hasPDF")]
    pub has_pdf: Option<String>,
    #[serde(rename = "isOpenAccess")]
    pub is_open_access: Option<String>,
}

impl EuropePmcWork {
    pub fn pdf_available(&self) -> bool {
        self.has_pdf.as_deref() == Some("Y")
    }
}

/// Open-Access Aggregator adapter
pub struct EuropePmcAdapter {
    api_client: Client,
    download_client: Client,
    render_url: String,
    search_url: String,
    max_bytes: usize,
}

impl EuropePmcAdapter {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            api_client: build_client(settings, settings.api_timeout())?,
            download_client: build_client(settings, settings.download_timeout())?,
            render_url: settings.endpoints.europepmc_render.clone(),
            search_url: settings.endpoints.europepmc_search.clone(),
            max_bytes: settings.max_pdf_bytes,
        })
    }

    fn render_link(&self, pmcid: &str) -> String {
        format!("{}?accid={}&blobtype=pdf", self.render_url, urlencoding::encode(pmcid))
    }

    /// Search Europe PMC by external (PubMed) identifier
    ///
    /// API endpoint: {search}?query=EXT_ID:{pmid} AND SRC:MED&format=json
    pub async fn search_by_pmid(&self, pmid: &str) -> Result<EuropePmcSearchResponse> {
        let query = format!("EXT_ID:{} AND SRC:MED", pmid);
        let response = self
            .api_client
            .get(&self.search_url)
            .query(&[("query", query.as_str()), ("format", "json"), ("resultType", "lite")])
            .send()
            .await
            .map_err(|e| PaperError::Transport(format!("Failed to query Europe PMC: {}", e)))?;

        if !response.status().is_success() {
            return Err(status_error("Europe PMC search", response.status()));
        }

        response
            .json()
            .await
            .map_err(|e| PaperError::Transport(format!("Failed to parse Europe PMC response: {}", e)))
    }

    /// Search for the PMID and render the accession it returns
    ///
    /// `already_tried` is an accession whose render just failed; it is not
    /// downloaded a second time.
    async fn via_search(&self, pmid: &str, already_tried: Option<&str>) -> Result<ResolvedPdf> {
        let results = self.search_by_pmid(pmid).await?;
        let work = results
            .result_list
            .result
            .into_iter()
            .find(|w| w.pmcid.is_some())
            .ok_or_else(|| PaperError::NotFound("Europe PMC has no full-text record".to_string()))?;

        if !work.pdf_available() {
            return Err(PaperError::NotFound("Europe PMC reports no PDF available".to_string()));
        }

        let pmcid = work.pmcid.unwrap_or_default();
        if already_tried.map_or(false, |tried| tried.eq_ignore_ascii_case(&pmcid)) {
            return Err(PaperError::NotFound(format!("search returned {}, whose render already failed", pmcid)));
        }
        download_pdf(&self.download_client, &self.render_link(&pmcid), SOURCE, self.max_bytes).await
    }
}

#[async_trait]
impl SourceAdapter for EuropePmcAdapter {
    fn label(&self) -> &str {
        SOURCE
    }

    async fn attempt(&self, identifier: &DocumentIdentifier) -> SourceAttemptResult {
        let mut direct_error = None;

        if let Some(pmcid) = identifier.pmcid() {
            match download_pdf(&self.download_client, &self.render_link(pmcid), SOURCE, self.max_bytes).await {
                Ok(pdf) => return SourceAttemptResult::Success(pdf),
                Err(e) => direct_error = Some(e),
            }
        }

        let tried = direct_error.as_ref().and(identifier.pmcid());
        match self.via_search(identifier.primary_id(), tried).await {
            Ok(pdf) => SourceAttemptResult::Success(pdf),
            Err(e) => match direct_error {
                Some(direct) => SourceAttemptResult::Failure(format!("direct render: {}; search: {}", direct, e)),
                None => SourceAttemptResult::Failure(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::papers::AuxiliaryId;
    use mockito::Matcher;

    fn adapter(server: &mockito::Server) -> EuropePmcAdapter {
        let mut settings = Settings::default();
        settings.endpoints.europepmc_render = format!("{}/render", server.url());
        settings.endpoints.europepmc_search = format!("{}/search", server.url());
        EuropePmcAdapter::new(&settings).unwrap()
    }

    #[test]
    fn test_search_response_deserialization() {
        let json = r#"{
            "version": "6.9",
            "hitCount": 1,
            "resultList": {"result": [
                {"id": "12345", "source": "MED", "pmid": "12345", "pmcid": "PMC999",
                 "isOpenAccess": "Y", "hasPDF": "Y"}
            ]}
        }"#;
        let response: EuropePmcSearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.hit_count, 1);
        let work = &response.result_list.result[0];
        assert_eq!(work.pmcid.as_deref(), Some("PMC999"));
        assert!(work.pdf_available());
    }

    #[tokio::test]
    async fn test_direct_render_with_accession() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/render")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("accid".into(), "PMC999".into()),
                Matcher::UrlEncoded("blobtype".into(), "pdf".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(b"%PDF-1.4 rendered".to_vec())
            .create_async()
            .await;
        let search = server.mock("GET", "/search").match_query(Matcher::Any).expect(0).create_async().await;

        let id = DocumentIdentifier::new("12345", vec![AuxiliaryId::PmcAccession("PMC999".to_string())]);
        assert!(adapter(&server).attempt(&id).await.is_success());
        search.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_then_render() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("query".into(), "EXT_ID:12345 AND SRC:MED".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"hitCount":1,"resultList":{"result":[{"id":"12345","pmcid":"PMC777","hasPDF":"Y"}]}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/render")
            .match_query(Matcher::UrlEncoded("accid".into(), "PMC777".into()))
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(b"%PDF-1.4 found".to_vec())
            .create_async()
            .await;

        match adapter(&server).attempt(&DocumentIdentifier::bare("12345")).await {
            SourceAttemptResult::Success(pdf) => assert_eq!(pdf.bytes, b"%PDF-1.4 found".to_vec()),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_pdf_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"hitCount":1,"resultList":{"result":[{"id":"12345","pmcid":"PMC777","hasPDF":"N"}]}}"#)
            .create_async()
            .await;
        let render = server.mock("GET", "/render").match_query(Matcher::Any).expect(0).create_async().await;

        let result = adapter(&server).attempt(&DocumentIdentifier::bare("12345")).await;
        assert_eq!(
            result,
            SourceAttemptResult::failure("not found: Europe PMC reports no PDF available")
        );
        render.assert_async().await;
    }

    #[tokio::test]
    async fn test_render_html_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/render")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>error</html>")
            .create_async()
            .await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"hitCount":0,"resultList":{"result":[]}}"#)
            .create_async()
            .await;

        let id = DocumentIdentifier::new("12345", vec![AuxiliaryId::PmcAccession("PMC999".to_string())]);
        match adapter(&server).attempt(&id).await {
            SourceAttemptResult::Failure(reason) => {
                assert!(reason.starts_with("direct render: unsupported content"), "{}", reason);
                assert!(reason.contains("no full-text record"), "{}", reason);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_accession_is_not_rendered_twice() {
        let mut server = mockito::Server::new_async().await;
        let render = server
            .mock("GET", "/render")
            .match_query(Matcher::UrlEncoded("accid".into(), "PMC999".into()))
            .with_status(403)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"hitCount":1,"resultList":{"result":[{"id":"12345","pmcid":"PMC999","hasPDF":"Y"}]}}"#)
            .create_async()
            .await;

        let id = DocumentIdentifier::new("12345", vec![AuxiliaryId::PmcAccession("PMC999".to_string())]);
        match adapter(&server).attempt(&id).await {
            SourceAttemptResult::Failure(reason) => {
                assert!(reason.starts_with("direct render: transport error"), "{}", reason);
                assert!(reason.contains("PMC999, whose render already failed"), "{}", reason);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        render.assert_async().await;
    }
}
