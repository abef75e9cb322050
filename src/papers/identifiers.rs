//! Identifier resolution
//!
//! Looks up a PubMed record once and collects the auxiliary identifiers
//! (DOI, PMC accession) the source adapters need. Missing identifiers are
//! normal; only transport and parse failures are errors.

use tracing::debug;

use super::pmc::extract_pmcid;
use super::{AuxiliaryId, DocumentIdentifier};
use crate::error::{PaperError, Result};
use crate::pubmed::{PaperRecord, PubMedClient};
use crate::settings::Settings;

pub struct IdentifierResolver {
    pubmed: PubMedClient,
}

impl IdentifierResolver {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            pubmed: PubMedClient::new(settings)?,
        })
    }

    /// Resolve auxiliary identifiers for a PMID
    pub async fn resolve(&self, primary_id: &str) -> Result<DocumentIdentifier> {
        let primary_id = primary_id.trim();
        if primary_id.is_empty() {
            return Err(PaperError::Lookup("primary ID is empty".to_string()));
        }

        let record = self.pubmed.fetch_record(primary_id).await.map_err(|e| match e {
            PaperError::Lookup(_) => e,
            other => PaperError::Lookup(format!("no usable record for {}: {}", primary_id, other)),
        })?;

        let identifier = identifier_from_record(primary_id, &record);
        debug!(
            pmid = primary_id,
            doi = identifier.doi().unwrap_or("-"),
            pmcid = identifier.pmcid().unwrap_or("-"),
            "Resolved identifiers"
        );
        Ok(identifier)
    }
}

/// Scan a record's ID list for the known type tags
pub fn identifier_from_record(primary_id: &str, record: &PaperRecord) -> DocumentIdentifier {
    let mut auxiliary = Vec::new();

    if let Some(doi) = record.article_id("doi").and_then(normalize_doi) {
        auxiliary.push(AuxiliaryId::Doi(doi));
    }
    if let Some(pmc) = record.article_id("pmc") {
        if let Some(digits) = extract_pmcid(&[pmc.to_string()]) {
            auxiliary.push(AuxiliaryId::PmcAccession(format!("PMC{}", digits)));
        }
    }

    DocumentIdentifier::new(primary_id, auxiliary)
}

/// Strip resolver prefixes from a DOI
///
/// Handles:
/// - `doi:10.1000/xyz` → `10.1000/xyz`
/// - `https://doi.org/10.1000/xyz` → `10.1000/xyz`
pub fn normalize_doi(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    let start = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"]
        .iter()
        .find(|prefix| lower.starts_with(*prefix))
        .map(|prefix| prefix.len())
        .unwrap_or(0);
    let doi = trimmed[start..].trim();
    if doi.starts_with("10.") && doi.contains('/') {
        Some(doi.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ids: &[(&str, &str)]) -> PaperRecord {
        PaperRecord {
            pmid: "12345".to_string(),
            article_ids: ids.iter().map(|(t, v)| (t.to_string(), v.to_string())).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_identifier_from_record() {
        let id = identifier_from_record("12345", &record(&[("pubmed", "12345"), ("doi", "10.1/x"), ("pmc", "PMC999")]));
        assert_eq!(id.doi(), Some("10.1/x"));
        assert_eq!(id.pmcid(), Some("PMC999"));
        assert_eq!(id.pmc_number(), Some(999));
    }

    #[test]
    fn test_identifier_from_record_without_aux() {
        let id = identifier_from_record("12345", &record(&[("pubmed", "12345")]));
        assert!(id.auxiliary().is_empty());
    }

    #[test]
    fn test_lowercase_pmc_is_normalized() {
        let id = identifier_from_record("1", &record(&[("pmc", "pmc42")]));
        assert_eq!(id.pmcid(), Some("PMC42"));
    }

    #[test]
    fn test_normalize_doi() {
        assert_eq!(normalize_doi("doi:10.1000/xyz"), Some("10.1000/xyz".to_string()));
        assert_eq!(normalize_doi("https://doi.org/10.1000/XYZ"), Some("10.1000/XYZ".to_string()));
        assert_eq!(normalize_doi("10.1000/xyz"), Some("10.1000/xyz".to_string()));
        assert_eq!(normalize_doi("not-a-doi"), None);
    }

    #[tokio::test]
    async fn test_resolve_against_mock_eutils() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/efetch.fcgi")
            .match_query(mockito::Matcher::UrlEncoded("id".into(), "12345".into()))
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(
                r#"<PubmedArticleSet><PubmedArticle><MedlineCitation><PMID>12345</PMID>
                <Article><ArticleTitle>T</ArticleTitle></Article></MedlineCitation>
                <PubmedData><ArticleIdList><ArticleId IdType="pmc">PMC999</ArticleId></ArticleIdList></PubmedData>
                </PubmedArticle></PubmedArticleSet>"#,
            )
            .create_async()
            .await;

        let mut settings = Settings::default();
        settings.endpoints.eutils = server.url();
        let resolver = IdentifierResolver::new(&settings).unwrap();

        let id = resolver.resolve("12345").await.unwrap();
        assert_eq!(id.primary_id(), "12345");
        assert_eq!(id.pmcid(), Some("PMC999"));
        assert!(id.doi().is_none());
    }

    #[tokio::test]
    async fn test_resolve_server_error_is_lookup_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/efetch.fcgi")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let mut settings = Settings::default();
        settings.endpoints.eutils = server.url();
        let resolver = IdentifierResolver::new(&settings).unwrap();

        let err = resolver.resolve("12345").await.unwrap_err();
        assert!(matches!(err, PaperError::Lookup(_)));
    }
}
