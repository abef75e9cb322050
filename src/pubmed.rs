//! PubMed E-utilities client
//!
//! API Documentation: https://www.ncbi.nlm.nih.gov/books/NBK25501/
//! Rate limit: 3 requests/second without a key, 10 with one
//!
//! `search` pages through primary IDs for a field-qualified query;
//! `fetch_record` pulls one article's XML record and parses the fields the
//! resolver and the export collaborators need.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PaperError, Result};
use crate::papers::http::{build_client, status_error};
use crate::settings::Settings;

/// One page of search results
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub total: u64,
    pub offset: u32,
    pub ids: Vec<String>,
}

/// Article-level record used by the resolver and by exports
#[derive(Debug, Clone, Default, Serialize)]
pub struct PaperRecord {
    pub pmid: String,
    pub title: String,
    pub journal: Option<String>,
    pub year: Option<String>,
    pub abstract_text: Option<String>,
    /// `(IdType, value)` pairs from the record's ArticleIdList
    pub article_ids: Vec<(String, String)>,
}

impl PaperRecord {
    pub fn article_id(&self, id_type: &str) -> Option<&str> {
        self.article_ids
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(id_type))
            .map(|(_, v)| v.as_str())
    }
}

/// Query parameters for paper search
#[derive(Debug, Clone, Default)]
pub struct PubMedQuery {
    pub terms: String,
    pub journals: Vec<String>,
    pub from_year: Option<u32>,
    pub to_year: Option<u32>,
}

impl PubMedQuery {
    /// Compose the boolean, field-qualified query string
    pub fn build(&self) -> String {
        let mut clauses = Vec::new();

        let terms = self.terms.trim();
        if !terms.is_empty() {
            clauses.push(format!("({})", terms));
        }

        if !self.journals.is_empty() {
            let journals: Vec<String> = self
                .journals
                .iter()
                .map(|j| format!("\"{}\"[Journal]", j.trim()))
                .collect();
            clauses.push(format!("({})", journals.join(" OR ")));
        }

        if self.from_year.is_some() || self.to_year.is_some() {
            let from = self.from_year.unwrap_or(1800);
            let to = self.to_year.unwrap_or(3000);
            clauses.push(format!(
                "(\"{}/01/01\"[Date - Publication] : \"{}/12/31\"[Date - Publication])",
                from, to
            ));
        }

        clauses.join(" AND ")
    }
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    retstart: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
}

/// E-utilities client
pub struct PubMedClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    email: Option<String>,
}

impl PubMedClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings, settings.api_timeout())?,
            base_url: settings.endpoints.eutils.trim_end_matches('/').to_string(),
            api_key: settings.ncbi_api_key.clone(),
            email: settings.contact_email.clone(),
        })
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("tool", "paperchase".to_string())];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        params
    }

    /// Search PubMed and return one page of PMIDs
    pub async fn search(&self, query: &str, offset: u32, page_size: u32) -> Result<SearchPage> {
        let mut params = self.base_params();
        params.push(("db", "pubmed".to_string()));
        params.push(("term", query.to_string()));
        params.push(("retmode", "json".to_string()));
        params.push(("retstart", offset.to_string()));
        params.push(("retmax", page_size.min(10_000).to_string()));

        let url = format!("{}/esearch.fcgi", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| PaperError::Transport(format!("Failed to query PubMed search: {}", e)))?;

        if !response.status().is_success() {
            return Err(status_error("PubMed search", response.status()));
        }

        let parsed: ESearchResponse = response
            .json()
            .await
            .map_err(|e| PaperError::Lookup(format!("Failed to parse PubMed search response: {}", e)))?;

        let result = parsed.esearchresult;
        let page = SearchPage {
            total: result.count.and_then(|c| c.parse().ok()).unwrap_or(0),
            offset: result.retstart.and_then(|s| s.parse().ok()).unwrap_or(offset),
            ids: result.idlist,
        };
        debug!(total = page.total, returned = page.ids.len(), "PubMed search");
        Ok(page)
    }

    /// Fetch and parse the XML record for one PMID
    ///
    /// Transport and parse failures are reported as `Lookup` errors.
    pub async fn fetch_record(&self, pmid: &str) -> Result<PaperRecord> {
        let mut params = self.base_params();
        params.push(("db", "pubmed".to_string()));
        params.push(("id", pmid.to_string()));
        params.push(("retmode", "xml".to_string()));

        let url = format!("{}/efetch.fcgi", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| PaperError::Lookup(format!("Failed to fetch PubMed record {}: {}", pmid, e)))?;

        if !response.status().is_success() {
            return Err(PaperError::Lookup(format!(
                "PubMed record fetch for {} returned status {}",
                pmid,
                response.status()
            )));
        }

        let xml = response
            .text()
            .await
            .map_err(|e| PaperError::Lookup(format!("Failed to read PubMed record {}: {}", pmid, e)))?;

        parse_pubmed_record(&xml)
    }
}

fn id_type(e: &BytesStart) -> String {
    e.try_get_attribute("IdType")
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
        .unwrap_or_default()
}

fn ends_with(stack: &[Vec<u8>], tail: &[&[u8]]) -> bool {
    stack.len() >= tail.len()
        && stack[stack.len() - tail.len()..]
            .iter()
            .zip(tail)
            .all(|(a, b)| a.as_slice() == *b)
}

fn contains(stack: &[Vec<u8>], tag: &[u8]) -> bool {
    stack.iter().any(|t| t.as_slice() == tag)
}

fn push_piece(target: &mut String, piece: &str) {
    if !target.is_empty() && !target.ends_with(char::is_whitespace) {
        target.push(' ');
    }
    target.push_str(piece);
}

/// Parse the first `<PubmedArticle>` of an efetch XML response
///
/// Only the article's own `PubmedData/ArticleIdList` is read; the ID lists
/// nested under the reference list belong to cited papers.
pub fn parse_pubmed_record(xml: &str) -> Result<PaperRecord> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut record = PaperRecord::default();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut seen_article = false;
    let mut current_id_type = String::new();
    let mut abstract_parts: Vec<String> = Vec::new();
    let mut current_abstract = String::new();
    let mut medline_date: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"PubmedArticle" => {
                        if seen_article {
                            break;
                        }
                        seen_article = true;
                    }
                    b"ArticleId" => current_id_type = id_type(e),
                    b"AbstractText" => current_abstract.clear(),
                    _ => {}
                }
                stack.push(name);
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| PaperError::Lookup(format!("Malformed PubMed XML: {}", err)))?
                    .to_string();

                if ends_with(&stack, &[b"MedlineCitation", b"PMID"]) && record.pmid.is_empty() {
                    record.pmid = text;
                } else if contains(&stack, b"ArticleTitle") && !contains(&stack, b"ReferenceList") {
                    push_piece(&mut record.title, &text);
                } else if ends_with(&stack, &[b"Journal", b"Title"]) {
                    record.journal = Some(text);
                } else if ends_with(&stack, &[b"PubDate", b"Year"]) {
                    record.year.get_or_insert(text);
                } else if ends_with(&stack, &[b"PubDate", b"MedlineDate"]) {
                    medline_date.get_or_insert(text);
                } else if contains(&stack, b"AbstractText") {
                    push_piece(&mut current_abstract, &text);
                } else if ends_with(&stack, &[b"PubmedData", b"ArticleIdList", b"ArticleId"]) {
                    record.article_ids.push((current_id_type.clone(), text.trim().to_string()));
                }
            }
            Ok(Event::End(ref e)) => {
                match e.name().as_ref() {
                    b"AbstractText" => {
                        if !current_abstract.is_empty() {
                            abstract_parts.push(std::mem::take(&mut current_abstract));
                        }
                    }
                    b"PubmedArticle" => break,
                    _ => {}
                }
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PaperError::Lookup(format!(
                    "Malformed PubMed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    if !seen_article || record.pmid.is_empty() {
        return Err(PaperError::NotFound("PubMed returned no article record".to_string()));
    }

    if record.year.is_none() {
        record.year = medline_date.and_then(|d| d.get(..4).map(str::to_string));
    }
    if !abstract_parts.is_empty() {
        record.abstract_text = Some(abstract_parts.join("\n\n"));
    }

    Ok(record)
}
