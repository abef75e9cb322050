//! PubMed Central bulk archive download
//!
//! Each open-access article is packaged as a `.tar.gz` holding the PDF,
//! figures and XML. Packages live under a two-level directory derived from
//! the accession number: the three digits before the final three, then the
//! final three, each zero-padded (`PMC1234567` → `234/567`).
//!
//! When the archive endpoint does not answer with success, the adapter falls
//! back to PMC's per-article web delivery.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::Client;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

use super::http::{build_client, download_pdf, read_body_capped, status_error, validate_pdf};
use super::resolver::SourceAdapter;
use super::{DocumentIdentifier, ResolvedPdf, SourceAttemptResult};
use crate::error::{PaperError, Result};
use crate::settings::Settings;

pub const SOURCE: &str = "pmc-archive";
pub const WEB_SOURCE: &str = "pmc-web";

/// Packages carry figures and supplements, so allow more than one PDF's worth
const ARCHIVE_SIZE_FACTOR: usize = 10;

/// Two-level directory for an accession number
pub fn archive_dir(pmc_number: u64) -> String {
    format!("{:03}/{:03}", (pmc_number / 1000) % 1000, pmc_number % 1000)
}

/// Repository-Archive adapter
pub struct PmcArchiveAdapter {
    client: Client,
    archive_base: String,
    web_base: String,
    max_bytes: usize,
}

impl PmcArchiveAdapter {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings, settings.download_timeout())?,
            archive_base: settings.endpoints.pmc_archive.trim_end_matches('/').to_string(),
            web_base: settings.endpoints.pmc_archive_web.trim_end_matches('/').to_string(),
            max_bytes: settings.max_pdf_bytes,
        })
    }

    fn archive_url(&self, pmc_number: u64) -> String {
        format!("{}/{}/PMC{}.tar.gz", self.archive_base, archive_dir(pmc_number), pmc_number)
    }

    /// Download the package. `Ok(None)` means it exceeds the archive size cap.
    async fn fetch_archive(&self, url: &str) -> std::result::Result<Option<Vec<u8>>, String> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return Err(format!("archive request failed: {}", e)),
        };

        if !response.status().is_success() {
            debug!(url, status = %response.status(), "Archive endpoint did not return success");
            return Err(status_error("archive", response.status()).to_string());
        }

        let limit = self.max_bytes.saturating_mul(ARCHIVE_SIZE_FACTOR);
        read_body_capped(response, limit)
            .await
            .map_err(|e| format!("failed to read archive: {}", e))
    }
}

/// Return the first `.pdf` member of a gzip-compressed tar archive
pub fn first_pdf_in_archive(archive_bytes: &[u8], max_bytes: usize) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(archive_bytes)));
    let entries = archive
        .entries()
        .map_err(|e| PaperError::UnsupportedContent(format!("unreadable archive: {}", e)))?;

    for entry in entries {
        let entry = entry.map_err(|e| PaperError::UnsupportedContent(format!("corrupt archive entry: {}", e)))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let member = match entry.path() {
            Ok(path) => path.into_owned(),
            Err(_) => continue,
        };
        if !is_pdf_member(&member) {
            continue;
        }

        let mut bytes = Vec::new();
        entry
            .take(max_bytes as u64 + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| PaperError::UnsupportedContent(format!("failed to decompress {}: {}", member.display(), e)))?;
        validate_pdf(&bytes, &member.display().to_string(), max_bytes)?;
        return Ok(bytes);
    }

    Err(PaperError::NotFound("no PDF in archive".to_string()))
}

fn is_pdf_member(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("pdf"))
}

#[async_trait]
impl SourceAdapter for PmcArchiveAdapter {
    fn label(&self) -> &str {
        SOURCE
    }

    fn missing_requirement(&self, identifier: &DocumentIdentifier) -> Option<String> {
        identifier.pmc_number().is_none().then(|| "no accession ID available".to_string())
    }

    async fn attempt(&self, identifier: &DocumentIdentifier) -> SourceAttemptResult {
        let Some(number) = identifier.pmc_number() else {
            return SourceAttemptResult::failure("no accession ID available");
        };

        let url = self.archive_url(number);
        let archive_error = match self.fetch_archive(&url).await {
            Ok(Some(bytes)) => {
                return match first_pdf_in_archive(&bytes, self.max_bytes) {
                    Ok(pdf) => SourceAttemptResult::Success(ResolvedPdf {
                        bytes: pdf,
                        source: SOURCE.to_string(),
                        url,
                    }),
                    Err(e) => SourceAttemptResult::Failure(e.to_string()),
                };
            }
            Ok(None) => "archive too large".to_string(),
            Err(reason) => reason,
        };

        // Second flavor: web delivery from the same repository
        let web_url = format!("{}/PMC{}/pdf/", self.web_base, number);
        match download_pdf(&self.client, &web_url, WEB_SOURCE, self.max_bytes).await {
            Ok(pdf) => SourceAttemptResult::Success(pdf),
            Err(e) => SourceAttemptResult::Failure(format!("{}; web fallback: {}", archive_error, e)),
        }
    }
}
