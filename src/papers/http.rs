//! Shared HTTP plumbing for the source adapters
//!
//! One routine downloads and validates a PDF so every adapter applies the same
//! acceptance rule: success status, PDF content-type, `%PDF` magic, size cap.

use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use super::ResolvedPdf;
use crate::error::{PaperError, Result};
use crate::settings::Settings;
use crate::utils::is_pdf_magic;

/// Build an HTTP client with the given timeout and the configured user agent
pub fn build_client(settings: &Settings, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(settings.user_agent())
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| PaperError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Map a non-success status to the matching error
pub fn status_error(what: &str, status: StatusCode) -> PaperError {
    if status == StatusCode::NOT_FOUND {
        PaperError::NotFound(format!("{} returned status {}", what, status))
    } else {
        PaperError::Transport(format!("{} returned status {}", what, status))
    }
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_ascii_lowercase())
}

/// Download a PDF and validate it
///
/// `application/octet-stream` is tolerated because some repositories serve
/// PDFs that way; the magic check below still rejects anything that is not a PDF.
pub async fn download_pdf(client: &Client, url: &str, source: &str, max_bytes: usize) -> Result<ResolvedPdf> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| PaperError::Transport(format!("Failed to download PDF from {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(status_error(url, status));
    }

    match content_type(&response) {
        Some(ct) if ct.contains("pdf") || ct.contains("octet-stream") => {}
        Some(ct) => {
            return Err(PaperError::UnsupportedContent(format!("{} returned non-PDF content: {}", url, ct)));
        }
        None => {
            return Err(PaperError::UnsupportedContent(format!("{} returned no content-type", url)));
        }
    }

    // Store final URL before consuming response
    let final_url = response.url().to_string();

    let bytes = read_body_capped(response, max_bytes)
        .await
        .map_err(|e| PaperError::Transport(format!("Failed to read PDF bytes from {}: {}", url, e)))?
        .ok_or_else(|| too_large(url, max_bytes))?;

    validate_pdf(&bytes, url, max_bytes)?;

    Ok(ResolvedPdf {
        bytes,
        source: source.to_string(),
        url: final_url,
    })
}

/// Read a response body, stopping as soon as it passes `limit` bytes
///
/// `Ok(None)` means the body is over the limit. A declared `Content-Length`
/// is checked up front; chunked bodies are counted as they arrive.
pub async fn read_body_capped(mut response: Response, limit: usize) -> std::result::Result<Option<Vec<u8>>, reqwest::Error> {
    if response.content_length().map_or(false, |len| len as usize > limit) {
        return Ok(None);
    }

    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if buf.len() + chunk.len() > limit {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Some(buf))
}

/// Magic-byte and size checks shared by web downloads and archive members
pub fn validate_pdf(bytes: &[u8], origin: &str, max_bytes: usize) -> Result<()> {
    if !is_pdf_magic(bytes) {
        return Err(PaperError::UnsupportedContent(format!("{} did not return a valid PDF", origin)));
    }
    if bytes.len() > max_bytes {
        return Err(too_large(origin, max_bytes));
    }
    Ok(())
}

fn too_large(origin: &str, limit: usize) -> PaperError {
    PaperError::UnsupportedContent(format!("PDF from {} exceeds the {} byte limit", origin, limit))
}
