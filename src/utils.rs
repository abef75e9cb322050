/// Shared utility functions

/// Safely truncate a string at a UTF-8 boundary
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if max_bytes >= s.len() { return s; }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Short single-line preview of a response body for diagnostics
pub fn body_preview(body: &str) -> String {
    let flat: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let cut = safe_truncate(&flat, 160);
    if cut.len() < flat.len() {
        format!("{}...", cut)
    } else {
        flat
    }
}

/// Check for the `%PDF` magic header
pub fn is_pdf_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && &bytes[0..4] == b"%PDF"
}

/// Percent-encode a DOI for use as URL path segments, keeping its `/` separators
pub fn encode_doi_path(doi: &str) -> String {
    doi.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}
