//! Full-text PDF acquisition for biomedical papers
//!
//! This module provides multi-source PDF downloading with priority-based fallback:
//! 1. PMC bulk archive (with PMC web delivery as second flavor)
//! 2. PMC article pages
//! 3. Europe PMC render service
//! 4. Unpaywall
//! 5. Unrestricted mirror (opt-in only)
//!
//! Every adapter returns a [`SourceAttemptResult`]; errors are converted to
//! reason strings at the adapter boundary so the cascade can keep trying.

use std::fmt;

pub mod http;
pub mod identifiers;
pub mod pmc_archive;
pub mod pmc;
pub mod europepmc;
pub mod unpaywall;
pub mod mirror;
pub mod throttle;
pub mod resolver;
pub mod pdf_extractor;

/// Auxiliary identifier discovered for a paper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuxiliaryId {
    /// Cross-reference handle, e.g. `10.1000/xyz123`
    Doi(String),
    /// Repository accession, normalized to `PMC<digits>`
    PmcAccession(String),
}

/// Primary ID plus whatever auxiliary identifiers resolution found.
///
/// Built once by the identifier resolver and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentIdentifier {
    primary_id: String,
    auxiliary: Vec<AuxiliaryId>,
}

impl DocumentIdentifier {
    pub fn new(primary_id: impl Into<String>, auxiliary: Vec<AuxiliaryId>) -> Self {
        Self {
            primary_id: primary_id.into(),
            auxiliary,
        }
    }

    /// Identifier with no auxiliary IDs
    pub fn bare(primary_id: impl Into<String>) -> Self {
        Self::new(primary_id, Vec::new())
    }

    pub fn primary_id(&self) -> &str {
        &self.primary_id
    }

    pub fn auxiliary(&self) -> &[AuxiliaryId] {
        &self.auxiliary
    }

    pub fn doi(&self) -> Option<&str> {
        self.auxiliary.iter().find_map(|id| match id {
            AuxiliaryId::Doi(doi) => Some(doi.as_str()),
            _ => None,
        })
    }

    /// Accession in `PMC<digits>` form
    pub fn pmcid(&self) -> Option<&str> {
        self.auxiliary.iter().find_map(|id| match id {
            AuxiliaryId::PmcAccession(pmcid) => Some(pmcid.as_str()),
            _ => None,
        })
    }

    /// Numeric part of the accession (`PMC999` → `999`)
    pub fn pmc_number(&self) -> Option<u64> {
        self.pmcid()
            .and_then(|id| id.get(3..))
            .and_then(|digits| digits.parse().ok())
    }
}

/// Result of a successful PDF download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPdf {
    /// PDF bytes
    pub bytes: Vec<u8>,
    /// Source that provided the PDF ("pmc-archive", "pmc", "europepmc", "unpaywall", "mirror")
    pub source: String,
    /// URL the bytes came from (final URL after redirects where known)
    pub url: String,
}

/// Outcome of one adapter invocation. Consumed immediately by the cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAttemptResult {
    Success(ResolvedPdf),
    Failure(String),
}

impl SourceAttemptResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        SourceAttemptResult::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SourceAttemptResult::Success(_))
    }
}

impl From<crate::error::Result<ResolvedPdf>> for SourceAttemptResult {
    fn from(result: crate::error::Result<ResolvedPdf>) -> Self {
        match result {
            Ok(pdf) => SourceAttemptResult::Success(pdf),
            Err(e) => SourceAttemptResult::Failure(e.to_string()),
        }
    }
}

/// Why one source in the cascade failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

/// Terminal result of one cascade run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    Acquired(ResolvedPdf),
    /// One entry per attempted source, in cascade order
    Exhausted(Vec<SourceFailure>),
}

impl CascadeOutcome {
    /// Aggregated human-readable diagnostic for an exhausted run
    pub fn diagnostic(&self) -> String {
        match self {
            CascadeOutcome::Acquired(pdf) => format!("acquired via {}", pdf.source),
            CascadeOutcome::Exhausted(failures) => {
                let lines: Vec<String> = failures.iter().map(|f| format!("  - {}", f)).collect();
                format!("No PDF source succeeded:\n{}", lines.join("\n"))
            }
        }
    }
}

/// Attempt/success counters for one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub source: String,
    pub attempts: u32,
    pub successes: u32,
}

/// Statistics for PDF resolution across all sources
#[derive(Debug, Default, Clone)]
pub struct ResolutionStats {
    sources: Vec<SourceStats>,
}

impl ResolutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source: &str, success: bool) {
        let idx = match self.sources.iter().position(|s| s.source == source) {
            Some(idx) => idx,
            None => {
                self.sources.push(SourceStats {
                    source: source.to_string(),
                    ..SourceStats::default()
                });
                self.sources.len() - 1
            }
        };
        let entry = &mut self.sources[idx];
        entry.attempts += 1;
        if success {
            entry.successes += 1;
        }
    }

    pub fn get(&self, source: &str) -> Option<&SourceStats> {
        self.sources.iter().find(|s| s.source == source)
    }

    pub fn summary(&self) -> String {
        let mut out = String::from("PDF Resolution Results:\n");
        for s in &self.sources {
            if s.attempts > 0 {
                let rate = (s.successes as f64 / s.attempts as f64) * 100.0;
                out.push_str(&format!(
                    "  {:14} {:3}/{:3}  ({:.0}%)\n",
                    format!("{}:", s.source), s.successes, s.attempts, rate
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_accessors() {
        let id = DocumentIdentifier::new(
            "12345",
            vec![
                AuxiliaryId::Doi("10.1000/xyz".to_string()),
                AuxiliaryId::PmcAccession("PMC1234567".to_string()),
            ],
        );
        assert_eq!(id.primary_id(), "12345");
        assert_eq!(id.doi(), Some("10.1000/xyz"));
        assert_eq!(id.pmcid(), Some("PMC1234567"));
        assert_eq!(id.pmc_number(), Some(1234567));
    }

    #[test]
    fn test_bare_identifier_has_no_aux() {
        let id = DocumentIdentifier::bare("42");
        assert!(id.doi().is_none());
        assert!(id.pmcid().is_none());
        assert!(id.pmc_number().is_none());
    }

    #[test]
    fn test_exhausted_diagnostic_lists_sources_in_order() {
        let outcome = CascadeOutcome::Exhausted(vec![
            SourceFailure { source: "pmc".to_string(), reason: "no accession ID available".to_string() },
            SourceFailure { source: "unpaywall".to_string(), reason: "not open access".to_string() },
        ]);
        let diag = outcome.diagnostic();
        let pmc_at = diag.find("pmc: no accession").unwrap();
        let upw_at = diag.find("unpaywall: not open access").unwrap();
        assert!(pmc_at < upw_at);
    }

    #[test]
    fn test_stats_record() {
        let mut stats = ResolutionStats::new();
        stats.record("pmc", false);
        stats.record("pmc", true);
        stats.record("unpaywall", false);

        let pmc = stats.get("pmc").unwrap();
        assert_eq!((pmc.successes, pmc.attempts), (1, 2));
        assert!(stats.summary().contains("pmc:"));
        assert!(stats.summary().contains("(50%)"));
    }
}
