//! PDF Resolver - Priority-based fallback chain
//!
//! Tries sources in fixed order:
//! 1. PMC bulk archive (falls back to PMC web delivery)
//! 2. PMC article pages
//! 3. Europe PMC
//! 4. Unpaywall
//! 5. Unrestricted mirror (only when explicitly enabled)
//!
//! Stops at the first success. Otherwise returns one failure reason per
//! source, including sources skipped for lack of an identifier.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::europepmc::EuropePmcAdapter;
use super::mirror::MirrorAdapter;
use super::pmc::PmcWebAdapter;
use super::pmc_archive::PmcArchiveAdapter;
use super::throttle::{Sleeper, ThrottlePolicy, TokioSleeper};
use super::unpaywall::UnpaywallAdapter;
use super::{CascadeOutcome, DocumentIdentifier, ResolutionStats, SourceAttemptResult, SourceFailure};
use crate::error::Result;
use crate::settings::Settings;

/// One external content source
///
/// `attempt` must always return a value: network errors and non-PDF
/// responses are failures, never panics or errors.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn label(&self) -> &str;

    /// Reason this source cannot run for the identifier, if any.
    /// Checked before any network traffic or throttle delay.
    fn missing_requirement(&self, _identifier: &DocumentIdentifier) -> Option<String> {
        None
    }

    async fn attempt(&self, identifier: &DocumentIdentifier) -> SourceAttemptResult;
}

/// Observer for stage labels, kept apart from failure data
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, stage: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireOptions {
    /// Opt-in gate for the unrestricted mirror
    pub use_mirror: bool,
}

/// PDF Resolver that tries multiple sources in priority order
pub struct PdfResolver {
    adapters: Vec<Box<dyn SourceAdapter>>,
    mirror: Option<Box<dyn SourceAdapter>>,
    throttle: ThrottlePolicy,
    sleeper: Arc<dyn Sleeper>,
    observer: Option<Arc<dyn ProgressObserver>>,
    pub stats: ResolutionStats,
}

impl PdfResolver {
    /// Resolver over the given adapters, in the order given, without delays
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>, mirror: Option<Box<dyn SourceAdapter>>) -> Self {
        Self {
            adapters,
            mirror,
            throttle: ThrottlePolicy::none(),
            sleeper: Arc::new(TokioSleeper),
            observer: None,
            stats: ResolutionStats::new(),
        }
    }

    /// The standard chain built from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(PmcArchiveAdapter::new(settings)?),
            Box::new(PmcWebAdapter::new(settings)?),
            Box::new(EuropePmcAdapter::new(settings)?),
            Box::new(UnpaywallAdapter::new(settings)?),
        ];
        let mirror: Box<dyn SourceAdapter> = Box::new(MirrorAdapter::new(settings)?);

        Ok(Self::new(adapters, Some(mirror)).with_throttle(ThrottlePolicy::from_settings(settings)))
    }

    pub fn with_throttle(mut self, throttle: ThrottlePolicy) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn progress(&self, stage: &str) {
        if let Some(observer) = &self.observer {
            observer.on_progress(stage);
        }
    }

    /// Resolve a PDF using the priority-based fallback chain
    pub async fn resolve(&mut self, identifier: &DocumentIdentifier, options: AcquireOptions) -> CascadeOutcome {
        let mirror = if options.use_mirror { self.mirror.as_deref() } else { None };
        let chain: Vec<&dyn SourceAdapter> = self
            .adapters
            .iter()
            .map(|a| a.as_ref())
            .chain(mirror)
            .collect();

        let mut failures = Vec::new();
        let mut network_attempts = 0usize;
        let mut outcome = None;

        for adapter in chain {
            let label = adapter.label().to_string();

            if let Some(reason) = adapter.missing_requirement(identifier) {
                info!(source = %label, reason = %reason, "Skipping source");
                failures.push(SourceFailure { source: label, reason });
                continue;
            }

            if network_attempts > 0 {
                self.sleeper.sleep(self.throttle.delay_before(&label)).await;
            }
            network_attempts += 1;

            self.progress(&format!("Trying {}", label));
            info!(source = %label, pmid = identifier.primary_id(), "Trying source");

            let attempt = adapter.attempt(identifier).await;
            self.stats.record(&label, attempt.is_success());

            match attempt {
                SourceAttemptResult::Success(pdf) => {
                    info!(source = %label, bytes = pdf.bytes.len(), url = %pdf.url, "PDF acquired");
                    outcome = Some(pdf);
                    break;
                }
                SourceAttemptResult::Failure(reason) => {
                    warn!(source = %label, reason = %reason, "Source failed");
                    failures.push(SourceFailure { source: label, reason });
                }
            }
        }

        match outcome {
            Some(pdf) => {
                self.progress(&format!("Acquired via {}", pdf.source));
                CascadeOutcome::Acquired(pdf)
            }
            None => {
                self.progress("All sources exhausted");
                CascadeOutcome::Exhausted(failures)
            }
        }
    }

    /// Get statistics summary
    pub fn get_stats(&self) -> &ResolutionStats {
        &self.stats
    }
}
