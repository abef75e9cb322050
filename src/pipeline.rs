//! End-to-end processing of one document
//!
//! Steps run strictly in order: identifiers, acquisition, extraction,
//! translation. Every terminal failure carries a diagnostic string and there
//! is no retry; a caller wanting another go starts a new run.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PaperError, Result};
use crate::papers::identifiers::IdentifierResolver;
use crate::papers::pdf_extractor::TextExtractor;
use crate::papers::resolver::{AcquireOptions, PdfResolver};
use crate::papers::{CascadeOutcome, DocumentIdentifier};
use crate::settings::Settings;
use crate::translator::{TranslationMode, Translator};

/// Provenance of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub primary_id: String,
    pub doi: Option<String>,
    pub pmcid: Option<String>,
    /// Source label that delivered the PDF
    pub source: String,
    pub url: String,
    pub pdf_bytes: usize,
    /// Extraction engine label
    pub engine: String,
    pub extracted_chars: usize,
    pub chunks: usize,
    pub translated_text: String,
}

/// Terminal state of one run
#[derive(Debug, Clone)]
pub enum PipelineState {
    TranslationComplete(PipelineReport),
    /// Identifier lookup failed before any source was tried
    LookupFailed(String),
    CascadeExhausted(String),
    ExtractionInsufficient(String),
    TranslationFailed(String),
}

impl PipelineState {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineState::TranslationComplete(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::TranslationComplete(_) => "translation-complete",
            PipelineState::LookupFailed(_) => "lookup-failed",
            PipelineState::CascadeExhausted(_) => "cascade-exhausted",
            PipelineState::ExtractionInsufficient(_) => "extraction-insufficient",
            PipelineState::TranslationFailed(_) => "translation-failed",
        }
    }

    pub fn diagnostic(&self) -> String {
        match self {
            PipelineState::TranslationComplete(report) => format!(
                "Translated {} chunk(s) from {} via {} ({})",
                report.chunks, report.primary_id, report.source, report.engine
            ),
            PipelineState::LookupFailed(d)
            | PipelineState::CascadeExhausted(d)
            | PipelineState::ExtractionInsufficient(d)
            | PipelineState::TranslationFailed(d) => d.clone(),
        }
    }
}

pub struct DocumentPipeline {
    identifiers: IdentifierResolver,
    resolver: PdfResolver,
    extractor: TextExtractor,
    translator: Translator,
    options: AcquireOptions,
}

impl DocumentPipeline {
    pub fn new(
        identifiers: IdentifierResolver,
        resolver: PdfResolver,
        extractor: TextExtractor,
        translator: Translator,
    ) -> Self {
        Self {
            identifiers,
            resolver,
            extractor,
            translator,
            options: AcquireOptions::default(),
        }
    }

    pub fn from_settings(settings: &Settings, mode: TranslationMode) -> Result<Self> {
        Ok(Self::new(
            IdentifierResolver::new(settings)?,
            PdfResolver::from_settings(settings)?,
            TextExtractor::from_settings(settings),
            Translator::from_settings(settings, mode)?,
        )
        .with_options(AcquireOptions {
            use_mirror: settings.use_mirror,
        }))
    }

    pub fn with_options(mut self, options: AcquireOptions) -> Self {
        self.options = options;
        self
    }

    pub fn resolver(&self) -> &PdfResolver {
        &self.resolver
    }

    /// Run one document from primary ID to translated text
    pub async fn run(&mut self, primary_id: &str) -> PipelineState {
        let identifier = match self.identifiers.resolve(primary_id).await {
            Ok(id) => id,
            Err(e) => {
                warn!(pmid = primary_id, error = %e, "Identifier resolution failed");
                return PipelineState::LookupFailed(e.to_string());
            }
        };
        self.run_with_identifier(identifier).await
    }

    /// Run from an already resolved identifier
    pub async fn run_with_identifier(&mut self, identifier: DocumentIdentifier) -> PipelineState {
        let pdf = match self.resolver.resolve(&identifier, self.options).await {
            CascadeOutcome::Acquired(pdf) => pdf,
            exhausted @ CascadeOutcome::Exhausted(_) => {
                return PipelineState::CascadeExhausted(exhausted.diagnostic());
            }
        };

        let extraction = self.extractor.extract(&pdf.bytes);
        if !extraction.is_sufficient() {
            let chars = extraction.text.chars().count();
            let err = PaperError::ExtractionInsufficient(format!(
                "no engine produced enough text from the PDF via {} (best: {} characters)",
                pdf.source, chars
            ));
            warn!(pmid = identifier.primary_id(), error = %err, "Extraction failed");
            return PipelineState::ExtractionInsufficient(err.to_string());
        }

        let chunks = self.translator.chunk_count(&extraction.text);
        info!(
            pmid = identifier.primary_id(),
            source = %pdf.source,
            engine = %extraction.engine,
            chunks,
            "Translating extracted text"
        );

        match self.translator.translate(&extraction.text).await {
            Ok(translated_text) => PipelineState::TranslationComplete(PipelineReport {
                primary_id: identifier.primary_id().to_string(),
                doi: identifier.doi().map(str::to_string),
                pmcid: identifier.pmcid().map(str::to_string),
                source: pdf.source,
                url: pdf.url,
                pdf_bytes: pdf.bytes.len(),
                engine: extraction.engine,
                extracted_chars: extraction.text.chars().count(),
                chunks,
                translated_text,
            }),
            Err(e) => PipelineState::TranslationFailed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::papers::pdf_extractor::ExtractionEngine;
    use crate::papers::resolver::SourceAdapter;
    use crate::papers::{AuxiliaryId, ResolvedPdf, SourceAttemptResult};
    use crate::translator::TranslationBackend;
    use async_trait::async_trait;

    struct StaticSource(Option<&'static [u8]>);

    #[async_trait]
    impl SourceAdapter for StaticSource {
        fn label(&self) -> &str {
            "static"
        }

        async fn attempt(&self, _identifier: &DocumentIdentifier) -> SourceAttemptResult {
            match self.0 {
                Some(bytes) => SourceAttemptResult::Success(ResolvedPdf {
                    bytes: bytes.to_vec(),
                    source: "static".to_string(),
                    url: "https://static.example/paper.pdf".to_string(),
                }),
                None => SourceAttemptResult::failure("HTTP 403"),
            }
        }
    }

    struct FixedText(usize);

    impl ExtractionEngine for FixedText {
        fn label(&self) -> &str {
            "fixed"
        }

        fn try_extract(&self, _bytes: &[u8], _max_pages: usize) -> Option<String> {
            Some("x".repeat(self.0))
        }
    }

    struct Upper {
        fail: bool,
    }

    #[async_trait]
    impl TranslationBackend for Upper {
        fn label(&self) -> &str {
            "upper"
        }

        async fn translate_chunk(&self, chunk: &str) -> crate::error::Result<String> {
            if self.fail {
                return Err(PaperError::Transport("API error 500".to_string()));
            }
            Ok(chunk.to_uppercase())
        }
    }

    fn pipeline(pdf: Option<&'static [u8]>, chars: usize, fail_translation: bool) -> DocumentPipeline {
        let settings = Settings::default();
        DocumentPipeline::new(
            IdentifierResolver::new(&settings).unwrap(),
            PdfResolver::new(vec![Box::new(StaticSource(pdf))], None),
            TextExtractor::new(vec![Box::new(FixedText(chars))], 15, 200),
            Translator::new(Box::new(Upper { fail: fail_translation }), 4000),
        )
    }

    fn identifier() -> DocumentIdentifier {
        DocumentIdentifier::new("12345", vec![AuxiliaryId::PmcAccession("PMC999".to_string())])
    }

    #[tokio::test]
    async fn test_complete_run_reports_provenance() {
        let state = pipeline(Some(&b"%PDF-1.4"[..]), 5000, false).run_with_identifier(identifier()).await;
        match state {
            PipelineState::TranslationComplete(report) => {
                assert_eq!(report.source, "static");
                assert_eq!(report.engine, "fixed");
                assert_eq!(report.chunks, 2);
                assert_eq!(report.pmcid.as_deref(), Some("PMC999"));
                assert_eq!(report.translated_text, format!("{}\n\n{}", "X".repeat(4000), "X".repeat(1000)));
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhausted_cascade_is_terminal() {
        let state = pipeline(None, 5000, false).run_with_identifier(identifier()).await;
        assert_eq!(state.name(), "cascade-exhausted");
        assert!(state.diagnostic().contains("static: HTTP 403"));
    }

    #[tokio::test]
    async fn test_short_extraction_is_terminal() {
        let state = pipeline(Some(&b"%PDF-1.4"[..]), 120, false).run_with_identifier(identifier()).await;
        assert_eq!(state.name(), "extraction-insufficient");
        assert_eq!(
            state.diagnostic(),
            "extraction insufficient: no engine produced enough text from the PDF via static (best: 120 characters)"
        );
    }

    #[tokio::test]
    async fn test_translation_failure_discards_work() {
        let state = pipeline(Some(&b"%PDF-1.4"[..]), 5000, true).run_with_identifier(identifier()).await;
        assert!(!state.is_success());
        assert_eq!(state.diagnostic(), "translation failed at chunk 1/2: transport error: API error 500");
    }

    #[test]
    fn test_from_settings_needs_backend_key() {
        let mut settings = Settings::default();
        assert!(DocumentPipeline::from_settings(&settings, TranslationMode::DeepL).is_err());
        settings.deepl_api_key = Some("key".to_string());
        assert!(DocumentPipeline::from_settings(&settings, TranslationMode::DeepL).is_ok());
    }

    #[tokio::test]
    async fn test_empty_primary_id_fails_lookup() {
        let state = pipeline(Some(&b"%PDF-1.4"[..]), 5000, false).run("  ").await;
        assert_eq!(state.name(), "lookup-failed");
    }
}
