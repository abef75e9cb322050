//! Full-text acquisition for biomedical literature
//!
//! A PubMed ID goes through four steps, each usable on its own:
//! [`resolve_identifiers`] finds the DOI and PMC accession, [`acquire_pdf`]
//! runs the source cascade, [`extract_text`] pulls text out of the PDF and
//! [`translate`] translates it chunk by chunk. [`pipeline::DocumentPipeline`]
//! strings them together.

pub mod error;
pub mod papers;
pub mod pipeline;
pub mod pubmed;
pub mod settings;
pub mod translator;
pub mod utils;

pub use error::{PaperError, Result};
pub use papers::pdf_extractor::ExtractionOutcome;
pub use papers::resolver::AcquireOptions;
pub use papers::{AuxiliaryId, CascadeOutcome, DocumentIdentifier, ResolvedPdf};
pub use settings::Settings;
pub use translator::TranslationMode;

use papers::identifiers::IdentifierResolver;
use papers::pdf_extractor::TextExtractor;
use papers::resolver::PdfResolver;
use translator::Translator;

/// Look up the auxiliary identifiers for a primary ID
pub async fn resolve_identifiers(settings: &Settings, primary_id: &str) -> Result<DocumentIdentifier> {
    IdentifierResolver::new(settings)?.resolve(primary_id).await
}

/// Run the acquisition cascade once
///
/// Only building the HTTP clients can fail; source failures come back inside
/// [`CascadeOutcome::Exhausted`].
pub async fn acquire_pdf(settings: &Settings, identifier: &DocumentIdentifier, use_mirror: bool) -> Result<CascadeOutcome> {
    let mut resolver = PdfResolver::from_settings(settings)?;
    Ok(resolver.resolve(identifier, AcquireOptions { use_mirror }).await)
}

/// Extract text from PDF bytes with the engines available in this build
pub fn extract_text(settings: &Settings, bytes: &[u8]) -> ExtractionOutcome {
    TextExtractor::from_settings(settings).extract(bytes)
}

/// Translate text with the selected backend
pub async fn translate(settings: &Settings, text: &str, mode: TranslationMode) -> Result<String> {
    Translator::from_settings(settings, mode)?.translate(text).await
}
