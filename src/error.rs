//! Error taxonomy for the acquisition pipeline
//!
//! Adapters and extraction engines never let these escape: they are turned
//! into reason strings at the adapter boundary so the cascade keeps going.
//! Only identifier resolution and translation surface them to callers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaperError {
    /// Network failure or timeout talking to a third party
    #[error("transport error: {0}")]
    Transport(String),

    /// Identifier absent, or the source reports no record
    #[error("not found: {0}")]
    NotFound(String),

    /// Response succeeded but the payload is not a PDF
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),

    /// No extraction engine produced enough text
    #[error("extraction insufficient: {0}")]
    ExtractionInsufficient(String),

    /// A translation backend call failed; the whole unit is discarded
    #[error("translation failed at chunk {}/{total}: {reason}", chunk + 1)]
    Translation {
        chunk: usize,
        total: usize,
        reason: String,
    },

    /// Identifier resolution failed on transport or parse
    #[error("lookup error: {0}")]
    Lookup(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PaperError>;
