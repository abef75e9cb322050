//! PDF text extraction
//!
//! Engines are tried in quality order and the first whose output clears the
//! minimum length wins:
//! 1. `pdf-extract` (layout-aware; behind the `layout-engine` feature)
//! 2. `lopdf` page text (font-encoding aware, page by page)
//! 3. raw content-stream text operators (baseline)
//!
//! Each engine reads at most the first `max_pages` pages. If nothing clears
//! the threshold the longest text is returned labelled [`PARTIAL_EXTRACTION`],
//! which callers must treat as too little content to go on.

use lopdf::content::Content;
use lopdf::{Document, Object};
use tracing::{debug, info};

use crate::settings::Settings;

/// Engine label used when no engine produced enough text
pub const PARTIAL_EXTRACTION: &str = "partial extraction";

/// One text extraction backend
///
/// `None` and empty text mean the same thing: nothing usable.
pub trait ExtractionEngine: Send + Sync {
    fn label(&self) -> &str;
    fn try_extract(&self, bytes: &[u8], max_pages: usize) -> Option<String>;
}

/// Extracted text plus the engine that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub text: String,
    pub engine: String,
}

impl ExtractionOutcome {
    pub fn is_sufficient(&self) -> bool {
        self.engine != PARTIAL_EXTRACTION
    }
}

/// Layout-aware extraction via pdf-extract
///
/// pdf-extract always walks the whole page tree, so the document is cut down
/// to the first `max_pages` pages with lopdf before it is handed over.
#[cfg(feature = "layout-engine")]
pub struct LayoutEngine;

#[cfg(feature = "layout-engine")]
impl ExtractionEngine for LayoutEngine {
    fn label(&self) -> &str {
        "pdf-extract"
    }

    fn try_extract(&self, bytes: &[u8], max_pages: usize) -> Option<String> {
        let input = keep_first_pages(bytes, max_pages);
        // pdf-extract panics on some malformed font tables
        let pages = quiet_catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(&input))?.ok()?;
        Some(pages.into_iter().take(max_pages).collect::<Vec<_>>().join("\n"))
    }
}

/// Drop every page after `max_pages`; unparseable or short documents pass through
#[cfg(feature = "layout-engine")]
fn keep_first_pages(bytes: &[u8], max_pages: usize) -> std::borrow::Cow<'_, [u8]> {
    use std::borrow::Cow;

    let Ok(mut doc) = Document::load_mem(bytes) else {
        return Cow::Borrowed(bytes);
    };
    let excess: Vec<u32> = doc.get_pages().into_keys().filter(|&n| n as usize > max_pages).collect();
    if excess.is_empty() {
        return Cow::Borrowed(bytes);
    }

    doc.delete_pages(&excess);
    let mut buf = Vec::new();
    match doc.save_to(&mut buf) {
        Ok(()) => {
            debug!(dropped = excess.len(), "Trimmed pages before layout extraction");
            Cow::Owned(buf)
        }
        Err(_) => Cow::Borrowed(bytes),
    }
}

#[cfg(feature = "layout-engine")]
thread_local! {
    static SILENCE_PANICS: std::cell::Cell<bool> = std::cell::Cell::new(false);
}

/// `catch_unwind` that keeps the panic message off stderr
///
/// The process-wide hook is wrapped once; it stays silent only on the thread
/// currently inside this call and defers to the previous hook everywhere else.
#[cfg(feature = "layout-engine")]
fn quiet_catch_unwind<T>(f: impl FnOnce() -> T + std::panic::UnwindSafe) -> Option<T> {
    static WRAP_HOOK: std::sync::Once = std::sync::Once::new();
    WRAP_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if !SILENCE_PANICS.with(|s| s.get()) {
                previous(info);
            }
        }));
    });

    SILENCE_PANICS.with(|s| s.set(true));
    let result = std::panic::catch_unwind(f);
    SILENCE_PANICS.with(|s| s.set(false));

    if result.is_err() {
        debug!("pdf-extract panicked; engine skipped");
    }
    result.ok()
}

fn first_pages(doc: &Document, max_pages: usize) -> Vec<(u32, lopdf::ObjectId)> {
    doc.get_pages().into_iter().take(max_pages).collect()
}

/// Page-by-page text through lopdf's font-aware decoder
pub struct PageTextEngine;

impl ExtractionEngine for PageTextEngine {
    fn label(&self) -> &str {
        "lopdf"
    }

    fn try_extract(&self, bytes: &[u8], max_pages: usize) -> Option<String> {
        let doc = Document::load_mem(bytes).ok()?;
        let mut out = Vec::new();
        for (number, _) in first_pages(&doc, max_pages) {
            // One bad page should not sink the rest
            if let Ok(text) = doc.extract_text(&[number]) {
                out.push(text);
            }
        }
        Some(out.join("\n"))
    }
}

/// Baseline: string operands of the text-showing operators, bytes read as Latin-1
pub struct ContentStreamEngine;

impl ContentStreamEngine {
    fn push_string(out: &mut String, obj: &Object) {
        match obj {
            Object::String(bytes, _) => {
                out.extend(bytes.iter().map(|&b| b as char).filter(|c| !c.is_control() || *c == '\n'));
            }
            Object::Array(items) => {
                for item in items {
                    match item {
                        Object::String(..) => Self::push_string(out, item),
                        // Large negative kerning in TJ arrays is a word gap
                        Object::Integer(n) if *n < -200 => out.push(' '),
                        Object::Real(n) if *n < -200.0 => out.push(' '),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn page_text(doc: &Document, page_id: lopdf::ObjectId) -> Option<String> {
        let raw = doc.get_page_content(page_id).ok()?;
        let content = Content::decode(&raw).ok()?;

        let mut text = String::new();
        for op in &content.operations {
            match op.operator.as_str() {
                "Tj" | "TJ" => {
                    if let Some(obj) = op.operands.first() {
                        Self::push_string(&mut text, obj);
                    }
                }
                "'" | "\"" => {
                    text.push('\n');
                    if let Some(obj) = op.operands.last() {
                        Self::push_string(&mut text, obj);
                    }
                }
                "T*" | "Td" | "TD" | "ET" => {
                    if !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                }
                _ => {}
            }
        }
        Some(text)
    }
}

impl ExtractionEngine for ContentStreamEngine {
    fn label(&self) -> &str {
        "content-stream"
    }

    fn try_extract(&self, bytes: &[u8], max_pages: usize) -> Option<String> {
        let doc = Document::load_mem(bytes).ok()?;
        let pages: Vec<String> = first_pages(&doc, max_pages)
            .into_iter()
            .filter_map(|(_, id)| Self::page_text(&doc, id))
            .collect();
        Some(pages.join("\n"))
    }
}

/// Engines available in this build, in quality order
pub fn default_engines() -> Vec<Box<dyn ExtractionEngine>> {
    let mut engines: Vec<Box<dyn ExtractionEngine>> = Vec::new();
    #[cfg(feature = "layout-engine")]
    engines.push(Box::new(LayoutEngine));
    engines.push(Box::new(PageTextEngine));
    engines.push(Box::new(ContentStreamEngine));
    engines
}

pub struct TextExtractor {
    engines: Vec<Box<dyn ExtractionEngine>>,
    max_pages: usize,
    min_chars: usize,
}

impl TextExtractor {
    pub fn new(engines: Vec<Box<dyn ExtractionEngine>>, max_pages: usize, min_chars: usize) -> Self {
        Self { engines, max_pages, min_chars }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(default_engines(), settings.extraction_max_pages, settings.extraction_min_chars)
    }

    /// Extract text from PDF bytes
    pub fn extract(&self, bytes: &[u8]) -> ExtractionOutcome {
        let mut best = String::new();

        for engine in &self.engines {
            let text = engine
                .try_extract(bytes, self.max_pages)
                .map(|t| t.trim().to_string())
                .unwrap_or_default();
            let chars = text.chars().count();
            debug!(engine = engine.label(), chars, "Extraction attempt");

            if chars > self.min_chars {
                info!(engine = engine.label(), chars, "Extraction accepted");
                return ExtractionOutcome {
                    text,
                    engine: engine.label().to_string(),
                };
            }
            if chars > best.chars().count() {
                best = text;
            }
        }

        info!(chars = best.chars().count(), "No engine cleared the extraction threshold");
        ExtractionOutcome {
            text: best,
            engine: PARTIAL_EXTRACTION.to_string(),
        }
    }
}
