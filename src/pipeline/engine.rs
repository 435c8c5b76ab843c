//! The recognition-engine boundary.
//!
//! The engine is an opaque collaborator: it receives one page image (as a
//! file) plus a compiled instruction and answers with tagged free text. The
//! pipeline never assumes it is safe to call concurrently, so calls are
//! issued one page at a time.
//!
//! ## Why a handle instead of a global?
//!
//! Model weights can take minutes to load. A server wants to accept
//! connections before that finishes and answer "not ready" meanwhile.
//! [`EngineHandle`] is a cloneable install-once slot: every clone observes
//! the same engine once [`EngineHandle::install`] succeeds, and
//! [`EngineHandle::get`] returns [`OcrError::EngineUnavailable`] until then.

use crate::error::OcrError;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything the engine needs for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub instruction: String,
    /// Transient PNG of the page; valid only for the duration of the call.
    pub image_path: PathBuf,
    /// Per-request working directory the engine may write artifacts into.
    pub output_dir: PathBuf,
    pub base_size: u32,
    pub image_size: u32,
    pub crop_mode: bool,
    pub test_compress: bool,
}

/// What an engine may answer with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    Text(String),
    /// An object exposing a text field.
    Structured { text: String },
    Lines(Vec<String>),
    Empty,
}

impl EngineOutput {
    /// Collapse to a single trimmed string. Lines are joined with `\n`.
    pub fn into_text(self) -> String {
        match self {
            EngineOutput::Text(text) | EngineOutput::Structured { text } => text.trim().to_string(),
            EngineOutput::Lines(lines) => lines.join("\n").trim().to_string(),
            EngineOutput::Empty => String::new(),
        }
    }
}

impl From<String> for EngineOutput {
    fn from(text: String) -> Self {
        EngineOutput::Text(text)
    }
}

impl From<&str> for EngineOutput {
    fn from(text: &str) -> Self {
        EngineOutput::Text(text.to_string())
    }
}

impl From<Vec<String>> for EngineOutput {
    fn from(lines: Vec<String>) -> Self {
        EngineOutput::Lines(lines)
    }
}

/// A recognition engine.
///
/// Errors should be [`OcrError::EngineFailure`]; anything else is passed
/// through unchanged.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    async fn infer(&self, request: &InferenceRequest) -> Result<EngineOutput, OcrError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "engine"
    }
}

/// Cloneable, install-once slot holding the engine.
#[derive(Clone, Default)]
pub struct EngineHandle {
    slot: Arc<OnceCell<Arc<dyn RecognitionEngine>>>,
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("engine", &self.slot.get().map(|e| e.name().to_string()))
            .finish()
    }
}

impl EngineHandle {
    /// A handle with no engine yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A handle that is ready immediately.
    pub fn ready(engine: Arc<dyn RecognitionEngine>) -> Self {
        let handle = Self::empty();
        // A fresh cell cannot already be full.
        let _ = handle.slot.set(engine);
        handle
    }

    /// Install the engine. Fails if one is already installed.
    pub fn install(&self, engine: Arc<dyn RecognitionEngine>) -> Result<(), OcrError> {
        self.slot
            .set(engine)
            .map_err(|_| OcrError::InvalidConfig("recognition engine already installed".into()))
    }

    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn get(&self) -> Result<Arc<dyn RecognitionEngine>, OcrError> {
        self.slot
            .get()
            .cloned()
            .ok_or_else(|| OcrError::EngineUnavailable {
                hint: "The model is still loading or failed to load; retry shortly.".into(),
            })
    }
}
