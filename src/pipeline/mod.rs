//! Pipeline stages for document extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different PDF backend or recognition engine)
//! without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ orchestrate ──────────────────────▶ aggregate
//! (bytes)   (pages)     │ encode → engine → detect        (DocumentResult)
//!                       └ one page at a time
//! ```
//!
//! 1. [`input`]       — load a path, URL or upload into a `SourceDocument`
//! 2. [`render`]      — rasterise pages; PDF pages render concurrently on
//!    blocking threads and are re-ordered by index
//! 3. [`encode`]      — PNG/base64 encoding and transient page files
//! 4. [`engine`]      — the recognition-engine boundary and readiness handle
//! 5. [`vlm`]         — a vision-LLM implementation of that boundary
//! 6. [`detect`]      — parse `<|ref|>…<|det|>` markup into pixel boxes
//! 7. [`orchestrate`] — per-page engine calls and result assembly
//! 8. [`aggregate`]   — merge pages into one document result
//! 9. [`postprocess`] — deterministic text tidy rules applied before export

pub mod aggregate;
pub mod detect;
pub mod encode;
pub mod engine;
pub mod input;
pub mod orchestrate;
pub mod postprocess;
pub mod render;
pub mod vlm;
