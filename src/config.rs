//! Configuration types for document extraction.
//!
//! Pipeline behaviour (rasterisation, worker pool, figure cropping) is
//! controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The bundled vision-LLM engine has its own
//! [`VlmSettings`] since it is only one of many possible engines.
//!
//! Per-call knobs that the HTTP form supplies (`mode`, `base_size`, …) live on
//! [`crate::request::ExtractionRequest`], not here.

use crate::error::OcrError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Default rasterisation resolution.
pub const DEFAULT_DPI: u32 = 144;

/// Default size of the rasterisation worker pool.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Decompression-bomb ceiling: 500 megapixels.
pub const DEFAULT_MAX_IMAGE_PIXELS: u64 = 500_000_000;

/// Configuration for the extraction pipeline.
///
/// # Example
/// ```rust
/// use edgequake_ocr::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(200)
///     .max_workers(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI for PDF pages, scaled from the 72-dpi PDF baseline.
    /// Range: 72–600. Default: 144.
    pub dpi: u32,

    /// Upper bound on concurrent page renders. Default: 4.
    ///
    /// The pool actually used is `min(max_workers, page_count)`.
    pub max_workers: usize,

    /// Largest raster (width × height) the rasteriser will produce or decode.
    /// Default: 500 000 000.
    pub max_image_pixels: u64,

    /// Crop `image`-labelled detections into `PageResult::figures`. Default: false.
    pub crop_figures: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            max_workers: DEFAULT_MAX_WORKERS,
            max_image_pixels: DEFAULT_MAX_IMAGE_PIXELS,
            crop_figures: false,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_workers", &self.max_workers)
            .field("max_image_pixels", &self.max_image_pixels)
            .field("crop_figures", &self.crop_figures)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overlaid with `MAX_PDF_WORKERS` and `OCR_PDF_DPI`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut builder = Self::builder();
        if let Some(raw) = lookup("MAX_PDF_WORKERS") {
            match raw.trim().parse::<usize>() {
                Ok(n) => builder = builder.max_workers(n),
                Err(_) => warn!("Ignoring MAX_PDF_WORKERS={raw:?}: not a positive integer"),
            }
        }
        if let Some(raw) = lookup("OCR_PDF_DPI") {
            match raw.trim().parse::<u32>() {
                Ok(dpi) => builder = builder.dpi(dpi),
                Err(_) => warn!("Ignoring OCR_PDF_DPI={raw:?}: not a positive integer"),
            }
        }
        builder.config
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.max_workers = n.max(1);
        self
    }

    pub fn max_image_pixels(mut self, px: u64) -> Self {
        self.config.max_image_pixels = px;
        self
    }

    pub fn crop_figures(mut self, v: bool) -> Self {
        self.config.crop_figures = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, OcrError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(OcrError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.max_workers == 0 {
            return Err(OcrError::InvalidConfig("max_workers must be ≥ 1".into()));
        }
        if c.max_image_pixels == 0 {
            return Err(OcrError::InvalidConfig(
                "max_image_pixels must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Vision-LLM engine settings ───────────────────────────────────────────

/// Settings for [`crate::pipeline::vlm::VlmEngine`].
#[derive(Clone)]
pub struct VlmSettings {
    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Model identifier. If None, uses `gpt-4.1-nano`.
    pub model: Option<String>,

    /// Sampling temperature. Default: 0.0 (transcription, not creativity).
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a failed call. Default: 3.
    pub max_retries: u32,

    /// Initial backoff in milliseconds, doubled per retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Overrides [`crate::prompts::VLM_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,
}

impl Default for VlmSettings {
    fn default() -> Self {
        Self {
            provider: None,
            provider_name: None,
            model: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for VlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VlmSettings")
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.dpi, 144);
        assert_eq!(c.max_workers, 4);
        assert_eq!(c.max_image_pixels, 500_000_000);
        assert!(!c.crop_figures);
    }

    #[test]
    fn builder_clamps() {
        let c = ExtractionConfig::builder()
            .dpi(10)
            .max_workers(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 72);
        assert_eq!(c.max_workers, 1);
    }

    #[test]
    fn zero_pixel_limit_rejected() {
        let err = ExtractionConfig::builder().max_image_pixels(0).build();
        assert!(matches!(err, Err(OcrError::InvalidConfig(_))));
    }

    #[test]
    fn env_overlay() {
        let env: HashMap<&str, &str> = [("MAX_PDF_WORKERS", "8"), ("OCR_PDF_DPI", "200")].into();
        let c = ExtractionConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.max_workers, 8);
        assert_eq!(c.dpi, 200);
    }

    #[test]
    fn env_overlay_ignores_garbage() {
        let c = ExtractionConfig::from_lookup(|k| {
            (k == "MAX_PDF_WORKERS").then(|| "lots".to_string())
        });
        assert_eq!(c.max_workers, DEFAULT_MAX_WORKERS);
    }

    #[test]
    fn vlm_settings_debug_hides_provider() {
        let s = format!("{:?}", VlmSettings::default());
        assert!(s.contains("max_retries: 3"));
    }
}
