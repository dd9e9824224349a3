use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::encode::gif::GifOptions;
use crate::foundation::cache::CacheDir;
use crate::foundation::core::DEFAULT_PREFERRED_FPS;
use crate::foundation::error::{AssetError, AssetResult};
use crate::media::backend::{BackendKind, MediaBackend, create_backend};

/// Pipeline-wide settings, loadable from JSON. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frame rate used when no capture window is measured.
    pub preferred_fps: u32,
    /// Device scale applied to captured frames.
    pub capture_scale: f64,
    /// Artifact directory; `None` uses a process-scoped temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Samples in flight per writer channel before `wait_until_ready` blocks.
    pub writer_queue_depth: usize,
    /// Still offset as a fraction of the video duration, when no marker exists.
    pub still_offset_fraction: f64,
    pub jpeg_quality: u8,
    pub gif: GifOptions,
    pub backend: BackendKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preferred_fps: DEFAULT_PREFERRED_FPS,
            capture_scale: 1.0,
            cache_dir: None,
            writer_queue_depth: 4,
            still_offset_fraction: 0.5,
            jpeg_quality: 90,
            gif: GifOptions::default(),
            backend: BackendKind::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> AssetResult<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| AssetError::configuration(format!("invalid pipeline config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> AssetResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AssetError::configuration(format!("failed to read config '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> AssetResult<()> {
        if self.preferred_fps == 0 {
            return Err(AssetError::configuration("preferred_fps must be > 0"));
        }
        if !(self.capture_scale.is_finite() && self.capture_scale > 0.0) {
            return Err(AssetError::configuration(format!(
                "capture_scale must be > 0 (got {})",
                self.capture_scale
            )));
        }
        if self.writer_queue_depth == 0 {
            return Err(AssetError::configuration("writer_queue_depth must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.still_offset_fraction) {
            return Err(AssetError::configuration(format!(
                "still_offset_fraction must be in [0, 1] (got {})",
                self.still_offset_fraction
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AssetError::configuration("jpeg_quality must be in 1..=100"));
        }
        self.gif.validate()
    }

    pub fn cache(&self) -> CacheDir {
        self.cache_dir
            .as_ref()
            .map_or_else(CacheDir::process_scoped, CacheDir::at)
    }

    pub fn media_backend(&self) -> Arc<dyn MediaBackend> {
        create_backend(self.backend)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
