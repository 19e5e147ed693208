use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::video::FfmpegTools;

/// Frame rate used when the input does not report one.
pub const FALLBACK_FPS: f64 = 24.0;

/// Largest accepted upload body.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 600 * 1024 * 1024;

/// Where uploads land, where results go, and how results are addressed publicly.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// URL path under which `output_dir` is served.
    pub public_prefix: String,
}

impl StorageConfig {
    /// Lay out `static/uploads` and `static/outputs` under an application root.
    pub fn under_root(root: &Path) -> Self {
        let static_dir = root.join("static");
        Self {
            upload_dir: static_dir.join("uploads"),
            output_dir: static_dir.join("outputs"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            public_prefix: "/static/outputs".to_string(),
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.output_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        info!(upload_dir = ?self.upload_dir, output_dir = ?self.output_dir, "storage directories ready");
        Ok(())
    }
}

/// Parameters for one transcode call.
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Substituted when the input's frame rate is missing or zero.
    pub fallback_fps: f64,
    /// Run the best-effort re-encode pass after the raw output is written.
    pub finalize: bool,
    /// Directory to write side-by-side debug frames, or None to skip.
    pub debug_frames_dir: Option<PathBuf>,
    pub tools: FfmpegTools,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            fallback_fps: FALLBACK_FPS,
            finalize: true,
            debug_frames_dir: None,
            tools: FfmpegTools::default(),
        }
    }
}
