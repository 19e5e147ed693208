use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

/// Re-encodes a finished raw output into a more widely playable file.
pub trait Finalizer {
    /// Write a re-encoded copy of `raw` to `dest`. `source` is the original
    /// input and may contribute streams (e.g. audio) that `raw` lacks.
    fn finalize(&self, raw: &Path, source: &Path, dest: &Path) -> Result<()>;
}

/// H.264 + AAC re-encode through the ffmpeg CLI, carrying over the first
/// audio track of the original input when it has one. The output keeps every
/// video frame even when that audio track is shorter.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegFinalizer;

impl FfmpegFinalizer {
    pub fn args(raw: &Path, source: &Path, dest: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        args.extend([
            OsString::from("-i"),
            OsString::from(raw),
            OsString::from("-i"),
            OsString::from(source),
        ]);
        args.extend(
            [
                "-map", "0:v:0",
                "-map", "1:a:0?",
                "-c:v", "libx264",
                "-pix_fmt", "yuv420p",
                "-c:a", "aac",
                "-movflags", "+faststart",
                "-f", "mp4",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(OsString::from(dest));
        args
    }
}

impl Finalizer for FfmpegFinalizer {
    fn finalize(&self, raw: &Path, source: &Path, dest: &Path) -> Result<()> {
        let output = Command::new("ffmpeg")
            .args(Self::args(raw, source, dest))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .context("failed to run ffmpeg for finalization")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("ffmpeg re-encode exited with status {}: {}", output.status, stderr.trim());
        }
        Ok(())
    }
}

/// Sibling path the finalized file is written to before replacing `raw`.
pub fn finalized_path(raw: &Path) -> PathBuf {
    let stem = raw
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = raw
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    raw.with_file_name(format!("{stem}_final.{ext}"))
}

/// Run `finalizer` and swap its result over `raw`.
///
/// Returns whether `raw` was replaced. Any failure leaves `raw` exactly as it
/// was, removes the temporary file, and is only logged.
pub fn finalize_best_effort(finalizer: &dyn Finalizer, raw: &Path, source: &Path) -> bool {
    let tmp = finalized_path(raw);
    info!(?raw, ?tmp, "finalizing output");

    let result = finalizer
        .finalize(raw, source, &tmp)
        .and_then(|()| {
            std::fs::rename(&tmp, raw)
                .with_context(|| format!("failed to replace {} with {}", raw.display(), tmp.display()))
        });

    match result {
        Ok(()) => {
            info!(?raw, "output finalized");
            true
        }
        Err(e) => {
            warn!(?raw, error = %format!("{e:#}"), "finalization failed, keeping raw output");
            if tmp.exists() {
                if let Err(e) = std::fs::remove_file(&tmp) {
                    warn!(?tmp, %e, "failed to remove partial finalized file");
                }
            }
            false
        }
    }
}
