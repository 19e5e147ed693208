use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{debug, error, info, warn};

use super::{FfmpegTools, FrameSink, StderrTail};

/// Codec and tag of the raw output: MPEG-4 Part 2 tagged `mp4v` in an MP4 container.
const VIDEO_CODEC: &str = "mpeg4";
const VIDEO_TAG: &str = "mp4v";
const CONTAINER: &str = "mp4";

#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub out_path: PathBuf,
}

impl EncodeSettings {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("encode width/height must be non-zero, got {}x{}", self.width, self.height);
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            bail!("encode fps must be positive, got {}", self.fps);
        }
        Ok(())
    }

    fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// ffmpeg arguments that read raw RGB24 frames from stdin and write `out_path`.
pub fn encoder_args(settings: &EncodeSettings) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-loglevel", "error",
        "-f", "rawvideo",
        "-pix_fmt", "rgb24",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.extend([
        "-s".to_string(),
        format!("{}x{}", settings.width, settings.height),
        "-r".to_string(),
        settings.fps.to_string(),
    ]);

    args.extend(
        [
            "-i", "pipe:0",
            "-an",
            "-c:v", VIDEO_CODEC,
            "-tag:v", VIDEO_TAG,
            "-q:v", "3",
            "-pix_fmt", "yuv420p",
            "-f", CONTAINER,
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(settings.out_path.to_string_lossy().into_owned());
    args
}

/// Encodes RGB frames by piping them into the ffmpeg CLI.
pub struct VideoEncoder {
    settings: EncodeSettings,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<StderrTail>,
    frame_count: u32,
}

impl VideoEncoder {
    /// Spawn `ffmpeg` from PATH.
    pub fn create(settings: EncodeSettings) -> Result<Self> {
        Self::create_with(settings, &FfmpegTools::default())
    }

    pub fn create_with(settings: EncodeSettings, tools: &FfmpegTools) -> Result<Self> {
        settings.validate()?;

        if let Some(parent) = settings.out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create output directory {}", parent.display()))?;
        }

        info!(
            out_path = ?settings.out_path,
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            "spawning ffmpeg encoder process"
        );

        let mut child = Command::new(&tools.ffmpeg)
            .args(encoder_args(&settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn ffmpeg, is ffmpeg installed?")?;

        let stdin = child.stdin.take().context("ffmpeg stdin not available")?;
        let stderr = StderrTail::spawn(child.stderr.take());

        Ok(Self {
            settings,
            child,
            stdin: Some(stdin),
            stderr: Some(stderr),
            frame_count: 0,
        })
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Close the input pipe and wait for ffmpeg to flush the file.
    pub fn finish(mut self) -> Result<u32> {
        drop(self.stdin.take());

        let status = self
            .child
            .wait()
            .context("failed to wait for ffmpeg encoder to finish")?;
        let stderr = self.stderr.take().map(StderrTail::collect).unwrap_or_default();

        if !status.success() {
            error!(%status, %stderr, "ffmpeg encoder failed");
            bail!("ffmpeg encoder exited with status {status}: {stderr}");
        }

        info!(
            out_path = ?self.settings.out_path,
            total_frames = self.frame_count,
            "video encoder finished"
        );
        Ok(self.frame_count)
    }
}

impl FrameSink for VideoEncoder {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        if image.dimensions() != (self.settings.width, self.settings.height) {
            bail!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                image.width(),
                image.height(),
                self.settings.width,
                self.settings.height
            );
        }
        debug_assert_eq!(image.as_raw().len(), self.settings.frame_bytes());

        let stdin = self
            .stdin
            .as_mut()
            .context("ffmpeg encoder is already finished")?;
        stdin
            .write_all(image.as_raw())
            .with_context(|| format!("failed to write frame {} to ffmpeg", self.frame_count))?;

        self.frame_count += 1;
        debug!(frame = self.frame_count, "encoded frame");
        Ok(())
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        // Still holding stdin means finish() never ran.
        if self.stdin.take().is_some() {
            warn!(out_path = ?self.settings.out_path, "encoder dropped before finish, killing ffmpeg");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
