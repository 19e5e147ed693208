use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{debug, error, info, warn};

use super::frame::Frame;
use super::{FfmpegTools, FrameSource, StderrTail};

/// Video metadata obtained by probing with ffprobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub width: u32,
    pub height: u32,
    /// 0.0 when the container reports no usable rate.
    pub fps: f64,
}

pub fn probe(path: &Path, ffprobe: &OsStr) -> Result<ProbeResult> {
    info!(?path, "probing video metadata with ffprobe");

    let output = Command::new(ffprobe)
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,r_frame_rate",
            "-of", "csv=p=0",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .context("failed to run ffprobe, is ffmpeg installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(%stderr, ?path, "ffprobe failed");
        bail!("ffprobe failed: {}", stderr.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let result = parse_probe_output(&stdout)?;

    if result.fps <= 0.0 {
        warn!(?path, "video reports no frame rate");
    }

    info!(width = result.width, height = result.height, fps = result.fps, "probe completed");
    Ok(result)
}

/// Parse ffprobe's `width,height,num/den` line.
fn parse_probe_output(stdout: &str) -> Result<ProbeResult> {
    let line = stdout.lines().next().unwrap_or("").trim();
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 3 {
        error!(%stdout, "unexpected ffprobe output format, expected width,height,fps");
        bail!("no video stream found (ffprobe output: {:?})", stdout.trim());
    }

    let width: u32 = parts[0].parse().context("failed to parse width")?;
    let height: u32 = parts[1].parse().context("failed to parse height")?;
    if width == 0 || height == 0 {
        bail!("invalid video dimensions: {width}x{height}");
    }

    let fps = if let Some((num, den)) = parts[2].split_once('/') {
        let num: f64 = num.parse().context("failed to parse fps numerator")?;
        let den: f64 = den.parse().context("failed to parse fps denominator")?;
        if den > 0.0 { num / den } else { 0.0 }
    } else {
        parts[2].parse().context("failed to parse fps")?
    };
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { 0.0 };

    Ok(ProbeResult { width, height, fps })
}

/// Decodes video frames by piping raw RGB24 data from the ffmpeg CLI.
pub struct VideoDecoder {
    child: Child,
    stderr: Option<StderrTail>,
    width: u32,
    height: u32,
    fps: f64,
    frame_count: u32,
    frame_bytes: usize,
}

impl VideoDecoder {
    /// Open a video file for decoding with `ffmpeg`/`ffprobe` from PATH.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &FfmpegTools::default())
    }

    pub fn open_with(path: &Path, tools: &FfmpegTools) -> Result<Self> {
        if !path.is_file() {
            bail!("video file does not exist: {}", path.display());
        }

        let info = probe(path, &tools.ffprobe)?;

        info!(?path, "spawning ffmpeg decoder process");

        let mut child = Command::new(&tools.ffmpeg)
            .args(["-i"])
            .arg(path)
            .args([
                "-map", "0:v:0",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-v", "error",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn ffmpeg, is ffmpeg installed?")?;
        let stderr = Some(StderrTail::spawn(child.stderr.take()));

        let frame_bytes = (info.width as usize) * (info.height as usize) * 3;

        info!(
            width = info.width,
            height = info.height,
            fps = info.fps,
            frame_bytes,
            "video decoder opened"
        );

        Ok(Self {
            child,
            stderr,
            width: info.width,
            height: info.height,
            fps: info.fps,
            frame_count: 0,
            frame_bytes,
        })
    }

    /// Number of frames decoded so far.
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Reap ffmpeg after its stdout closed. A non-zero exit means the
    /// stream was cut short, so it fails the decode.
    fn check_exit(&mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .context("failed to wait for ffmpeg decoder")?;
        let stderr = self.stderr.take().map(StderrTail::collect).unwrap_or_default();

        if !status.success() {
            error!(%status, %stderr, frame = self.frame_count, "ffmpeg decoder exited with an error");
            bail!("ffmpeg decoder exited with status {status}: {stderr}");
        }
        if !stderr.is_empty() {
            warn!(%stderr, "ffmpeg decoder reported errors");
        }
        Ok(())
    }
}

impl FrameSource for VideoDecoder {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    /// Read the next frame from the ffmpeg pipe, or `None` if the video is finished.
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .context("ffmpeg stdout not available")?;

        let mut buf = vec![0u8; self.frame_bytes];
        let mut read = 0;

        while read < self.frame_bytes {
            match stdout.read(&mut buf[read..]) {
                Ok(0) => {
                    if read == 0 {
                        info!(total_frames = self.frame_count, "video stream ended");
                        self.check_exit()?;
                        return Ok(None);
                    }
                    error!(
                        read_bytes = read,
                        expected_bytes = self.frame_bytes,
                        frame = self.frame_count,
                        "ffmpeg stream ended mid-frame"
                    );
                    self.check_exit()?;
                    bail!(
                        "ffmpeg stream ended mid-frame (read {read}/{} bytes)",
                        self.frame_bytes,
                    );
                }
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(frame = self.frame_count, %e, "failed to read from ffmpeg pipe");
                    return Err(e).context("failed to read from ffmpeg pipe");
                }
            }
        }

        let image = RgbImage::from_raw(self.width, self.height, buf)
            .context("failed to create RgbImage from raw frame data")?;

        let frame = Frame::new(image, self.frame_count, self.fps);
        self.frame_count += 1;

        debug!(
            frame_number = frame.frame_number,
            timestamp_seconds = frame.timestamp_seconds,
            "decoded frame"
        );

        Ok(Some(frame))
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        info!(total_frames = self.frame_count, "closing video decoder");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
