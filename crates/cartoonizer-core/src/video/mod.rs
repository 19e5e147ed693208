pub mod decoder;
pub mod encoder;
pub mod finalize;
pub mod frame;

use std::ffi::OsString;
use std::io::Read;
use std::process::{ChildStderr, Command, Stdio};
use std::thread::JoinHandle;

use anyhow::Result;
use image::RgbImage;
use tracing::warn;

use self::frame::Frame;

/// An ordered, finite sequence of decoded frames.
pub trait FrameSource {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Frame rate reported by the source; 0.0 when unknown.
    fn fps(&self) -> f64;

    /// Next frame in order, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Receives frames in the order they should appear in the output.
pub trait FrameSink {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()>;
}

/// Executables used to probe, decode and encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
    pub ffmpeg: OsString,
    pub ffprobe: OsString,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: OsString::from("ffmpeg"),
            ffprobe: OsString::from("ffprobe"),
        }
    }
}

/// Bytes of child stderr kept for error messages.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

/// Drains a child's stderr on a background thread so the child never blocks
/// on a full pipe. Only the last `STDERR_TAIL_BYTES` are kept.
pub(crate) struct StderrTail {
    handle: Option<JoinHandle<Vec<u8>>>,
}

impl StderrTail {
    pub(crate) fn spawn(stderr: Option<ChildStderr>) -> Self {
        let handle = stderr.and_then(|mut pipe| {
            std::thread::Builder::new()
                .name("ffmpeg-stderr".to_string())
                .spawn(move || {
                    let mut tail = Vec::new();
                    let mut chunk = [0u8; 8192];
                    loop {
                        match pipe.read(&mut chunk) {
                            Ok(0) => break,
                            Ok(n) => {
                                tail.extend_from_slice(&chunk[..n]);
                                if tail.len() > STDERR_TAIL_BYTES {
                                    let excess = tail.len() - STDERR_TAIL_BYTES;
                                    tail.drain(..excess);
                                }
                            }
                            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                            Err(_) => break,
                        }
                    }
                    tail
                })
                .map_err(|e| warn!(%e, "failed to spawn stderr reader, ffmpeg stderr is discarded"))
                .ok()
        });
        Self { handle }
    }

    /// Wait for the pipe to close and return what was kept.
    /// Call only after the child has exited, or this blocks until it does.
    pub(crate) fn collect(mut self) -> String {
        let bytes = self
            .handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}

fn tool_on_path(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Whether both `ffmpeg` and `ffprobe` can be executed.
pub fn is_ffmpeg_on_path() -> bool {
    tool_on_path("ffmpeg") && tool_on_path("ffprobe")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tools_are_looked_up_on_path() {
        let tools = FfmpegTools::default();
        assert_eq!(tools.ffmpeg, "ffmpeg");
        assert_eq!(tools.ffprobe, "ffprobe");
    }

    #[cfg(unix)]
    #[test]
    fn stderr_tail_keeps_only_the_end() {
        let mut child = Command::new("sh")
            .args(["-c", "yes 0123456789 | head -n 20000 >&2; echo last line >&2"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let tail = StderrTail::spawn(child.stderr.take());
        assert!(child.wait().unwrap().success());

        let text = tail.collect();
        assert!(text.len() <= STDERR_TAIL_BYTES);
        assert!(text.ends_with("last line"));
    }
}
