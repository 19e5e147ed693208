use std::path::{Path, PathBuf};

use anyhow::Result;
use image::RgbImage;
use tracing::{error, info};

use crate::config::TranscodeConfig;
use crate::debug::DebugRenderer;
use crate::error::TranscodeError;
use crate::filter::Cartoonizer;
use crate::video::decoder::VideoDecoder;
use crate::video::encoder::{EncodeSettings, VideoEncoder};
use crate::video::finalize::{finalize_best_effort, FfmpegFinalizer, Finalizer};
use crate::video::frame::Frame;
use crate::video::{FrameSink, FrameSource};

/// Outcome of a successful transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeReport {
    pub output: PathBuf,
    pub frame_count: u32,
    /// Frame rate the output was written at.
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Whether the best-effort re-encode replaced the raw output.
    pub finalized: bool,
}

/// A decoded frame together with its stylized image.
pub struct StylizedFrame {
    pub source: Frame,
    pub image: RgbImage,
}

/// Lazily stylizes frames pulled from a [`FrameSource`], one at a time and in
/// order. Stops for good after the source ends or reports an error.
pub struct CartoonFrames<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
    cartoonizer: &'a Cartoonizer,
    done: bool,
}

impl<'a, S: FrameSource + ?Sized> CartoonFrames<'a, S> {
    pub fn new(source: &'a mut S, cartoonizer: &'a Cartoonizer) -> Self {
        Self {
            source,
            cartoonizer,
            done: false,
        }
    }
}

impl<S: FrameSource + ?Sized> Iterator for CartoonFrames<'_, S> {
    type Item = Result<StylizedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.source.next_frame() {
            Ok(Some(frame)) => {
                let image = self.cartoonizer.apply(&frame.image);
                Some(Ok(StylizedFrame {
                    source: frame,
                    image,
                }))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<S: FrameSource + ?Sized> std::iter::FusedIterator for CartoonFrames<'_, S> {}

/// Frame rate to write: the source's own, or `fallback` if it reports none.
pub fn effective_fps(reported: f64, fallback: f64) -> f64 {
    if reported.is_finite() && reported > 0.0 {
        reported
    } else {
        fallback
    }
}

/// Stylize every frame of `source` into `sink`, returning the frame count.
pub fn run_frames(
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    cartoonizer: &Cartoonizer,
    debug_renderer: Option<&DebugRenderer>,
) -> Result<u32> {
    let mut count = 0u32;
    for stylized in CartoonFrames::new(source, cartoonizer) {
        let stylized = stylized?;

        if let Some(renderer) = debug_renderer {
            renderer.save_frame(&stylized.source, &stylized.image)?;
        }

        sink.write_frame(&stylized.image)?;
        count += 1;
    }
    Ok(count)
}

/// Cartoonize `input` into `output`, then attempt the ffmpeg finalization pass.
pub fn transcode(
    input: &Path,
    output: &Path,
    config: &TranscodeConfig,
) -> Result<TranscodeReport, TranscodeError> {
    transcode_with(input, output, config, &FfmpegFinalizer)
}

pub fn transcode_with(
    input: &Path,
    output: &Path,
    config: &TranscodeConfig,
    finalizer: &dyn Finalizer,
) -> Result<TranscodeReport, TranscodeError> {
    info!(?input, ?output, finalize = config.finalize, "transcode starting");

    let mut decoder = VideoDecoder::open_with(input, &config.tools).map_err(|e| {
        error!(?input, error = %format!("{e:#}"), "could not open input video");
        TranscodeError::Open {
            path: input.to_path_buf(),
            reason: format!("{e:#}"),
        }
    })?;

    let fps = effective_fps(decoder.fps(), config.fallback_fps);
    let (width, height) = (decoder.width(), decoder.height());
    if fps != decoder.fps() {
        info!(fallback_fps = fps, "input reports no frame rate, using fallback");
    }

    let debug_renderer = config
        .debug_frames_dir
        .as_deref()
        .map(DebugRenderer::new)
        .transpose()?;

    let mut encoder = VideoEncoder::create_with(
        EncodeSettings {
            width,
            height,
            fps,
            out_path: output.to_path_buf(),
        },
        &config.tools,
    )?;

    let cartoonizer = Cartoonizer::new();
    let frame_count = run_frames(&mut decoder, &mut encoder, &cartoonizer, debug_renderer.as_ref())?;

    drop(decoder);
    encoder.finish()?;
    info!(frame_count, fps, width, height, "raw output written");

    let finalized = config.finalize && finalize_best_effort(finalizer, output, input);

    info!(?output, frame_count, finalized, "transcode complete");
    Ok(TranscodeReport {
        output: output.to_path_buf(),
        frame_count,
        fps,
        width,
        height,
        finalized,
    })
}
