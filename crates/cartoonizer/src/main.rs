mod cli;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use cartoonizer_core::config::{StorageConfig, TranscodeConfig};
use cartoonizer_core::transcode;
use cartoonizer_core::upload::UploadService;

fn upload_limit_bytes(mib: usize) -> Result<usize> {
    mib.checked_mul(1024 * 1024)
        .with_context(|| format!("--max-upload-mib {mib} is too large"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Serve {
            addr,
            root,
            max_upload_mib,
        } => {
            let storage = StorageConfig {
                max_upload_bytes: upload_limit_bytes(max_upload_mib)?,
                ..StorageConfig::under_root(&root)
            };
            storage.ensure_dirs()?;

            info!(?addr, ?root, max_upload_mib, "starting server");

            let service = UploadService::new(storage, TranscodeConfig::default());
            let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            runtime.block_on(server::serve(addr, service))
        }
        cli::Command::Process {
            input,
            output,
            no_finalize,
            debug_frames,
        } => {
            info!(?input, ?output, no_finalize, "processing video");

            let config = TranscodeConfig {
                finalize: !no_finalize,
                debug_frames_dir: debug_frames,
                ..TranscodeConfig::default()
            };

            let report = transcode::transcode(&input, &output, &config)
                .with_context(|| format!("failed to cartoonize {}", input.display()))?;

            info!(
                output = ?report.output,
                frame_count = report.frame_count,
                fps = report.fps,
                finalized = report.finalized,
                "processing complete"
            );
            Ok(())
        }
    }
}
