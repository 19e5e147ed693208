use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cartoonizer", about = "Cartoon-style video filter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve the upload endpoint over HTTP.
    Serve {
        /// Address to listen on.
        #[arg(short, long, default_value = "0.0.0.0:5000")]
        addr: SocketAddr,

        /// Application root; uploads and outputs live under `<root>/static`.
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Maximum accepted upload size in MiB.
        #[arg(long, default_value_t = 600)]
        max_upload_mib: usize,
    },

    /// Cartoonize a single video file.
    Process {
        /// Path to the input video file (MP4, etc.).
        #[arg(short, long)]
        input: PathBuf,

        /// Path to write the cartoonized MP4.
        #[arg(short, long)]
        output: PathBuf,

        /// Skip the H.264/AAC re-encode and keep the raw MPEG-4 output.
        #[arg(long)]
        no_finalize: bool,

        /// Directory to save side-by-side debug frames.
        #[arg(long)]
        debug_frames: Option<PathBuf>,
    },
}
