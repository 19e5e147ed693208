use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single transcode call.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The input could not be opened or probed as a video.
    #[error("could not open input video {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    /// Anything that went wrong while decoding, filtering, or encoding frames.
    #[error("{0:#}")]
    Processing(#[from] anyhow::Error),
}

/// Failure of an upload request, as seen by the request boundary.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file uploaded")]
    MissingInput,

    #[error("failed to store upload at {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transcode(#[from] TranscodeError),
}
