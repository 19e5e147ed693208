//! Storage and processing of uploaded videos, independent of the HTTP layer.
//!
//! Uploads with the same sanitized name share a path and are not locked:
//! concurrent requests race and the last writer wins.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{StorageConfig, TranscodeConfig};
use crate::error::UploadError;
use crate::transcode::{transcode_with, TranscodeReport};
use crate::video::finalize::{FfmpegFinalizer, Finalizer};

const DEFAULT_BASE: &str = "upload";
const DEFAULT_EXTENSION: &str = ".mp4";
const OUTPUT_SUFFIX: &str = "_cartoon";
const OUTPUT_EXTENSION: &str = ".mp4";

/// A file received from a client, held in memory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name as supplied by the client; untrusted.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Where an upload is stored, decided before its bytes arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    pub path: PathBuf,
    /// Sanitized base name, reused for the output.
    pub base: String,
}

#[derive(Debug, Clone)]
pub struct ProcessedVideo {
    pub path: PathBuf,
    /// Public URL path of the result.
    pub url: String,
    pub report: TranscodeReport,
}

/// Split a client file name into a safe base name and an extension (with dot).
pub fn sanitize_file_name(name: &str) -> (String, String) {
    let name = name.rsplit(['/', '\\']).next().unwrap_or("");

    let (base, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx + 1..]),
        _ => (name, ""),
    };

    let base: String = base
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let base = base.trim_end();
    let base = if base.is_empty() { DEFAULT_BASE } else { base };

    let ext: String = ext.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let ext = if ext.is_empty() {
        DEFAULT_EXTENSION.to_string()
    } else {
        format!(".{ext}")
    };

    (base.to_string(), ext)
}

pub fn output_file_name(base: &str) -> String {
    format!("{base}{OUTPUT_SUFFIX}{OUTPUT_EXTENSION}")
}

fn public_url(prefix: &str, file_name: &str) -> String {
    format!("{}/{file_name}", prefix.trim_end_matches('/'))
}

fn create_dir(dir: &Path) -> Result<(), UploadError> {
    std::fs::create_dir_all(dir).map_err(|source| UploadError::Store {
        path: dir.to_path_buf(),
        source,
    })
}

/// Saves uploads and turns them into cartoonized outputs.
pub struct UploadService {
    storage: StorageConfig,
    transcode: TranscodeConfig,
    finalizer: Box<dyn Finalizer + Send + Sync>,
}

impl UploadService {
    pub fn new(storage: StorageConfig, transcode: TranscodeConfig) -> Self {
        Self::with_finalizer(storage, transcode, Box::new(FfmpegFinalizer))
    }

    pub fn with_finalizer(
        storage: StorageConfig,
        transcode: TranscodeConfig,
        finalizer: Box<dyn Finalizer + Send + Sync>,
    ) -> Self {
        Self {
            storage,
            transcode,
            finalizer,
        }
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Pick the storage path for a client file name and make sure its
    /// directory exists. Writing the bytes is up to the caller.
    pub fn stage_upload(&self, file_name: &str) -> Result<StagedUpload, UploadError> {
        let (base, ext) = sanitize_file_name(file_name);
        create_dir(&self.storage.upload_dir)?;

        let path = self.storage.upload_dir.join(format!("{base}{ext}"));
        Ok(StagedUpload { path, base })
    }

    /// Write the upload under its sanitized name, replacing any previous file.
    pub fn save_upload(&self, file: &UploadedFile) -> Result<StagedUpload, UploadError> {
        let staged = self.stage_upload(&file.file_name)?;
        std::fs::write(&staged.path, &file.bytes).map_err(|source| UploadError::Store {
            path: staged.path.clone(),
            source,
        })?;

        info!(path = ?staged.path, bytes = file.bytes.len(), "upload saved");
        Ok(staged)
    }

    /// Handle one upload end to end. `None` means the request carried no file.
    pub fn process_upload(&self, file: Option<UploadedFile>) -> Result<ProcessedVideo, UploadError> {
        let Some(file) = file else {
            warn!("request has no uploaded file");
            return Err(UploadError::MissingInput);
        };

        let staged = self.save_upload(&file)?;
        self.process_saved(&staged)
    }

    /// Cartoonize an upload whose bytes are already on disk.
    pub fn process_saved(&self, staged: &StagedUpload) -> Result<ProcessedVideo, UploadError> {
        create_dir(&self.storage.output_dir)?;
        let output_name = output_file_name(&staged.base);
        let output_path = self.storage.output_dir.join(&output_name);

        let report = transcode_with(
            &staged.path,
            &output_path,
            &self.transcode,
            self.finalizer.as_ref(),
        )?;

        let url = public_url(&self.storage.public_prefix, &output_name);
        info!(%url, frames = report.frame_count, "upload processed");

        Ok(ProcessedVideo {
            path: output_path,
            url,
            report,
        })
    }
}
