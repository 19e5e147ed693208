use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use cartoonizer_core::error::{TranscodeError, UploadError};
use cartoonizer_core::upload::{StagedUpload, UploadService};

/// Multipart field carrying the video.
const VIDEO_FIELD: &str = "video";

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    url: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn error_response(status: StatusCode, error: impl Into<String>, details: Option<String>) -> Response {
    let body = ErrorResponse {
        error: error.into(),
        details,
    };
    (status, Json(body)).into_response()
}

pub fn router(service: Arc<UploadService>) -> Router {
    let storage = service.storage().clone();
    Router::new()
        .route("/upload", post(upload))
        .nest_service(&storage.public_prefix, ServeDir::new(&storage.output_dir))
        .layer(DefaultBodyLimit::max(storage.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

pub async fn serve(addr: SocketAddr, service: UploadService) -> Result<()> {
    let app = router(Arc::new(service));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(?addr, "listening");
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}

fn multipart_error_response(e: MultipartError) -> Response {
    warn!(status = %e.status(), error = %e.body_text(), "failed to read multipart body");
    error_response(e.status(), e.body_text(), None)
}

fn upload_error_response(e: UploadError) -> Response {
    match e {
        UploadError::MissingInput => error_response(StatusCode::BAD_REQUEST, "No file uploaded", None),
        e => {
            error!(error = %e, "processing failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Processing failed",
                Some(e.to_string()),
            )
        }
    }
}

/// Copy a field to `path` chunk by chunk, so the body is never held whole in memory.
async fn write_field(field: &mut Field<'_>, path: &Path) -> Result<u64, Response> {
    let store_error = |source: std::io::Error| {
        upload_error_response(UploadError::Store {
            path: path.to_path_buf(),
            source,
        })
    };

    let mut file = tokio::fs::File::create(path).await.map_err(store_error)?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error_response)? {
        file.write_all(&chunk).await.map_err(store_error)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(store_error)?;
    Ok(written)
}

/// Store the first `video` field of the form. `None` if it is absent or has no file name.
async fn receive_video(
    service: &UploadService,
    multipart: &mut Multipart,
) -> Result<Option<StagedUpload>, Response> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error_response)? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Ok(None);
        }

        let staged = service.stage_upload(&file_name).map_err(upload_error_response)?;
        match write_field(&mut field, &staged.path).await {
            Ok(bytes) => {
                info!(path = ?staged.path, bytes, "upload saved");
                return Ok(Some(staged));
            }
            Err(response) => {
                // A cut-off body must not leave a truncated upload behind.
                let _ = tokio::fs::remove_file(&staged.path).await;
                return Err(response);
            }
        }
    }
    Ok(None)
}

async fn upload(
    State(service): State<Arc<UploadService>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            warn!(status = %rejection.status(), "rejected upload request");
            return error_response(rejection.status(), rejection.body_text(), None);
        }
    };

    let staged = match receive_video(&service, &mut multipart).await {
        Ok(Some(staged)) => staged,
        Ok(None) => {
            warn!("request has no uploaded file");
            return upload_error_response(UploadError::MissingInput);
        }
        Err(response) => return response,
    };

    // Transcoding blocks for the whole video; keep it off the async workers.
    let result = tokio::task::spawn_blocking(move || service.process_saved(&staged))
        .await
        .unwrap_or_else(|e| {
            Err(UploadError::from(TranscodeError::Processing(anyhow::anyhow!(
                "processing task failed: {e}"
            ))))
        });

    match result {
        Ok(processed) => {
            let body = UploadResponse {
                success: true,
                url: processed.url,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => upload_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::body::Body;
    use axum::http::{header, Request};
    use cartoonizer_core::config::{StorageConfig, TranscodeConfig};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    const BOUNDARY: &str = "cartoonizer-test-boundary";

    fn app(root: &Path) -> (Router, StorageConfig) {
        let storage = StorageConfig::under_root(root);
        let service = UploadService::new(storage.clone(), TranscodeConfig::default());
        (router(Arc::new(service)), storage)
    }

    /// (field name, optional file name, content)
    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file_name, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match file_name {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn is_empty_or_missing(dir: &Path) -> bool {
        std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn missing_video_field_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, storage) = app(tmp.path());

        let body = multipart_body(&[("comment", None, &b"hello"[..])]);
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "No file uploaded");
        assert!(is_empty_or_missing(&storage.upload_dir));
        assert!(is_empty_or_missing(&storage.output_dir));
    }

    #[tokio::test]
    async fn empty_file_name_counts_as_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, storage) = app(tmp.path());

        let body = multipart_body(&[("video", Some(""), &b""[..])]);
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(is_empty_or_missing(&storage.upload_dir));
    }

    #[tokio::test]
    async fn non_video_upload_reports_processing_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, storage) = app(tmp.path());

        let body = multipart_body(&[("video", Some("notes.mp4"), &b"plain text, not a video"[..])]);
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["error"], "Processing failed");
        let details = json["details"].as_str().unwrap();
        assert!(details.contains("could not open input video"), "{details}");
        assert!(!storage.output_dir.join("notes_cartoon.mp4").exists());
    }

    #[tokio::test]
    async fn non_multipart_request_is_rejected_as_json() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, _) = app(tmp.path());

        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert!(response.status().is_client_error());
        let json = json_body(response).await;
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            max_upload_bytes: 64,
            ..StorageConfig::under_root(tmp.path())
        };
        let service = UploadService::new(storage.clone(), TranscodeConfig::default());
        let app = router(Arc::new(service));

        let body = multipart_body(&[("video", Some("big.mp4"), &[7u8; 4096][..])]);
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(is_empty_or_missing(&storage.upload_dir));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streamed_upload_is_stored_and_processed() {
        use std::os::unix::fs::PermissionsExt;

        use cartoonizer_core::video::FfmpegTools;

        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("bin");
        std::fs::create_dir(&bin).unwrap();
        let script = |name: &str, body: &str| {
            let path = bin.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.into_os_string()
        };
        // Decodes to two 4x4 frames; encoding copies stdin to the last argument.
        let tools = FfmpegTools {
            ffprobe: script("ffprobe", "echo 4,4,10/1"),
            ffmpeg: script(
                "ffmpeg",
                "for last; do :; done\ncase \"$*\" in *pipe:0*) cat > \"$last\"; exit 0 ;; esac\nhead -c 96 /dev/zero",
            ),
        };
        let storage = StorageConfig::under_root(&tmp.path().join("app"));
        let service = UploadService::new(
            storage.clone(),
            TranscodeConfig {
                finalize: false,
                tools,
                ..TranscodeConfig::default()
            },
        );
        let app = router(Arc::new(service));

        let content = vec![42u8; 256 * 1024];
        let body = multipart_body(&[
            ("comment", None, &b"first"[..]),
            ("video", Some("Road Trip.mp4"), &content[..]),
        ]);
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["url"], "/static/outputs/Road Trip_cartoon.mp4");
        assert_eq!(std::fs::read(storage.upload_dir.join("Road Trip.mp4")).unwrap(), content);
        assert_eq!(
            std::fs::read(storage.output_dir.join("Road Trip_cartoon.mp4")).unwrap().len(),
            96
        );
    }

    #[tokio::test]
    async fn outputs_are_served_statically() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, storage) = app(tmp.path());
        storage.ensure_dirs().unwrap();
        std::fs::write(storage.output_dir.join("clip_cartoon.mp4"), b"mp4 bytes").unwrap();

        let request = Request::builder()
            .uri("/static/outputs/clip_cartoon.mp4")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"mp4 bytes");
    }
}
