//! Thin HTTP wrapper around [`EnhancePipeline`].

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    config::Config,
    errors::{EnhanceError, PipelineError, Result, ValidationError},
    pipeline::{EnhancePipeline, UploadedImage},
    traits::ImageToImageModel,
};

/// Multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

pub struct AppState<M: ?Sized> {
    pipeline: Arc<EnhancePipeline<M>>,
}

impl<M: ?Sized> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

#[derive(Debug, Serialize)]
struct ImageBody {
    image: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = if matches!(self, PipelineError::Validation(ValidationError::TooLarge)) {
            StatusCode::PAYLOAD_TOO_LARGE
        } else if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router<M>(pipeline: Arc<EnhancePipeline<M>>, max_upload_bytes: usize) -> Router
where
    M: ImageToImageModel + ?Sized + 'static,
{
    let uploads = ServeDir::new(pipeline.store().upload_dir());
    let generated = ServeDir::new(pipeline.store().generated_dir());

    Router::new()
        .route("/upload", post(upload_handler::<M>))
        .route("/health", get(health_handler))
        .nest_service("/uploads", uploads)
        .nest_service("/generated", generated)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pipeline })
}

pub async fn serve<M>(pipeline: Arc<EnhancePipeline<M>>, config: &Config) -> Result<()>
where
    M: ImageToImageModel + ?Sized + 'static,
{
    let addr = config.bind_addr()?;
    let app = router(pipeline, config.max_upload_bytes);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| EnhanceError::Server {
            operation: format!("bind {}", addr),
            source: e,
        })?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("  POST /upload            - multipart field `{}`", FILE_FIELD);
    tracing::info!("  GET  /uploads/<name>    - original upload");
    tracing::info!("  GET  /generated/<name>  - generated image");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| EnhanceError::Server {
            operation: "serve".to_string(),
            source: e,
        })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn upload_handler<M>(
    State(state): State<AppState<M>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response
where
    M: ImageToImageModel + ?Sized + 'static,
{
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => return PipelineError::from(e).into_response(),
    };

    let pipeline = Arc::clone(&state.pipeline);
    match tokio::task::spawn_blocking(move || pipeline.process(upload)).await {
        Ok(Ok(image)) => Json(ImageBody { image }).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            tracing::error!("Pipeline worker failed: {}", e);
            let body = ErrorBody {
                error: format!("Internal error: {}", e),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// Pulls the first file part named [`FILE_FIELD`]. A part without a `filename` attribute
/// is a plain form value, not a file. A request that is not multipart has no file part.
async fn read_upload(
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Option<UploadedImage>, ValidationError> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            tracing::debug!("Request is not multipart: {}", e);
            return Ok(None);
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        let bytes = field.bytes().await.map_err(malformed)?;
        tracing::debug!("Received {:?}: {} bytes", filename, bytes.len());
        return Ok(Some(UploadedImage::new(filename, bytes.to_vec())));
    }

    Ok(None)
}

fn malformed(err: axum::extract::multipart::MultipartError) -> ValidationError {
    // A body without Content-Length only hits the limit while streaming.
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ValidationError::TooLarge;
    }
    ValidationError::Malformed {
        reason: err.body_text(),
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
