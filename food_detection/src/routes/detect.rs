use crate::{
    detection::ErrorResponse, detection_service::DetectionError, model_service::ModelService,
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::instrument;

const UPLOAD_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("invalid upload: {}", .0.body_text())]
    Rejected(#[from] MultipartRejection),
    #[error("invalid multipart upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("missing `{}` field in upload", UPLOAD_FIELD)]
    MissingFile,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = match &self {
            UploadError::Rejected(e) => e.status(),
            UploadError::Multipart(e) => e.status(),
            UploadError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// Pipeline failures are reported in the body, never as a transport error.
impl IntoResponse for DetectionError {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn detect_image<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, UploadError> {
    if !state.detection_service.is_ready() {
        return Ok(DetectionError::ModelNotLoaded.into_response());
    }

    let mut multipart = multipart?;
    let image_data = read_upload(&mut multipart).await?;

    let response = match state.detection_service.detect(image_data).await {
        Ok(detections) => Json(detections).into_response(),
        Err(e) => {
            tracing::warn!("Detection failed: {}", e);
            e.into_response()
        }
    };

    Ok(response)
}

async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, UploadError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) || field.file_name().is_some() {
            return Ok(field.bytes().await?);
        }
    }

    Err(UploadError::MissingFile)
}
