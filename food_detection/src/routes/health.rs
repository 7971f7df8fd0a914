use crate::{model_service::ModelService, server::SharedState};
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct ServiceInfo {
    pub status: String,
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
}

pub async fn root() -> impl IntoResponse {
    Json(ServiceInfo {
        status: "ok".into(),
        message: "Food Detection API".into(),
    })
}

pub async fn healthcheck<M: ModelService>(State(state): State<SharedState<M>>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy".into(),
        model_loaded: state.detection_service.is_ready(),
    })
}
