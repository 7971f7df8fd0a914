mod detect;
mod health;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};

use detect::detect_image;
use health::{healthcheck, root};

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(healthcheck::<M>))
        .route("/detect", post(detect_image::<M>))
}
