use crate::{
    catalog::ClassCatalog,
    config::ImageConfig,
    detection::{DetectionResponse, EnrichedDetection},
    lifecycle::ModelLifecycle,
    model_service::{InferenceError, ModelService},
    preprocess::{decode_image, normalize, ImageError},
};
use axum::body::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Detections below this probability are never reported.
pub const CONFIDENCE_FLOOR: f32 = 0.70;

pub const MODEL_NOT_LOADED: &str = "Model yüklenemedi";

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("{}", MODEL_NOT_LOADED)]
    ModelNotLoaded,
    #[error(transparent)]
    Decode(#[from] ImageError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("detection worker failed: {0}")]
    Worker(String),
}

/// Runs one upload through decode, normalization, inference and enrichment.
pub struct DetectionService<M: ModelService> {
    lifecycle: Arc<ModelLifecycle<M>>,
    catalog: Arc<ClassCatalog>,
    image_config: ImageConfig,
}

impl<M: ModelService> Clone for DetectionService<M> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            catalog: self.catalog.clone(),
            image_config: self.image_config.clone(),
        }
    }
}

impl<M: ModelService> DetectionService<M> {
    pub fn new(
        lifecycle: Arc<ModelLifecycle<M>>,
        catalog: Arc<ClassCatalog>,
        image_config: ImageConfig,
    ) -> Self {
        Self {
            lifecycle,
            catalog,
            image_config,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.is_ready()
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub async fn detect(&self, image_data: Bytes) -> Result<DetectionResponse, DetectionError> {
        if !self.is_ready() {
            return Err(DetectionError::ModelNotLoaded);
        }

        let service = self.clone();
        tokio::task::spawn_blocking(move || service.detect_blocking(&image_data))
            .await
            .map_err(|e| DetectionError::Worker(e.to_string()))?
    }

    pub fn detect_blocking(&self, image_data: &[u8]) -> Result<DetectionResponse, DetectionError> {
        let model = self
            .lifecycle
            .model()
            .ok_or(DetectionError::ModelNotLoaded)?;

        let decoded = decode_image(image_data, self.image_config.max_decode_bytes)?;
        let image = normalize(decoded, self.image_config.max_edge);
        let raw_detections = model.infer(&image, CONFIDENCE_FLOOR)?;

        let class_names = model.class_names();
        let detections: Vec<EnrichedDetection> = raw_detections
            .iter()
            .filter(|raw| raw.confidence >= CONFIDENCE_FLOOR)
            .map(|raw| EnrichedDetection::enrich(raw, class_names, &self.catalog))
            .collect();

        tracing::debug!("Returning {} detections", detections.len());
        for (i, detection) in detections.iter().enumerate() {
            tracing::debug!(
                "Detection {}: class_id={}, label={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                i,
                detection.class_id,
                detection.label,
                detection.confidence,
                detection.bbox.x1,
                detection.bbox.y1,
                detection.bbox.x2,
                detection.bbox.y2
            );
        }

        Ok(DetectionResponse::new(
            image.width(),
            image.height(),
            detections,
        ))
    }
}
