use crate::labels::{ClassNames, LabelsError};
use image::RgbImage;
use std::path::PathBuf;
use thiserror::Error;

/// A single detection as the classifier reports it, in pixel space of the
/// image it was given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0:?}")]
    NotFound(PathBuf),
    #[error("onnx runtime error: {0}")]
    Runtime(String),
    #[error("failed to load class names: {0}")]
    Labels(#[from] LabelsError),
    #[error("model loader failed: {0}")]
    Worker(String),
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("session mutex poisoned: {0}")]
    SessionPoisoned(String),
    #[error("failed to build tensor: {0}")]
    Tensor(String),
    #[error("inference failed: {0}")]
    Run(String),
    #[error("failed to extract tensor: {0}")]
    Extract(String),
    #[error("invalid tensor shape: {0}")]
    Shape(String),
}

/// Boundary to the pretrained detector.
///
/// `infer` blocks and only reads the loaded model, so one instance is shared
/// by every request.
pub trait ModelService: Send + Sync + 'static {
    fn infer(
        &self,
        image: &RgbImage,
        confidence_floor: f32,
    ) -> Result<Vec<RawDetection>, InferenceError>;

    fn class_names(&self) -> &ClassNames;
}
