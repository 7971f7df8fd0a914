use crate::{
    config::ModelConfig,
    labels::{load_labels_file, ClassNames},
    model_service::{InferenceError, ModelLoadError, ModelService, RawDetection},
};
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array4, ArrayD, ArrayViewD, Axis, Ix3};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

const NAMES_METADATA_KEY: &str = "names";

fn intersection(box1: &RawDetection, box2: &RawDetection) -> f32 {
    let width = (box1.x2.min(box2.x2) - box1.x1.max(box2.x1)).max(0.);
    let height = (box1.y2.min(box2.y2) - box1.y1.max(box2.y1)).max(0.);
    width * height
}

fn union(box1: &RawDetection, box2: &RawDetection) -> f32 {
    ((box1.x2 - box1.x1) * (box1.y2 - box1.y1)) + ((box2.x2 - box2.x1) * (box2.y2 - box2.y1))
        - intersection(box1, box2)
}

/// Class-aware suppression, highest confidence first.
fn non_max_suppression(mut boxes: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));
    let mut result = Vec::new();

    while !boxes.is_empty() {
        let best = boxes.remove(0);
        boxes.retain(|candidate| {
            candidate.class_id != best.class_id
                || intersection(&best, candidate) / union(&best, candidate) < iou_threshold
        });
        result.push(best);
    }

    result
}

const PAD_VALUE: f32 = 114. / 255.;

/// Placement of a source image inside the square model input: scaled to fit
/// with its aspect ratio kept, centered, the remainder padded gray.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    input_size: u32,
    ratio: f32,
    resized: (u32, u32),
    pad: (u32, u32),
    source: (u32, u32),
}

impl Letterbox {
    fn fit(width: u32, height: u32, input_size: u32) -> Self {
        let ratio = (input_size as f32 / width as f32).min(input_size as f32 / height as f32);
        let side = |v: u32| ((v as f32 * ratio).round() as u32).clamp(1, input_size);
        let resized = (side(width), side(height));

        Self {
            input_size,
            ratio,
            resized,
            pad: ((input_size - resized.0) / 2, (input_size - resized.1) / 2),
            source: (width, height),
        }
    }

    /// Maps a point in model input space back onto the source image.
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let x = (x - self.pad.0 as f32) / self.ratio;
        let y = (y - self.pad.1 as f32) / self.ratio;
        (
            x.clamp(0., self.source.0 as f32),
            y.clamp(0., self.source.1 as f32),
        )
    }
}

fn image_to_tensor(image: &RgbImage, letterbox: &Letterbox) -> Array4<f32> {
    let (width, height) = letterbox.resized;
    let resized = image::imageops::resize(image, width, height, FilterType::Triangle);
    let size = letterbox.input_size as usize;
    let (pad_x, pad_y) = (letterbox.pad.0 as usize, letterbox.pad.1 as usize);

    let mut input = Array4::from_elem((1, 3, size, size), PAD_VALUE);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize + pad_x, y as usize + pad_y);
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    input
}

/// Decodes a `[1, 4 + classes, anchors]` head. Boxes come out as
/// center/size in model input space and are mapped back through `letterbox`.
fn decode_output(
    output: ArrayViewD<'_, f32>,
    letterbox: &Letterbox,
    confidence_floor: f32,
) -> Result<Vec<RawDetection>, InferenceError> {
    let output = output
        .into_dimensionality::<Ix3>()
        .map_err(|e| InferenceError::Shape(e.to_string()))?;
    if output.shape()[0] != 1 || output.shape()[1] <= 4 {
        return Err(InferenceError::Shape(format!(
            "unexpected output shape {:?}",
            output.shape()
        )));
    }

    let predictions = output.index_axis(Axis(0), 0);
    let mut boxes = Vec::new();

    for row in predictions.axis_iter(Axis(1)) {
        let Some((class_id, prob)) = row
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
        else {
            continue;
        };

        if prob < confidence_floor {
            continue;
        }

        let (xc, yc, w, h) = (row[0], row[1], row[2], row[3]);
        let (x1, y1) = letterbox.to_source(xc - w / 2., yc - h / 2.);
        let (x2, y2) = letterbox.to_source(xc + w / 2., yc + h / 2.);

        boxes.push(RawDetection {
            class_id: class_id as u32,
            confidence: prob,
            x1,
            y1,
            x2,
            y2,
        });
    }

    Ok(boxes)
}

fn runtime_error(e: impl std::fmt::Display) -> ModelLoadError {
    ModelLoadError::Runtime(e.to_string())
}

fn build_session(path: &Path) -> Result<Session, ModelLoadError> {
    let builder = Session::builder()
        .map_err(runtime_error)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(runtime_error)?;

    #[cfg(feature = "tensorrt")]
    let builder = builder
        .with_execution_providers([
            ort::execution_providers::TensorRTExecutionProvider::default()
                .with_engine_cache(true)
                .build(),
        ])
        .map_err(runtime_error)?;

    builder.commit_from_file(path).map_err(runtime_error)
}

fn read_class_names(session: &Session) -> Result<ClassNames, ModelLoadError> {
    let metadata = session.metadata().map_err(runtime_error)?;
    match metadata.custom(NAMES_METADATA_KEY).map_err(runtime_error)? {
        Some(raw) => Ok(ClassNames::from_metadata(&raw)?),
        None => Ok(ClassNames::default()),
    }
}

/// ONNX Runtime detector with a small round-robin pool of sessions.
pub struct OrtModelService {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
    class_names: ClassNames,
    input_size: u32,
    iou_threshold: f32,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig, path: &Path) -> Result<Self, ModelLoadError> {
        if !path.exists() {
            return Err(ModelLoadError::NotFound(path.to_path_buf()));
        }

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| build_session(path))
            .collect::<Result<Vec<_>, _>>()?;

        let class_names = match &model_config.labels_file {
            Some(labels_file) => load_labels_file(labels_file)?,
            None => read_class_names(&sessions[0])?,
        };
        if class_names.is_empty() {
            tracing::warn!("Model carries no class names, labels fall back to class ids");
        }

        tracing::info!("Created {} ONNX sessions", num_instances);

        Ok(Self {
            sessions: sessions.into_iter().map(Mutex::new).collect(),
            counter: AtomicUsize::new(0),
            class_names,
            input_size: model_config.input_size,
            iou_threshold: model_config.iou_threshold,
        })
    }

    fn run_inference(&self, input: &Array4<f32>) -> Result<ArrayD<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| InferenceError::SessionPoisoned(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| InferenceError::Tensor(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| InferenceError::Run(e.to_string()))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| InferenceError::Extract(e.to_string()))?;

        Ok(output.to_owned())
    }
}

impl ModelService for OrtModelService {
    fn infer(
        &self,
        image: &RgbImage,
        confidence_floor: f32,
    ) -> Result<Vec<RawDetection>, InferenceError> {
        let letterbox = Letterbox::fit(image.width(), image.height(), self.input_size);
        let input = image_to_tensor(image, &letterbox);
        let output = self.run_inference(&input)?;

        let boxes = decode_output(output.view(), &letterbox, confidence_floor)?;

        Ok(non_max_suppression(boxes, self.iou_threshold))
    }

    fn class_names(&self) -> &ClassNames {
        &self.class_names
    }
}
