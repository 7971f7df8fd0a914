use crate::{catalog::ClassCatalog, labels::ClassNames, model_service::RawDetection};
use serde::{Deserialize, Serialize};

fn round_to(value: f32, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value as f64 * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxCoordinates {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedDetection {
    pub class_id: u32,
    pub label: String,
    pub confidence: f64,
    pub price: f64,
    pub calories: u32,
    #[serde(rename = "box")]
    pub bbox: BoxCoordinates,
}

impl EnrichedDetection {
    /// Joins a raw detection with its label and catalog entry. Confidence is
    /// kept to 3 decimals and coordinates to 1.
    pub fn enrich(raw: &RawDetection, class_names: &ClassNames, catalog: &ClassCatalog) -> Self {
        let label = class_names.label_for(raw.class_id);
        let entry = catalog.entry_for(&label);

        Self {
            class_id: raw.class_id,
            confidence: round_to(raw.confidence, 3),
            price: entry.price,
            calories: entry.calories,
            bbox: BoxCoordinates {
                x1: round_to(raw.x1, 1),
                y1: round_to(raw.y1, 1),
                x2: round_to(raw.x2, 1),
                y2: round_to(raw.y2, 1),
            },
            label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub success: bool,
    pub count: usize,
    pub image_width: u32,
    pub image_height: u32,
    pub detections: Vec<EnrichedDetection>,
}

impl DetectionResponse {
    pub fn new(image_width: u32, image_height: u32, detections: Vec<EnrichedDetection>) -> Self {
        Self {
            success: true,
            count: detections.len(),
            image_width,
            image_height,
            detections,
        }
    }
}

/// In-band failure body; `detections` is always empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detections: Vec<EnrichedDetection>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detections: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DEFAULT_CALORIES, DEFAULT_PRICE};

    fn names() -> ClassNames {
        vec![(3, "corba".to_string()), (5, "pizza".to_string())]
            .into_iter()
            .collect()
    }

    fn raw(class_id: u32, confidence: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            x1: 12.345,
            y1: 20.06,
            x2: 100.04,
            y2: 150.99,
        }
    }

    #[test]
    fn test_enrich_known_label() {
        let catalog = ClassCatalog::embedded().unwrap();
        let detection = EnrichedDetection::enrich(&raw(3, 0.95), &names(), &catalog);

        assert_eq!(detection.label, "corba");
        assert_eq!(detection.confidence, 0.95);
        assert_eq!(detection.price, 35.0);
        assert_eq!(detection.calories, 150);
        assert_eq!(
            detection.bbox,
            BoxCoordinates {
                x1: 12.3,
                y1: 20.1,
                x2: 100.0,
                y2: 151.0
            }
        );
    }

    #[test]
    fn test_enrich_label_outside_catalog() {
        let catalog = ClassCatalog::embedded().unwrap();
        let detection = EnrichedDetection::enrich(&raw(5, 0.8), &names(), &catalog);

        assert_eq!(detection.label, "pizza");
        assert_eq!(detection.price, DEFAULT_PRICE);
        assert_eq!(detection.calories, DEFAULT_CALORIES);
    }

    #[test]
    fn test_enrich_unmapped_class_id() {
        let catalog = ClassCatalog::embedded().unwrap();
        let detection = EnrichedDetection::enrich(&raw(42, 0.8), &names(), &catalog);

        assert_eq!(detection.label, "Class 42");
        assert_eq!(detection.price, DEFAULT_PRICE);
        assert_eq!(detection.calories, DEFAULT_CALORIES);
    }

    #[test]
    fn test_confidence_rounding() {
        let catalog = ClassCatalog::embedded().unwrap();
        let detection = EnrichedDetection::enrich(&raw(3, 0.87654), &names(), &catalog);
        assert_eq!(detection.confidence, 0.877);
    }

    #[test]
    fn test_response_shape() {
        let catalog = ClassCatalog::embedded().unwrap();
        let response = DetectionResponse::new(
            1280,
            640,
            vec![EnrichedDetection::enrich(&raw(3, 0.95), &names(), &catalog)],
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["count"], 1);
        assert_eq!(json["image_width"], 1280);
        assert_eq!(json["image_height"], 640);
        assert_eq!(json["detections"][0]["label"], "corba");
        assert_eq!(json["detections"][0]["box"]["x1"], 12.3);

        let error = serde_json::to_value(ErrorResponse::new("boom")).unwrap();
        assert_eq!(error, serde_json::json!({ "error": "boom", "detections": [] }));
    }
}
