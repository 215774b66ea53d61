use image::RgbImage;
use std::sync::Arc;

use crate::application::{ports::ObjectDetectorPort, settings::SettingsService};
use crate::domain::{
    detection::{BoundingBox, Candidate, Detection},
    errors::DomainResult,
};

/// Envuelve el modelo y aplica el umbral vigente en cada llamada.
pub struct Detector {
    model: Arc<dyn ObjectDetectorPort>,
    settings: Arc<SettingsService>,
}

impl Detector {
    pub fn new(model: Arc<dyn ObjectDetectorPort>, settings: Arc<SettingsService>) -> Self {
        Self { model, settings }
    }

    /// Un fallo del modelo se propaga tal cual; el pipeline decide qué hacer con el frame.
    pub fn detect(&self, image: &RgbImage) -> DomainResult<Vec<Detection>> {
        let threshold = self.settings.confidence_threshold();
        let candidates = self.model.infer(image)?;
        Ok(filter_candidates(candidates, threshold, self.model.labels()))
    }
}

pub fn filter_candidates(candidates: Vec<Candidate>, threshold: f32, labels: &[String]) -> Vec<Detection> {
    candidates
        .into_iter()
        .filter(|c| c.confidence >= threshold)
        .map(|c| Detection {
            class: labels
                .get(c.class_id)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", c.class_id)),
            confidence: c.confidence,
            bbox: BoundingBox::from_f32(c.x1, c.y1, c.x2, c.y2),
        })
        .collect()
}
