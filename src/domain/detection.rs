use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Caja candidata tal y como sale del modelo, antes de aplicar el umbral del operador.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Trunca coordenadas flotantes a píxeles enteros.
    pub fn from_f32(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1: x1 as i32, y1: y1 as i32, x2: x2 as i32, y2: y2 as i32 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn label(&self) -> String {
        format!("{} {:.2}", self.class, self.confidence)
    }
}

/// Registro de un frame con al menos una detección por encima del umbral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// `YYYYMMDD_HHMMSS`
    pub timestamp: String,
    /// Nombre del fichero guardado en el directorio de detecciones.
    pub image: String,
    pub animals: BTreeSet<String>,
}

/// Clases distintas presentes en un frame; los duplicados colapsan en una sola mención.
pub fn distinct_classes(detections: &[Detection]) -> BTreeSet<String> {
    detections.iter().map(|d| d.class.clone()).collect()
}

pub fn summarize_detections(detections: &[Detection]) -> String {
    let mut counts = BTreeMap::new();
    for det in detections {
        *counts.entry(det.class.as_str()).or_insert(0) += 1;
    }
    counts.iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect::<Vec<_>>()
        .join(", ")
}
