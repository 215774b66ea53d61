use anyhow::{anyhow, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, ArrayViewD, Axis, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use std::fs;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

use crate::application::ports::ObjectDetectorPort;
use crate::domain::detection::Candidate;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::YoloParams;

pub struct OnnxYoloEngine {
    session: Session,
}

impl OnnxYoloEngine {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = Session::builder()?.with_intra_threads(4)?;

        // CUDA es opcional: si está disponible se registra, si no continuamos en CPU.
        let cuda = CUDAExecutionProvider::default().build();
        if let Ok(builder_with_cuda) = builder.clone().with_execution_providers([cuda]) {
            builder = builder_with_cuda;
        }

        let model_bytes = fs::read(path)?;
        let session = builder.commit_from_memory(&model_bytes)?;

        Ok(Self { session })
    }

    /// Etiquetas embebidas por el exportador de Ultralytics (clave `names`).
    pub fn embedded_labels(&self) -> Vec<String> {
        let names = self
            .session
            .metadata()
            .ok()
            .and_then(|m| m.custom("names").ok().flatten());
        names.map(|n| parse_names_metadata(&n)).unwrap_or_default()
    }

    pub fn infer(&mut self, rgb: &RgbImage, params: &YoloParams) -> Result<Vec<Candidate>> {
        let imgsz = params.input_size as usize;
        let resized = image::imageops::resize(rgb, imgsz as u32, imgsz as u32, FilterType::Nearest);

        // NCHW, normalizado a [0, 1]
        let plane = imgsz * imgsz;
        let mut input = vec![0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let idx = y as usize * imgsz + x as usize;
            input[idx] = pixel[0] as f32 / 255.0;
            input[plane + idx] = pixel[1] as f32 / 255.0;
            input[2 * plane + idx] = pixel[2] as f32 / 255.0;
        }

        let input_shape = vec![1, 3, imgsz as i64, imgsz as i64];
        let input_tensor = Value::from_array((input_shape, input))?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
        if dims.len() != 3 || dims[1] <= 4 {
            return Err(anyhow!("salida YOLO inesperada: {:?}", dims));
        }
        let array_view = ArrayViewD::from_shape(IxDyn(&dims), data_out)?;
        let view = array_view.index_axis(Axis(0), 0);

        let num_candidates = view.shape()[1];
        let sx = rgb.width() as f32 / imgsz as f32;
        let sy = rgb.height() as f32 / imgsz as f32;

        let mut candidates = Vec::new();

        for i in 0..num_candidates {
            let scores = view.slice(s![4.., i]);
            let best = scores
                .indexed_iter()
                .max_by(|(_, a), (_, b)| a.total_cmp(b));
            let Some((class_id, &max_score)) = best else { continue };

            if max_score >= params.conf_threshold {
                let cx = view[[0, i]];
                let cy = view[[1, i]];
                let w = view[[2, i]];
                let h = view[[3, i]];

                candidates.push(Candidate {
                    class_id,
                    confidence: max_score,
                    x1: ((cx - w / 2.0) * sx).max(0.0),
                    y1: ((cy - h / 2.0) * sy).max(0.0),
                    x2: ((cx + w / 2.0) * sx).min(rgb.width() as f32),
                    y2: ((cy + h / 2.0) * sy).min(rgb.height() as f32),
                });
            }
        }

        Ok(non_max_suppression(candidates, params.iou_threshold, params.max_detections))
    }
}

/// Adaptador del puerto de detección: serializa el acceso a la sesión ONNX.
pub struct OnnxDetector {
    engine: Mutex<OnnxYoloEngine>,
    params: YoloParams,
    labels: Vec<String>,
}

impl OnnxDetector {
    pub fn new(engine: OnnxYoloEngine, params: YoloParams, labels: Vec<String>) -> Self {
        if labels.is_empty() {
            warn!("El modelo no declara etiquetas; se usarán nombres genéricos class_<id>");
        } else {
            info!("Modelo con {} clases: {}", labels.len(), labels.join(", "));
        }
        Self { engine: Mutex::new(engine), params, labels }
    }
}

impl ObjectDetectorPort for OnnxDetector {
    fn infer(&self, image: &RgbImage) -> DomainResult<Vec<Candidate>> {
        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        engine
            .infer(image, &self.params)
            .map_err(|e| DomainError::Inference(e.to_string()))
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// NMS por clase, ordenado por confianza descendente.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32, max_detections: usize) -> Vec<Candidate> {
    candidates.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Candidate> = Vec::new();
    for c in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == c.class_id && iou(k, &c) > iou_threshold);
        if !overlaps {
            kept.push(c);
        }
    }
    kept
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;
    let area = |c: &Candidate| (c.x2 - c.x1).max(0.0) * (c.y2 - c.y1).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Parsea `{0: 'fox', 1: 'owl'}` a una tabla indexada por id.
pub fn parse_names_metadata(raw: &str) -> Vec<String> {
    let body = raw.trim().trim_start_matches('{').trim_end_matches('}');
    let mut pairs: Vec<(usize, String)> = body
        .split(',')
        .filter_map(|entry| {
            let (id, name) = entry.split_once(':')?;
            let id = id.trim().parse::<usize>().ok()?;
            let name = name.trim().trim_matches(|c| c == '\'' || c == '"').to_string();
            Some((id, name))
        })
        .collect();
    pairs.sort_by_key(|(id, _)| *id);

    let len = pairs.last().map(|(id, _)| id + 1).unwrap_or(0);
    let mut labels: Vec<String> = (0..len).map(|id| format!("class_{id}")).collect();
    for (id, name) in pairs {
        labels[id] = name;
    }
    labels
}
