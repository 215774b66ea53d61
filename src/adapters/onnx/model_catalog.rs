use std::fs;
use std::path::Path;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::ModelId;

pub struct OnnxModelCatalog;

impl OnnxModelCatalog {
    pub fn new() -> Self { Self }

    pub fn validate_model(&self, model: &ModelId) -> DomainResult<()> {
        if model.onnx_path.trim().is_empty() {
            return Err(DomainError::InvalidInput("onnx_path empty".into()));
        }
        let meta = fs::metadata(&model.onnx_path)
            .map_err(|_| DomainError::NotFound(format!("model file not found: {}", model.onnx_path)))?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(DomainError::InvalidInput(format!("model file is empty: {}", model.onnx_path)));
        }
        Ok(())
    }

    /// Fichero de etiquetas: una clase por línea, en orden de `class_id`.
    pub fn load_labels(&self, path: &Path) -> DomainResult<Vec<String>> {
        let text = fs::read_to_string(path)
            .map_err(|e| DomainError::NotFound(format!("labels file {}: {e}", path.display())))?;
        Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    }
}

impl Default for OnnxModelCatalog {
    fn default() -> Self { Self::new() }
}
