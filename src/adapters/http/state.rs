use std::sync::Arc;
use crate::application::context::MonitorContext;

/// Estado compartido para los manejadores HTTP de Axum.
#[derive(Clone)]
pub struct HttpState {
    pub ctx: Arc<MonitorContext>,
    /// Tamaño máximo del cuerpo de `POST /start` (incluye el vídeo subido).
    pub max_upload_bytes: usize,
}
