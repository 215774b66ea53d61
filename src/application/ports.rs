use async_trait::async_trait;
use image::RgbImage;
use std::path::PathBuf;

use crate::domain::{
    detection::Candidate,
    errors::DomainResult,
    frame::Frame,
    source::SourceDescriptor,
};

/// Modelo de detección opaco: frame → cajas candidatas.
/// Se invoca desde el hilo bloqueante del pipeline.
pub trait ObjectDetectorPort: Send + Sync {
    fn infer(&self, image: &RgbImage) -> DomainResult<Vec<Candidate>>;
    /// Tabla de etiquetas del modelo, indexada por `class_id`.
    fn labels(&self) -> &[String];
}

/// Fuente de vídeo abierta. Soltar la caja libera el dispositivo.
pub trait FrameSource: Send {
    /// `Ok(None)` indica fin de stream.
    fn read(&mut self) -> DomainResult<Option<Frame>>;
}

pub trait SourceOpenerPort: Send + Sync {
    fn open(&self, descriptor: &SourceDescriptor) -> DomainResult<Box<dyn FrameSource>>;
}

pub trait SnapshotStorePort: Send + Sync {
    /// Guarda un frame anotado con el nombre dado y devuelve la ruta final.
    fn save_detection(&self, name: &str, image: &RgbImage) -> DomainResult<PathBuf>;
    fn save_upload(&self, filename: &str, bytes: &[u8]) -> DomainResult<PathBuf>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<MailAttachment>,
}

#[async_trait]
pub trait MailTransportPort: Send + Sync {
    async fn send(&self, message: AlertMessage) -> DomainResult<()>;
}
