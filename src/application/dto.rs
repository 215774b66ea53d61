use serde::{Deserialize, Serialize};

use crate::domain::{
    detection::DetectionEvent,
    errors::{DomainError, DomainResult},
    settings::AlertConfig,
    source::{SourceDescriptor, SourceKind},
    stream::PipelineState,
};

/// Formulario de `/settings`. Campos ausentes = conservar el valor actual.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsForm {
    pub email: Option<String>,
    pub confidence: Option<String>,
}

/// Campos del formulario multipart de `/start`.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub source: Option<String>,
    pub cctv_url: Option<String>,
    pub upload: Option<Upload>,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Lo que hay que hacer para arrancar la fuente pedida.
#[derive(Debug, Clone, PartialEq)]
pub enum StartPlan {
    Open(SourceDescriptor),
    /// Guardar primero el fichero subido y abrirlo por ruta.
    SaveAndOpen { filename: String, bytes: Vec<u8> },
}

impl TryFrom<StartRequest> for StartPlan {
    type Error = DomainError;

    fn try_from(r: StartRequest) -> DomainResult<Self> {
        let kind = SourceKind::from_form(r.source.as_deref().unwrap_or_default())?;
        match kind {
            SourceKind::Webcam => Ok(StartPlan::Open(SourceDescriptor::webcam())),
            SourceKind::CctvIp => {
                let url = r.cctv_url.unwrap_or_default();
                Ok(StartPlan::Open(SourceDescriptor::network(&url)?))
            }
            SourceKind::VideoFile => match r.upload {
                Some(u) if !u.filename.trim().is_empty() && !u.bytes.is_empty() => {
                    Ok(StartPlan::SaveAndOpen { filename: u.filename, bytes: u.bytes })
                }
                _ => Err(DomainError::InvalidInput("falta el fichero de vídeo".into())),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsView {
    pub recipient: String,
    pub confidence_threshold: f32,
    pub cooldown_secs: u64,
}

impl From<&AlertConfig> for SettingsView {
    fn from(c: &AlertConfig) -> Self {
        Self {
            recipient: c.recipient.clone(),
            confidence_threshold: c.confidence_threshold,
            cooldown_secs: c.cooldown.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub state: PipelineState,
    pub source: Option<String>,
    pub settings: SettingsView,
    pub events: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionsResponse {
    pub detections: Vec<DetectionEvent>,
}
