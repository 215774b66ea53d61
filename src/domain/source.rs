use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::camera::webcam_path;
use super::errors::{DomainError, DomainResult};

/// Tipos de fuente que ofrece el formulario de inicio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Webcam,
    CctvIp,
    VideoFile,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Webcam, SourceKind::CctvIp, SourceKind::VideoFile];

    pub fn form_label(self) -> &'static str {
        match self {
            SourceKind::Webcam => "Webcam",
            SourceKind::CctvIp => "CCTV IP",
            SourceKind::VideoFile => "Video File",
        }
    }

    pub fn from_form(value: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.form_label() == value.trim())
            .ok_or_else(|| DomainError::InvalidInput(format!("fuente desconocida: {value}")))
    }
}

/// Origen concreto de los frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceDescriptor {
    Webcam { index: u32 },
    Network { url: String },
    File { path: PathBuf },
}

impl SourceDescriptor {
    pub fn webcam() -> Self { SourceDescriptor::Webcam { index: 0 } }

    pub fn network(url: &str) -> DomainResult<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DomainError::InvalidInput("URL de la cámara vacía".into()));
        }
        Ok(SourceDescriptor::Network { url: url.to_string() })
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDescriptor::Webcam { .. } => SourceKind::Webcam,
            SourceDescriptor::Network { .. } => SourceKind::CctvIp,
            SourceDescriptor::File { .. } => SourceKind::VideoFile,
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Webcam { index } => write!(f, "webcam {}", webcam_path(*index)),
            SourceDescriptor::Network { url } => write!(f, "stream {url}"),
            SourceDescriptor::File { path } => write!(f, "fichero {}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_labels_round_trip() {
        for kind in SourceKind::ALL {
            assert_eq!(SourceKind::from_form(kind.form_label()).unwrap(), kind);
        }
        assert!(SourceKind::from_form("Drone").is_err());
    }

    #[test]
    fn empty_network_url_is_rejected() {
        assert!(matches!(SourceDescriptor::network("  "), Err(DomainError::InvalidInput(_))));
        let d = SourceDescriptor::network(" rtsp://cam/1 ").unwrap();
        assert_eq!(d, SourceDescriptor::Network { url: "rtsp://cam/1".into() });
        assert_eq!(d.kind(), SourceKind::CctvIp);
    }

    #[test]
    fn default_webcam_is_device_zero() {
        assert_eq!(SourceDescriptor::webcam().to_string(), "webcam /dev/video0");
    }
}
