use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

/// Modo de captura solicitado a la webcam (el driver puede ajustarlo).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraMode {
    pub format: String,
    pub size: FrameSize,
    pub fps: u32,
}

impl Default for CameraMode {
    fn default() -> Self {
        Self {
            format: "MJPG".into(),
            size: FrameSize { width: 640, height: 480 },
            fps: 30,
        }
    }
}

pub fn webcam_path(index: u32) -> String { format!("/dev/video{}", index) }
