use crate::adapters::{ffmpeg::capture::FfmpegCapture, v4l2::capture::V4l2Capture};
use crate::application::ports::{FrameSource, SourceOpenerPort};
use crate::domain::{
    camera::{CameraMode, FrameSize},
    errors::{DomainError, DomainResult},
    source::SourceDescriptor,
};

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub webcam_mode: CameraMode,
    pub stream_size: FrameSize,
    pub ffmpeg_bin: String,
}

/// Elige el backend de captura según el tipo de fuente.
pub struct CaptureSourceOpener {
    settings: CaptureSettings,
}

impl CaptureSourceOpener {
    pub fn new(settings: CaptureSettings) -> Self { Self { settings } }
}

impl SourceOpenerPort for CaptureSourceOpener {
    fn open(&self, descriptor: &SourceDescriptor) -> DomainResult<Box<dyn FrameSource>> {
        let source: Box<dyn FrameSource> = match descriptor {
            SourceDescriptor::Webcam { index } => Box::new(
                V4l2Capture::open(*index, &self.settings.webcam_mode)
                    .map_err(|e| DomainError::Source(format!("Error abriendo cámara: {e}")))?,
            ),
            SourceDescriptor::Network { url } => Box::new(
                FfmpegCapture::open(&self.settings.ffmpeg_bin, url, &self.settings.stream_size)
                    .map_err(|e| DomainError::Source(e.to_string()))?,
            ),
            SourceDescriptor::File { path } => {
                if !path.is_file() {
                    return Err(DomainError::NotFound(format!("vídeo no encontrado: {}", path.display())));
                }
                Box::new(
                    FfmpegCapture::open(&self.settings.ffmpeg_bin, &path.to_string_lossy(), &self.settings.stream_size)
                        .map_err(|e| DomainError::Source(e.to_string()))?,
                )
            }
        };
        Ok(source)
    }
}
