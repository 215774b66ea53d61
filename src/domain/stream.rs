use serde::{Deserialize, Serialize};

pub const MJPEG_BOUNDARY: &str = "frame";
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Estados de una generación del pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Streaming,
    Stopping,
}

/// Motivo por el que terminó una generación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationEnd {
    /// No hay fuente activa (stop explícito o nunca se arrancó).
    NoSource,
    EndOfStream,
    ReadFailures,
    DetectionFailures,
    /// Un cliente más reciente tomó el relevo.
    Superseded,
    ClientGone,
}

/// Envuelve un JPEG como una parte del flujo `multipart/x-mixed-replace`.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 48);
    part.extend_from_slice(b"--");
    part.extend_from_slice(MJPEG_BOUNDARY.as_bytes());
    part.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}
