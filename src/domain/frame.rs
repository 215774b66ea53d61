use chrono::{DateTime, Local};
use image::RgbImage;

/// Frame decodificado tal y como lo entrega una fuente de vídeo.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image, captured_at: Local::now() }
    }
}
