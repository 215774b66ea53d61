use anyhow::{anyhow, Result};
use image::{ImageFormat, RgbImage};
use v4l::format::FourCC;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::application::ports::FrameSource;
use crate::domain::camera::{webcam_path, CameraMode};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::frame::Frame;

/// Webcam local vía V4L2 con buffers MMAP.
pub struct V4l2Capture {
    // El stream guarda su propio handle del dispositivo; al soltarlo se cierra.
    stream: Stream<'static>,
    fourcc: FourCC,
    width: u32,
    height: u32,
}

impl V4l2Capture {
    /// Abre el dispositivo de cámara y configura el formato y el flujo de memoria mapeada (MMAP).
    pub fn open(index: u32, mode: &CameraMode) -> Result<Self> {
        let path = webcam_path(index);
        let dev = Device::with_path(&path)?;

        // 1. Configurar Formato
        let mut fmt = dev.format()?;
        let b = mode.format.as_bytes();
        if b.len() != 4 {
            return Err(anyhow!("FourCC debe tener 4 caracteres"));
        }
        fmt.fourcc = FourCC::new(&[b[0], b[1], b[2], b[3]]);
        fmt.width = mode.size.width;
        fmt.height = mode.size.height;

        // El driver puede ajustar los valores a los más cercanos soportados
        let actual_fmt = dev.set_format(&fmt)?;

        // 2. Configurar FPS (Frame Interval)
        let mut params = dev.params()?;
        params.interval.numerator = 1;
        params.interval.denominator = mode.fps;
        let _ = dev.set_params(&params);

        // 3. Inicializar Stream (MMAP)
        let stream = Stream::with_buffers(&dev, v4l::buffer::Type::VideoCapture, 4)?;

        tracing::info!(
            "Cámara abierta: {} {}x{} [{}] a {} FPS",
            path, actual_fmt.width, actual_fmt.height, actual_fmt.fourcc, mode.fps
        );

        Ok(Self {
            stream,
            fourcc: actual_fmt.fourcc,
            width: actual_fmt.width,
            height: actual_fmt.height,
        })
    }

    /// Captura el siguiente frame y lo devuelve en RGB.
    pub fn next_rgb(&mut self) -> Result<RgbImage> {
        let (data, _) = self.stream.next()?;
        let fcc_str = self.fourcc.str().map_err(|_| anyhow!("FourCC inválido"))?;

        match fcc_str {
            // MJPG es básicamente una secuencia de JPEGs
            "MJPG" => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8()),
            "YUYV" => Ok(yuyv_to_rgb(data, self.width, self.height)),
            _ => Err(anyhow!("Formato de cámara {} no soportado por este pipeline", fcc_str)),
        }
    }
}

impl FrameSource for V4l2Capture {
    fn read(&mut self) -> DomainResult<Option<Frame>> {
        self.next_rgb()
            .map(|rgb| Some(Frame::new(rgb)))
            .map_err(|e| DomainError::Source(e.to_string()))
    }
}

/// Convierte un buffer YUYV (YUV 4:2:2) a una RgbImage.
pub fn yuyv_to_rgb(yuyv: &[u8], w: u32, h: u32) -> RgbImage {
    let mut out = RgbImage::new(w, h);

    // Cada bloque de 4 bytes en YUYV define 2 píxeles: [Y0, U, Y1, V]
    for (i, chunk) in yuyv.chunks_exact(4).enumerate() {
        let y0 = chunk[0] as f32;
        let u  = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v  = chunk[3] as f32 - 128.0;

        let pixel_idx = i as u32 * 2;
        let x = pixel_idx % w.max(1);
        let y = pixel_idx / w.max(1);

        if y < h {
            out.put_pixel(x, y, bt601(y0, u, v));
            if x + 1 < w {
                out.put_pixel(x + 1, y, bt601(y1, u, v));
            }
        }
    }
    out
}

fn bt601(y: f32, u: f32, v: f32) -> image::Rgb<u8> {
    let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
    image::Rgb([r, g, b])
}
