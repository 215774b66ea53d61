use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::adapters::{capture_opener::CaptureSettings, smtp::mailer::SmtpSettings};
use crate::application::pipeline::PipelineOptions;
use crate::domain::camera::{CameraMode, FrameSize};

/// Monitor de fauna: detección YOLO sobre webcam, RTSP o vídeo, con alertas por correo.
#[derive(Parser, Debug, Clone)]
#[command(name = "wildlife-monitor", version, about)]
pub struct AppConfig {
    /// Dirección de escucha del servidor HTTP.
    #[arg(long, env = "WILDCAM_BIND", default_value = "0.0.0.0:5000")]
    pub bind: String,

    #[arg(long, env = "WILDCAM_MODEL_PATH", default_value = "best.onnx")]
    pub model_path: String,

    /// Etiquetas, una por línea. Sin este fichero se usan las embebidas en el modelo.
    #[arg(long, env = "WILDCAM_LABELS_PATH")]
    pub labels_path: Option<PathBuf>,

    /// Carpeta de capturas y vídeos subidos (servida en `/static`).
    #[arg(long, env = "WILDCAM_DETECTION_DIR", default_value = "static")]
    pub detection_dir: PathBuf,

    #[arg(long, env = "WILDCAM_CONFIDENCE_THRESHOLD", default_value_t = 0.5)]
    pub confidence_threshold: f32,

    #[arg(long, env = "WILDCAM_SMTP_HOST", default_value = "smtp.gmail.com")]
    pub smtp_host: String,

    #[arg(long, env = "WILDCAM_SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    #[arg(long, env = "WILDCAM_SMTP_TIMEOUT_SECS", default_value_t = 30)]
    pub smtp_timeout_secs: u64,

    /// Remitente y usuario SMTP.
    #[arg(long, env = "WILDCAM_MAIL_SENDER", default_value = "your_email@example.com")]
    pub mail_sender: String,

    #[arg(long, env = "WILDCAM_MAIL_RECIPIENT", default_value = "recipient@example.com")]
    pub mail_recipient: String,

    #[arg(long, env = "WILDCAM_MAIL_PASSWORD", default_value = "", hide_env_values = true)]
    pub mail_password: String,

    #[arg(long, env = "WILDCAM_ALERT_COOLDOWN_SECS", default_value_t = 60)]
    pub alert_cooldown_secs: u64,

    #[arg(long, env = "WILDCAM_ALERT_QUEUE", default_value_t = 8)]
    pub alert_queue: usize,

    #[arg(long, env = "WILDCAM_WEBCAM_FOURCC", default_value = "MJPG")]
    pub webcam_fourcc: String,

    #[arg(long, env = "WILDCAM_WEBCAM_WIDTH", default_value_t = 640)]
    pub webcam_width: u32,

    #[arg(long, env = "WILDCAM_WEBCAM_HEIGHT", default_value_t = 480)]
    pub webcam_height: u32,

    #[arg(long, env = "WILDCAM_WEBCAM_FPS", default_value_t = 30)]
    pub webcam_fps: u32,

    /// Tamaño al que ffmpeg escala las fuentes de red y fichero.
    #[arg(long, env = "WILDCAM_STREAM_WIDTH", default_value_t = 640)]
    pub stream_width: u32,

    #[arg(long, env = "WILDCAM_STREAM_HEIGHT", default_value_t = 480)]
    pub stream_height: u32,

    /// Límite del cuerpo de `POST /start`, en MiB.
    #[arg(long, env = "WILDCAM_MAX_UPLOAD_MB", default_value_t = 512)]
    pub max_upload_mb: usize,

    #[arg(long, env = "WILDCAM_FFMPEG_BIN", default_value = "ffmpeg")]
    pub ffmpeg_bin: String,

    #[arg(long, env = "WILDCAM_JPEG_QUALITY", default_value_t = 80, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    #[arg(long, env = "WILDCAM_MAX_READ_FAILURES", default_value_t = 3)]
    pub max_read_failures: u32,

    #[arg(long, env = "WILDCAM_MAX_DETECT_FAILURES", default_value_t = 5)]
    pub max_detect_failures: u32,

    /// Máximo de eventos en memoria. Sin valor, el histórico no tiene límite.
    #[arg(long, env = "WILDCAM_HISTORY_LIMIT")]
    pub history_limit: Option<usize>,
}

impl AppConfig {
    pub fn capture(&self) -> CaptureSettings {
        CaptureSettings {
            webcam_mode: CameraMode {
                format: self.webcam_fourcc.clone(),
                size: FrameSize { width: self.webcam_width, height: self.webcam_height },
                fps: self.webcam_fps,
            },
            stream_size: FrameSize { width: self.stream_width, height: self.stream_height },
            ffmpeg_bin: self.ffmpeg_bin.clone(),
        }
    }

    pub fn smtp(&self) -> SmtpSettings {
        SmtpSettings {
            host: self.smtp_host.clone(),
            port: self.smtp_port,
            username: self.mail_sender.clone(),
            password: self.mail_password.clone(),
            timeout: Duration::from_secs(self.smtp_timeout_secs),
        }
    }

    pub fn pipeline(&self) -> PipelineOptions {
        PipelineOptions {
            jpeg_quality: self.jpeg_quality,
            max_read_failures: self.max_read_failures,
            max_detect_failures: self.max_detect_failures,
            ..Default::default()
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }
}
