//! Fuentes de red (RTSP/HTTP) y ficheros de vídeo decodificados por un proceso `ffmpeg`.
//!
//! ffmpeg escala cada frame a un tamaño fijo y lo escribe como RGB24 crudo por stdout,
//! así cada frame ocupa exactamente `width * height * 3` bytes.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};

use crate::application::ports::FrameSource;
use crate::domain::camera::FrameSize;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::frame::Frame;

pub struct FfmpegCapture {
    child: Child,
    stdout: ChildStdout,
    size: FrameSize,
    uri: String,
}

impl FfmpegCapture {
    pub fn open(ffmpeg_bin: &str, uri: &str, size: &FrameSize) -> Result<Self> {
        let mut cmd = Command::new(ffmpeg_bin);
        cmd.args(ffmpeg_args(uri, size))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().with_context(|| format!("no se pudo lanzar {ffmpeg_bin}"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture ffmpeg stdout"))?;

        info!("ffmpeg decodificando {} a {}x{}", uri, size.width, size.height);
        Ok(Self { child, stdout, size: size.clone(), uri: uri.to_string() })
    }

    fn frame_len(&self) -> usize {
        self.size.width as usize * self.size.height as usize * 3
    }
}

pub fn ffmpeg_args(uri: &str, size: &FrameSize) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
    if uri.starts_with("rtsp://") || uri.starts_with("rtsps://") {
        args.extend(["-rtsp_transport".into(), "tcp".into()]);
    }
    args.extend([
        "-i".into(),
        uri.to_string(),
        "-vf".into(),
        format!("scale={}:{}", size.width, size.height),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-f".into(),
        "rawvideo".into(),
        "-".into(),
    ]);
    args
}

/// Lee un frame completo. `Ok(None)` si el stream termina limpio en un límite de frame.
pub fn read_frame<R: Read>(reader: &mut R, len: usize) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(std::io::Error::new(ErrorKind::UnexpectedEof, "frame truncado")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Some(buf))
}

impl FrameSource for FfmpegCapture {
    fn read(&mut self) -> DomainResult<Option<Frame>> {
        let len = self.frame_len();
        match read_frame(&mut self.stdout, len) {
            Ok(Some(raw)) => {
                let image = RgbImage::from_raw(self.size.width, self.size.height, raw)
                    .ok_or_else(|| DomainError::Source("buffer RGB de tamaño inválido".into()))?;
                Ok(Some(Frame::new(image)))
            }
            Ok(None) => {
                debug!(uri = %self.uri, "ffmpeg: fin de stream");
                Ok(None)
            }
            // Un frame a medias al cerrar el proceso también es fin de stream.
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(DomainError::Source(e.to_string())),
        }
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            if e.kind() != ErrorKind::InvalidInput {
                warn!(uri = %self.uri, "No se pudo detener ffmpeg: {}", e);
            }
        }
        let _ = self.child.wait();
    }
}
