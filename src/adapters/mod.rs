pub mod capture_opener;
pub mod ffmpeg;
pub mod http;
pub mod onnx;
pub mod smtp;
pub mod storage;
pub mod v4l2;
