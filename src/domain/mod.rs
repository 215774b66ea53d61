pub mod camera;
pub mod detection;
pub mod errors;
pub mod frame;
pub mod model;
pub mod settings;
pub mod source;
pub mod stream;
