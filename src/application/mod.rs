pub mod annotation;
pub mod context;
pub mod detection_store;
pub mod detector;
pub mod dto;
pub mod notifier;
pub mod pipeline;
pub mod ports;
pub mod settings;
pub mod source_manager;
