use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("No encontrado: {0}")]
    NotFound(String),
    #[error("Entrada inválida: {0}")]
    InvalidInput(String),
    #[error("Error de operación: {0}")]
    OperationFailed(String),
    #[error("Error de la fuente de vídeo: {0}")]
    Source(String),
    #[error("Error de inferencia: {0}")]
    Inference(String),
    #[error("Error de notificación: {0}")]
    Notification(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
