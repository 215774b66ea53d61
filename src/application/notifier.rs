use chrono::{DateTime, Local};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::application::{
    ports::{AlertMessage, MailAttachment, MailTransportPort},
    settings::SettingsService,
};
use crate::domain::errors::{DomainError, DomainResult};

pub const ALERT_SUBJECT: &str = "Wildlife Detection Alert!";

#[derive(Debug, Clone)]
pub struct AlertRequest {
    pub image_path: PathBuf,
    pub animals: BTreeSet<String>,
    pub detected_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Sent,
    CoolingDown,
    Failed,
}

/// Parte síncrona del envío: puerta de enfriamiento, composición y transporte.
#[derive(Clone)]
pub struct AlertDispatcher {
    settings: Arc<SettingsService>,
    transport: Arc<dyn MailTransportPort>,
    sender: String,
}

impl AlertDispatcher {
    pub fn new(settings: Arc<SettingsService>, transport: Arc<dyn MailTransportPort>, sender: &str) -> Self {
        Self { settings, transport, sender: sender.to_string() }
    }

    /// Nunca devuelve error: los fallos se registran y `last_alert_at` sólo avanza tras un envío correcto.
    pub async fn deliver(&self, request: AlertRequest) -> AlertOutcome {
        if let Some(remaining) = self.settings.cooldown_remaining(Instant::now()) {
            debug!(remaining_secs = remaining.as_secs(), "Alerta suprimida por enfriamiento");
            return AlertOutcome::CoolingDown;
        }

        let message = match self.compose(&request).await {
            Ok(m) => m,
            Err(e) => {
                error!("Email sending failed: {}", e);
                return AlertOutcome::Failed;
            }
        };
        let to = message.to.clone();

        match self.transport.send(message).await {
            Ok(()) => {
                self.settings.mark_alert_sent(Instant::now());
                info!(%to, "Alert email sent successfully");
                AlertOutcome::Sent
            }
            Err(e) => {
                error!("Email sending failed: {}", e);
                AlertOutcome::Failed
            }
        }
    }

    async fn compose(&self, request: &AlertRequest) -> DomainResult<AlertMessage> {
        let bytes = tokio::fs::read(&request.image_path).await.map_err(|e| {
            DomainError::Notification(format!("no se pudo leer {}: {e}", request.image_path.display()))
        })?;
        let filename = request
            .image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "detection.jpg".into());

        Ok(AlertMessage {
            from: self.sender.clone(),
            to: self.settings.recipient(),
            subject: ALERT_SUBJECT.to_string(),
            body: alert_body(&request.animals, request.detected_at),
            attachment: Some(MailAttachment {
                filename,
                content_type: "image/jpeg".into(),
                bytes,
            }),
        })
    }
}

pub fn alert_body(animals: &BTreeSet<String>, at: DateTime<Local>) -> String {
    let list = animals.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    format!("Detected: {} at {}", list, at.format("%Y-%m-%d %H:%M:%S"))
}

/// Cola acotada + un único worker. El pipeline nunca espera al servidor de correo.
pub struct Notifier {
    dispatcher: AlertDispatcher,
    queue: mpsc::Sender<AlertRequest>,
}

impl Notifier {
    /// Requiere un runtime de Tokio activo.
    pub fn spawn(dispatcher: AlertDispatcher, capacity: usize) -> (Arc<Self>, JoinHandle<()>) {
        let (queue, mut rx) = mpsc::channel::<AlertRequest>(capacity.max(1));
        let worker = dispatcher.clone();
        let handle = tokio::spawn(async move {
            // El worker vuelve a comprobar el enfriamiento: una ráfaga encolada produce un solo correo.
            while let Some(request) = rx.recv().await {
                worker.deliver(request).await;
            }
            debug!("Worker de alertas finalizado");
        });
        (Arc::new(Self { dispatcher, queue }), handle)
    }

    /// No bloquea. Descarta la petición si estamos en enfriamiento o la cola está llena.
    pub fn notify(&self, image_path: PathBuf, animals: BTreeSet<String>) {
        if self.dispatcher.settings.cooldown_remaining(Instant::now()).is_some() {
            return;
        }
        let request = AlertRequest { image_path, animals, detected_at: Local::now() };
        match self.queue.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(r)) => {
                warn!(image = %r.image_path.display(), "Cola de alertas llena; alerta descartada")
            }
            Err(TrySendError::Closed(_)) => warn!("Worker de alertas no disponible"),
        }
    }
}
