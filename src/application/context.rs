use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::application::{
    detection_store::DetectionStore,
    detector::Detector,
    notifier::{AlertDispatcher, Notifier},
    pipeline::{PipelineOptions, PipelineService},
    ports::{MailTransportPort, ObjectDetectorPort, SnapshotStorePort, SourceOpenerPort},
    settings::SettingsService,
    source_manager::SourceManager,
};
use crate::domain::{errors::DomainResult, settings::AlertConfig};

/// Adaptadores de infraestructura que necesita el núcleo.
pub struct Ports {
    pub model: Arc<dyn ObjectDetectorPort>,
    pub opener: Arc<dyn SourceOpenerPort>,
    pub snapshots: Arc<dyn SnapshotStorePort>,
    pub mailer: Arc<dyn MailTransportPort>,
}

pub struct ContextOptions {
    pub recipient: String,
    pub sender: String,
    pub confidence_threshold: f32,
    pub cooldown: Duration,
    pub alert_queue: usize,
    pub history_limit: Option<usize>,
    /// Directorio donde el adaptador de snapshots deja las imágenes.
    pub detection_dir: PathBuf,
    pub pipeline: PipelineOptions,
}

/// Estado de proceso: fuente, histórico y configuración de alertas, con su ciclo de vida
/// ligado al del servidor. Sustituye a cualquier estado global.
pub struct MonitorContext {
    pub sources: Arc<SourceManager>,
    pub store: Arc<DetectionStore>,
    pub settings: Arc<SettingsService>,
    pub snapshots: Arc<dyn SnapshotStorePort>,
    pub pipeline: Arc<PipelineService>,
    pub detection_dir: PathBuf,
}

impl MonitorContext {
    /// Debe llamarse dentro del runtime de Tokio (arranca el worker de alertas).
    pub fn build(ports: Ports, options: ContextOptions) -> DomainResult<(Self, JoinHandle<()>)> {
        let settings = Arc::new(SettingsService::new(AlertConfig::new(
            &options.recipient,
            options.confidence_threshold,
            options.cooldown,
        )?));

        let sources = Arc::new(SourceManager::new(ports.opener));
        let store = Arc::new(DetectionStore::new(options.history_limit));
        let detector = Arc::new(Detector::new(ports.model, settings.clone()));
        let dispatcher = AlertDispatcher::new(settings.clone(), ports.mailer, &options.sender);
        let (notifier, alert_worker) = Notifier::spawn(dispatcher, options.alert_queue);

        let pipeline = Arc::new(PipelineService::new(
            sources.clone(),
            detector,
            store.clone(),
            ports.snapshots.clone(),
            notifier,
            options.pipeline,
        ));

        Ok((
            Self {
                sources,
                store,
                settings,
                snapshots: ports.snapshots,
                pipeline,
                detection_dir: options.detection_dir,
            },
            alert_worker,
        ))
    }
}
