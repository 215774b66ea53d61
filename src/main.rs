mod domain;
mod application;
mod adapters;
mod config;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::adapters::{
    capture_opener::CaptureSourceOpener,
    http::{router, state::HttpState},
    onnx::{
        model_catalog::OnnxModelCatalog,
        yolo_engine::{OnnxDetector, OnnxYoloEngine},
    },
    smtp::mailer::SmtpMailer,
    storage::snapshot_store::FsSnapshotStore,
};
use crate::application::context::{ContextOptions, MonitorContext, Ports};
use crate::application::source_manager::SourceManager;
use crate::config::AppConfig;
use crate::domain::model::{ModelId, YoloParams};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logs (RUST_LOG=info por defecto)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::parse();

    // 2. Modelo: se valida y se carga una sola vez
    let catalog = OnnxModelCatalog::new();
    let model_id = ModelId { name: "best".into(), onnx_path: cfg.model_path.clone() };
    catalog.validate_model(&model_id)?;

    tracing::info!(model = %model_id.name, "🔧 Cargando modelo {}...", cfg.model_path);
    let engine = OnnxYoloEngine::load(&cfg.model_path)
        .with_context(|| format!("no se pudo cargar el modelo {}", cfg.model_path))?;
    let labels = match &cfg.labels_path {
        Some(path) => catalog.load_labels(path)?,
        None => engine.embedded_labels(),
    };
    let detector = OnnxDetector::new(engine, YoloParams::default(), labels);

    // 3. Adaptadores de infraestructura
    let snapshots = FsSnapshotStore::new(cfg.detection_dir.clone(), cfg.jpeg_quality)?;
    let ports = Ports {
        model: Arc::new(detector),
        opener: Arc::new(CaptureSourceOpener::new(cfg.capture())),
        snapshots: Arc::new(snapshots),
        mailer: Arc::new(SmtpMailer::new(&cfg.smtp())?),
    };
    if cfg.mail_password.is_empty() {
        tracing::warn!("WILDCAM_MAIL_PASSWORD vacío: el envío de alertas fallará");
    }

    // 4. Contexto de la aplicación
    let (ctx, alert_worker) = MonitorContext::build(
        ports,
        ContextOptions {
            recipient: cfg.mail_recipient.clone(),
            sender: cfg.mail_sender.clone(),
            confidence_threshold: cfg.confidence_threshold,
            cooldown: cfg.cooldown(),
            alert_queue: cfg.alert_queue,
            history_limit: cfg.history_limit,
            detection_dir: cfg.detection_dir.clone(),
            pipeline: cfg.pipeline(),
        },
    )?;
    let ctx = Arc::new(ctx);

    // 5. Servidor
    let app = router(HttpState { ctx: ctx.clone(), max_upload_bytes: cfg.max_upload_bytes() });
    let listener = tokio::net::TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", cfg.bind))?;

    tracing::info!("🚀 Monitor de fauna en http://{}", cfg.bind);
    tracing::info!("📂 Capturas en '{}'", cfg.detection_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(ctx.sources.clone()))
        .await?;

    alert_worker.abort();
    Ok(())
}

/// Tras Ctrl-C libera la fuente activa; los streams abiertos terminan en su siguiente lectura.
async fn shutdown_signal(sources: Arc<SourceManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("No se pudo instalar el manejador de Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Señal de parada recibida");
    match tokio::task::spawn_blocking(move || sources.stop()).await {
        Ok(true) => tracing::info!("Fuente de vídeo liberada"),
        Ok(false) => {}
        Err(e) => tracing::error!("Error liberando la fuente: {e}"),
    }
}
