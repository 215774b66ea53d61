use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::application::{
    annotation::{draw_detections, encode_jpeg},
    detection_store::DetectionStore,
    detector::Detector,
    notifier::Notifier,
    ports::SnapshotStorePort,
    source_manager::{FramePull, SourceManager},
};
use crate::domain::{
    detection::{distinct_classes, summarize_detections, Detection, DetectionEvent},
    errors::DomainResult,
    frame::Frame,
    stream::{multipart_part, GenerationEnd, PipelineState},
};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub jpeg_quality: u8,
    pub max_read_failures: u32,
    pub max_detect_failures: u32,
    /// Partes MJPEG en vuelo hacia el cliente HTTP.
    pub stream_buffer: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { jpeg_quality: 80, max_read_failures: 3, max_detect_failures: 5, stream_buffer: 2 }
    }
}

/// Orquestador: fuente → detector → anotación → persistencia/histórico/alerta → stream.
pub struct PipelineService {
    sources: Arc<SourceManager>,
    detector: Arc<Detector>,
    store: Arc<DetectionStore>,
    snapshots: Arc<dyn SnapshotStorePort>,
    notifier: Arc<Notifier>,
    options: PipelineOptions,
    generation: AtomicU64,
    state: RwLock<PipelineState>,
    /// Región crítica de "guardar imagen + anotar en el histórico".
    record_lock: Mutex<()>,
}

impl PipelineService {
    pub fn new(
        sources: Arc<SourceManager>,
        detector: Arc<Detector>,
        store: Arc<DetectionStore>,
        snapshots: Arc<dyn SnapshotStorePort>,
        notifier: Arc<Notifier>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            sources,
            detector,
            store,
            snapshots,
            notifier,
            options,
            generation: AtomicU64::new(0),
            state: RwLock::new(PipelineState::Idle),
            record_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arranca una nueva generación en un hilo bloqueante y devuelve el receptor
    /// de partes MJPEG. Cualquier generación anterior termina en su siguiente lectura.
    pub fn open_stream(self: &Arc<Self>) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(self.options.stream_buffer.max(1));
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let end = this.run_generation(id, tx);
            info!(generation = id, reason = ?end, "Stream de vídeo finalizado");
        });
        rx
    }

    /// Bucle de una generación. Bloqueante.
    pub fn run_generation(&self, id: u64, tx: mpsc::Sender<Vec<u8>>) -> GenerationEnd {
        // Una generación reemplazada no toca el estado de la vigente.
        let is_current = || self.generation.load(Ordering::SeqCst) == id;
        if is_current() {
            self.set_state(PipelineState::Streaming);
        }
        let end = self.pump(id, &tx);
        if is_current() {
            self.set_state(PipelineState::Stopping);
            self.set_state(PipelineState::Idle);
        }
        end
    }

    fn pump(&self, id: u64, tx: &mpsc::Sender<Vec<u8>>) -> GenerationEnd {
        let mut read_failures = 0u32;
        let mut detect_failures = 0u32;

        loop {
            if self.generation.load(Ordering::SeqCst) != id {
                return GenerationEnd::Superseded;
            }

            let frame = match self.sources.pull() {
                Ok(FramePull::Frame(frame)) => {
                    read_failures = 0;
                    frame
                }
                Ok(FramePull::EndOfStream) => return GenerationEnd::EndOfStream,
                Ok(FramePull::Idle) => return GenerationEnd::NoSource,
                Err(e) => {
                    read_failures += 1;
                    warn!(attempt = read_failures, "Error capturando frame: {}", e);
                    if read_failures >= self.options.max_read_failures {
                        return GenerationEnd::ReadFailures;
                    }
                    continue;
                }
            };

            let frame = match self.process_frame(frame) {
                Ok(frame) => {
                    detect_failures = 0;
                    frame
                }
                Err(e) => {
                    detect_failures += 1;
                    error!(attempt = detect_failures, "Fallo del modelo, frame descartado: {}", e);
                    if detect_failures >= self.options.max_detect_failures {
                        return GenerationEnd::DetectionFailures;
                    }
                    continue;
                }
            };

            // Fallo local del frame: no cuenta contra el presupuesto del modelo.
            let jpeg = match encode_jpeg(&frame.image, self.options.jpeg_quality) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    warn!("No se pudo codificar el frame: {}", e);
                    continue;
                }
            };

            if tx.blocking_send(multipart_part(&jpeg)).is_err() {
                return GenerationEnd::ClientGone;
            }
        }
    }

    /// Detecta y, si hay detecciones, anota y registra el frame. Sólo falla si falla el modelo.
    pub fn process_frame(&self, mut frame: Frame) -> DomainResult<Frame> {
        let detections = self.detector.detect(&frame.image)?;
        if !detections.is_empty() {
            draw_detections(&mut frame.image, &detections);
            self.record(&frame, &detections);
        }
        Ok(frame)
    }

    fn record(&self, frame: &Frame, detections: &[Detection]) {
        let _guard = self.record_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let timestamp = frame.captured_at.format("%Y%m%d_%H%M%S").to_string();
        let image = format!("detection_{timestamp}.jpg");
        let path = match self.snapshots.save_detection(&image, &frame.image) {
            Ok(path) => path,
            Err(e) => {
                error!(%image, "No se pudo guardar la detección: {}", e);
                return;
            }
        };

        let animals = distinct_classes(detections);
        debug!(summary = %summarize_detections(detections), %image, "Detección registrada");
        self.store.append(DetectionEvent { timestamp, image, animals: animals.clone() });
        self.notifier.notify(path, animals);
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{
        notifier::AlertDispatcher,
        ports::{AlertMessage, FrameSource, MailTransportPort, ObjectDetectorPort, SourceOpenerPort},
        settings::SettingsService,
    };
    use crate::domain::{
        detection::Candidate,
        errors::{DomainError, DomainResult},
        settings::AlertConfig,
        source::SourceDescriptor,
    };
    use async_trait::async_trait;
    use image::RgbImage;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Cada llamada a `infer` consume el siguiente guion; `None` simula un fallo del modelo.
    struct ScriptedModel {
        script: Mutex<VecDeque<Option<Vec<Candidate>>>>,
        labels: Vec<String>,
    }

    impl ObjectDetectorPort for ScriptedModel {
        fn infer(&self, _image: &RgbImage) -> DomainResult<Vec<Candidate>> {
            match self.script.lock().unwrap().pop_front() {
                Some(Some(c)) => Ok(c),
                Some(None) => Err(DomainError::Inference("onnx runtime error".into())),
                None => Ok(vec![]),
            }
        }
        fn labels(&self) -> &[String] { &self.labels }
    }

    /// `Some(true)` = frame, `Some(false)` = error de lectura, `None` = fin de stream.
    struct ScriptedSource(VecDeque<Option<bool>>, u32);

    impl FrameSource for ScriptedSource {
        fn read(&mut self) -> DomainResult<Option<Frame>> {
            match self.0.pop_front().flatten() {
                Some(true) => Ok(Some(Frame::new(RgbImage::new(self.1, 48)))),
                Some(false) => Err(DomainError::Source("read timeout".into())),
                None => Ok(None),
            }
        }
    }

    /// El segundo campo es el ancho de los frames generados.
    struct ScriptedOpener(Mutex<Option<Vec<Option<bool>>>>, u32);

    impl SourceOpenerPort for ScriptedOpener {
        fn open(&self, _d: &SourceDescriptor) -> DomainResult<Box<dyn FrameSource>> {
            let script = self.0.lock().unwrap().take().unwrap_or_default();
            Ok(Box::new(ScriptedSource(script.into(), self.1)))
        }
    }

    struct DirSnapshots(PathBuf);

    impl SnapshotStorePort for DirSnapshots {
        fn save_detection(&self, name: &str, image: &RgbImage) -> DomainResult<PathBuf> {
            let path = self.0.join(name);
            std::fs::write(&path, encode_jpeg(image, 80)?).map_err(|e| DomainError::OperationFailed(e.to_string()))?;
            Ok(path)
        }
        fn save_upload(&self, _filename: &str, _bytes: &[u8]) -> DomainResult<PathBuf> {
            unreachable!()
        }
    }

    #[derive(Default)]
    struct CountingTransport(Mutex<Vec<AlertMessage>>);

    #[async_trait]
    impl MailTransportPort for CountingTransport {
        async fn send(&self, message: AlertMessage) -> DomainResult<()> {
            self.0.lock().unwrap().push(message);
            Ok(())
        }
    }

    /// Se queda esperando hasta que el test abre la compuerta; luego falla.
    struct StalledTransport {
        gate: tokio::sync::Semaphore,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl MailTransportPort for StalledTransport {
        async fn send(&self, _message: AlertMessage) -> DomainResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await;
            Err(DomainError::Notification("421 service not available".into()))
        }
    }

    struct Harness<T = CountingTransport> {
        dir: tempfile::TempDir,
        pipeline: Arc<PipelineService>,
        sources: Arc<SourceManager>,
        store: Arc<DetectionStore>,
        transport: Arc<T>,
        worker: tokio::task::JoinHandle<()>,
    }

    fn cand(class_id: usize, confidence: f32) -> Candidate {
        Candidate { class_id, confidence, x1: 5.0, y1: 5.0, x2: 30.0, y2: 30.0 }
    }

    fn harness(source: Vec<Option<bool>>, model: Vec<Option<Vec<Candidate>>>) -> Harness {
        build(source, model, Arc::new(CountingTransport::default()), 64, 4)
    }

    fn build<T: MailTransportPort + 'static>(
        source: Vec<Option<bool>>,
        model: Vec<Option<Vec<Candidate>>>,
        transport: Arc<T>,
        frame_width: u32,
        alert_queue: usize,
    ) -> Harness<T> {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(SettingsService::new(
            AlertConfig::new("ranger@park.org", 0.5, Duration::from_secs(60)).unwrap(),
        ));
        let model = Arc::new(ScriptedModel {
            script: Mutex::new(model.into()),
            labels: vec!["fox".into(), "owl".into(), "deer".into()],
        });
        let sources =
            Arc::new(SourceManager::new(Arc::new(ScriptedOpener(Mutex::new(Some(source)), frame_width))));
        let store = Arc::new(DetectionStore::new(None));
        let (notifier, worker) =
            Notifier::spawn(AlertDispatcher::new(settings.clone(), transport.clone(), "cam@park.org"), alert_queue);
        let pipeline = Arc::new(PipelineService::new(
            sources.clone(),
            Arc::new(Detector::new(model, settings)),
            store.clone(),
            Arc::new(DirSnapshots(dir.path().to_path_buf())),
            notifier,
            PipelineOptions { max_read_failures: 2, max_detect_failures: 2, stream_buffer: 16, ..Default::default() },
        ));
        Harness { dir, pipeline, sources, store, transport, worker }
    }

    async fn run<T>(h: &Harness<T>) -> (GenerationEnd, Vec<Vec<u8>>) {
        let (tx, mut rx) = mpsc::channel(64);
        let pipeline = h.pipeline.clone();
        let end = tokio::task::spawn_blocking(move || pipeline.run_generation(0, tx)).await.unwrap();
        let mut parts = Vec::new();
        while let Ok(p) = rx.try_recv() {
            parts.push(p);
        }
        (end, parts)
    }

    fn saved_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    async fn finish(h: Harness) -> usize {
        let Harness { pipeline, transport, worker, .. } = h;
        drop(pipeline);
        worker.await.unwrap();
        let sent = transport.0.lock().unwrap().len();
        sent
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn below_threshold_frame_leaves_no_trace() {
        let h = harness(vec![Some(true), None], vec![Some(vec![cand(2, 0.3)])]);
        h.sources.start(SourceDescriptor::webcam()).unwrap();

        let (end, parts) = run(&h).await;
        assert_eq!(end, GenerationEnd::EndOfStream);
        assert_eq!(parts.len(), 1);
        assert!(parts[0].starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert_eq!(h.store.len(), 0);
        assert_eq!(saved_files(h.dir.path()), 0);
        assert_eq!(finish(h).await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_classes_make_one_event() {
        let h = harness(
            vec![Some(true), None],
            vec![Some(vec![cand(0, 0.9), cand(0, 0.7), cand(1, 0.6)])],
        );
        h.sources.start(SourceDescriptor::webcam()).unwrap();

        let (end, parts) = run(&h).await;
        assert_eq!(end, GenerationEnd::EndOfStream);
        assert_eq!(parts.len(), 1);

        let events = h.store.snapshot();
        assert_eq!(events.len(), 1);
        let animals: Vec<_> = events[0].animals.iter().cloned().collect();
        assert_eq!(animals, vec!["fox".to_string(), "owl".to_string()]);
        assert!(events[0].image.starts_with("detection_") && events[0].image.ends_with(".jpg"));
        assert!(h.dir.path().join(&events[0].image).exists());
        assert_eq!(finish(h).await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_source_ends_immediately() {
        let h = harness(vec![], vec![]);
        let (end, parts) = run(&h).await;
        assert_eq!(end, GenerationEnd::NoSource);
        assert!(parts.is_empty());
        assert_eq!(h.pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_read_errors_are_tolerated_until_budget() {
        let h = harness(vec![Some(false), Some(true), Some(false), Some(false)], vec![]);
        h.sources.start(SourceDescriptor::webcam()).unwrap();
        let (end, parts) = run(&h).await;
        assert_eq!(end, GenerationEnd::ReadFailures);
        assert_eq!(parts.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn model_failure_skips_frame_and_recovers() {
        let h = harness(
            vec![Some(true), Some(true), Some(true), None],
            vec![None, Some(vec![]), Some(vec![])],
        );
        h.sources.start(SourceDescriptor::webcam()).unwrap();
        let (end, parts) = run(&h).await;
        assert_eq!(end, GenerationEnd::EndOfStream);
        assert_eq!(parts.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recurring_model_failure_terminates() {
        let h = harness(vec![Some(true), Some(true), Some(true)], vec![None, None, None]);
        h.sources.start(SourceDescriptor::webcam()).unwrap();
        let (end, parts) = run(&h).await;
        assert_eq!(end, GenerationEnd::DetectionFailures);
        assert!(parts.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn newer_client_supersedes_older_generation() {
        let h = harness(vec![Some(true); 8], vec![]);
        h.sources.start(SourceDescriptor::webcam()).unwrap();
        // Ya existe una generación más reciente que la 0.
        h.pipeline.generation.store(1, Ordering::SeqCst);
        h.pipeline.set_state(PipelineState::Streaming);
        let (end, parts) = run(&h).await;
        assert_eq!(end, GenerationEnd::Superseded);
        assert!(parts.is_empty());
        assert_eq!(h.pipeline.state(), PipelineState::Streaming);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropped_client_ends_generation() {
        let h = harness(vec![Some(true); 4], vec![]);
        h.sources.start(SourceDescriptor::webcam()).unwrap();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let pipeline = h.pipeline.clone();
        let end = tokio::task::spawn_blocking(move || pipeline.run_generation(0, tx)).await.unwrap();
        assert_eq!(end, GenerationEnd::ClientGone);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unencodable_frame_is_skipped_without_spending_model_budget() {
        // JPEG no admite dimensiones por encima de 65535.
        let h = build(vec![Some(true); 3], vec![], Arc::new(CountingTransport::default()), 65_536, 4);
        h.sources.start(SourceDescriptor::webcam()).unwrap();
        let (end, parts) = run(&h).await;
        assert_eq!(end, GenerationEnd::EndOfStream);
        assert!(parts.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stalled_mail_server_does_not_hold_back_frames() {
        let transport = Arc::new(StalledTransport { gate: tokio::sync::Semaphore::new(0), attempts: AtomicUsize::new(0) });
        let frames = 6;
        let mut script = vec![Some(true); frames];
        script.push(None);
        let h = build(script, vec![Some(vec![cand(0, 0.9)]); frames], transport.clone(), 64, 1);
        h.sources.start(SourceDescriptor::webcam()).unwrap();

        let (end, parts) = tokio::time::timeout(Duration::from_secs(10), run(&h)).await.unwrap();
        assert_eq!(end, GenerationEnd::EndOfStream);
        assert_eq!(parts.len(), frames);
        assert_eq!(h.store.len(), frames);
        // Uno atascado en el envío y como mucho uno en cola; el resto se descarta.
        assert!(transport.attempts.load(Ordering::SeqCst) <= 1);

        transport.gate.add_permits(frames);
        let Harness { pipeline, worker, .. } = h;
        drop(pipeline);
        worker.await.unwrap();
        assert!(transport.attempts.load(Ordering::SeqCst) <= 2);
    }
}
