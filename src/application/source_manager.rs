use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use crate::application::ports::{FrameSource, SourceOpenerPort};
use crate::domain::{errors::DomainResult, frame::Frame, source::SourceDescriptor};

/// El `Option` se vacía al liberar; soltar la caja cierra el dispositivo.
type SharedSource = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

struct ActiveSource {
    descriptor: SourceDescriptor,
    source: SharedSource,
}

/// Resultado de pedir un frame a la fuente activa.
pub enum FramePull {
    Frame(Frame),
    EndOfStream,
    /// No hay fuente activa.
    Idle,
}

/// Singleton de la fuente de vídeo: 0 o 1 handle abierto.
/// `start` y `stop` se serializan sobre el mismo mutex.
pub struct SourceManager {
    opener: Arc<dyn SourceOpenerPort>,
    active: Mutex<Option<ActiveSource>>,
}

impl SourceManager {
    pub fn new(opener: Arc<dyn SourceOpenerPort>) -> Self {
        Self { opener, active: Mutex::new(None) }
    }

    /// Libera la fuente anterior (si la hay) y abre la nueva. Bloqueante.
    pub fn start(&self, descriptor: SourceDescriptor) -> DomainResult<()> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            info!(source = %previous.descriptor, "Liberando fuente anterior");
            release(previous);
        }

        let source = self.opener.open(&descriptor)?;
        info!(source = %descriptor, "Fuente de vídeo abierta");
        *active = Some(ActiveSource { descriptor, source: Arc::new(Mutex::new(Some(source))) });
        Ok(())
    }

    /// Idempotente. Devuelve `true` si había una fuente que liberar.
    pub fn stop(&self) -> bool {
        let previous = self.active.lock().unwrap_or_else(PoisonError::into_inner).take();
        match previous {
            Some(previous) => {
                info!(source = %previous.descriptor, "Fuente de vídeo detenida");
                release(previous);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    pub fn current(&self) -> Option<SourceDescriptor> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| a.descriptor.clone())
    }

    /// Lee el siguiente frame de la fuente activa.
    ///
    /// El lock del singleton sólo se mantiene para clonar el handle. Un `start` o
    /// `stop` concurrente espera a que termine la lectura en curso antes de cerrar.
    pub fn pull(&self) -> DomainResult<FramePull> {
        let handle = {
            let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            match active.as_ref() {
                Some(a) => a.source.clone(),
                None => return Ok(FramePull::Idle),
            }
        };

        let mut slot = handle.lock().unwrap_or_else(|poisoned| {
            warn!("Handle de fuente envenenado; se reutiliza");
            poisoned.into_inner()
        });
        // Liberada mientras esperábamos el lock.
        let Some(source) = slot.as_mut() else {
            return Ok(FramePull::Idle);
        };
        Ok(match source.read()? {
            Some(frame) => FramePull::Frame(frame),
            None => FramePull::EndOfStream,
        })
    }
}

/// Espera a que acabe cualquier lectura en curso y cierra el dispositivo bajo el lock.
fn release(previous: ActiveSource) {
    let mut slot = previous.source.lock().unwrap_or_else(PoisonError::into_inner);
    drop(slot.take());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainError;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        released: AtomicUsize,
    }

    struct FakeSource {
        frames: usize,
        counters: Arc<Counters>,
    }

    impl FrameSource for FakeSource {
        fn read(&mut self) -> DomainResult<Option<Frame>> {
            if self.frames == 0 {
                return Ok(None);
            }
            self.frames -= 1;
            Ok(Some(Frame::new(RgbImage::new(4, 4))))
        }
    }

    impl Drop for FakeSource {
        fn drop(&mut self) {
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeOpener {
        counters: Arc<Counters>,
    }

    impl SourceOpenerPort for FakeOpener {
        fn open(&self, descriptor: &SourceDescriptor) -> DomainResult<Box<dyn FrameSource>> {
            if let SourceDescriptor::Network { url } = descriptor {
                if url.contains("unreachable") {
                    return Err(DomainError::Source("no route".into()));
                }
            }
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSource { frames: 1, counters: self.counters.clone() }))
        }
    }

    fn manager() -> (SourceManager, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (SourceManager::new(Arc::new(FakeOpener { counters: counters.clone() })), counters)
    }

    #[test]
    fn stop_twice_is_safe() {
        let (mgr, _) = manager();
        assert!(!mgr.stop());
        assert!(!mgr.stop());
        assert!(!mgr.is_active());
        assert!(matches!(mgr.pull().unwrap(), FramePull::Idle));
    }

    #[test]
    fn start_then_immediate_stop_releases_handle() {
        let (mgr, counters) = manager();
        mgr.start(SourceDescriptor::webcam()).unwrap();
        assert!(mgr.is_active());
        assert!(mgr.stop());
        assert!(!mgr.is_active());
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
        assert!(!mgr.stop());
    }

    #[test]
    fn switching_releases_previous_first() {
        let (mgr, counters) = manager();
        mgr.start(SourceDescriptor::webcam()).unwrap();
        mgr.start(SourceDescriptor::network("rtsp://cam").unwrap()).unwrap();
        assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.current(), Some(SourceDescriptor::Network { url: "rtsp://cam".into() }));
    }

    #[test]
    fn failed_open_leaves_manager_idle() {
        let (mgr, counters) = manager();
        mgr.start(SourceDescriptor::webcam()).unwrap();
        let err = mgr.start(SourceDescriptor::network("rtsp://unreachable").unwrap());
        assert!(err.is_err());
        assert!(!mgr.is_active());
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pull_reports_end_of_stream() {
        let (mgr, _) = manager();
        mgr.start(SourceDescriptor::webcam()).unwrap();
        assert!(matches!(mgr.pull().unwrap(), FramePull::Frame(_)));
        assert!(matches!(mgr.pull().unwrap(), FramePull::EndOfStream));
    }

    /// Cuenta handles vivos y registra el máximo simultáneo.
    #[derive(Default)]
    struct LiveHandles {
        live: AtomicUsize,
        peak: AtomicUsize,
    }

    struct SlowSource(Arc<LiveHandles>);

    impl FrameSource for SlowSource {
        fn read(&mut self) -> DomainResult<Option<Frame>> {
            thread::sleep(Duration::from_millis(300));
            Ok(Some(Frame::new(RgbImage::new(4, 4))))
        }
    }

    impl Drop for SlowSource {
        fn drop(&mut self) {
            self.0.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct SlowOpener(Arc<LiveHandles>);

    impl SourceOpenerPort for SlowOpener {
        fn open(&self, _descriptor: &SourceDescriptor) -> DomainResult<Box<dyn FrameSource>> {
            let now = self.0.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.0.peak.fetch_max(now, Ordering::SeqCst);
            Ok(Box::new(SlowSource(self.0.clone())))
        }
    }

    #[test]
    fn restart_during_read_never_holds_two_handles() {
        let handles = Arc::new(LiveHandles::default());
        let mgr = SourceManager::new(Arc::new(SlowOpener(handles.clone())));
        mgr.start(SourceDescriptor::webcam()).unwrap();

        thread::scope(|s| {
            let reader = s.spawn(|| mgr.pull().unwrap());
            thread::sleep(Duration::from_millis(50));
            mgr.start(SourceDescriptor::webcam()).unwrap();
            assert!(matches!(reader.join().unwrap(), FramePull::Frame(_)));
        });

        assert_eq!(handles.peak.load(Ordering::SeqCst), 1);
        assert_eq!(handles.live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_during_read_closes_once_read_finishes() {
        let handles = Arc::new(LiveHandles::default());
        let mgr = SourceManager::new(Arc::new(SlowOpener(handles.clone())));
        mgr.start(SourceDescriptor::webcam()).unwrap();

        thread::scope(|s| {
            let reader = s.spawn(|| mgr.pull().unwrap());
            thread::sleep(Duration::from_millis(50));
            assert!(mgr.stop());
            // `stop` devuelve después de cerrar el handle.
            assert_eq!(handles.live.load(Ordering::SeqCst), 0);
            reader.join().unwrap();
        });
        assert!(matches!(mgr.pull().unwrap(), FramePull::Idle));
    }
}
