use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use crate::domain::detection::DetectionEvent;

/// Histórico en memoria, el más reciente primero. Vive lo que vive el proceso.
pub struct DetectionStore {
    events: RwLock<VecDeque<DetectionEvent>>,
    /// `None` = sin límite.
    limit: Option<usize>,
}

impl DetectionStore {
    pub fn new(limit: Option<usize>) -> Self {
        Self { events: RwLock::new(VecDeque::new()), limit }
    }

    pub fn append(&self, event: DetectionEvent) {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        events.push_front(event);
        if let Some(limit) = self.limit {
            events.truncate(limit);
        }
    }

    /// Copia independiente: los `append` posteriores no la alteran.
    pub fn snapshot(&self) -> Vec<DetectionEvent> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn event(ts: &str) -> DetectionEvent {
        DetectionEvent {
            timestamp: ts.into(),
            image: format!("detection_{ts}.jpg"),
            animals: ["fox".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn newest_first() {
        let store = DetectionStore::new(None);
        store.append(event("20240101_000001"));
        store.append(event("20240101_000002"));
        let snap = store.snapshot();
        assert_eq!(snap[0].timestamp, "20240101_000002");
        assert_eq!(snap[1].timestamp, "20240101_000001");
    }

    #[test]
    fn snapshot_is_a_copy() {
        let store = DetectionStore::new(None);
        store.append(event("a"));
        let snap = store.snapshot();
        store.append(event("b"));
        assert_eq!(snap.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn optional_limit_drops_oldest() {
        let store = DetectionStore::new(Some(2));
        for ts in ["1", "2", "3"] {
            store.append(event(ts));
        }
        let stamps: Vec<_> = store.snapshot().into_iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec!["3", "2"]);
    }

    #[test]
    fn concurrent_appends_are_never_lost() {
        let store = Arc::new(DetectionStore::new(None));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.append(event(&format!("{t}-{i}")));
                        let _ = store.snapshot();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 200);
    }
}
