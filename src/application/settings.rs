use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::domain::{
    errors::DomainResult,
    settings::{parse_recipient, validate_confidence, AlertConfig},
};

/// Dueño de `AlertConfig`. Todas las mutaciones pasan por aquí bajo el mismo lock.
pub struct SettingsService {
    inner: RwLock<AlertConfig>,
}

impl SettingsService {
    pub fn new(config: AlertConfig) -> Self {
        Self { inner: RwLock::new(config) }
    }

    pub fn snapshot(&self) -> AlertConfig {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).confidence_threshold
    }

    pub fn recipient(&self) -> String {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).recipient.clone()
    }

    pub fn cooldown(&self) -> Duration {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).cooldown
    }

    /// El valor se valida antes de tomar el lock: una entrada inválida nunca toca el estado.
    pub fn set_confidence_threshold(&self, value: f32) -> DomainResult<()> {
        let value = validate_confidence(value)?;
        self.inner.write().unwrap_or_else(PoisonError::into_inner).confidence_threshold = value;
        info!(threshold = value, "Umbral de confianza actualizado");
        Ok(())
    }

    pub fn set_recipient(&self, raw: &str) -> DomainResult<()> {
        let recipient = parse_recipient(raw)?;
        info!(%recipient, "Destinatario de alertas actualizado");
        self.inner.write().unwrap_or_else(PoisonError::into_inner).recipient = recipient;
        Ok(())
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).cooldown_remaining(now)
    }

    pub fn mark_alert_sent(&self, at: Instant) {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).last_alert_at = Some(at);
    }
}
