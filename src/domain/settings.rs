use std::time::Duration;
use tokio::time::Instant;

use super::errors::{DomainError, DomainResult};

/// Estado de alertas compartido por la web, el Detector y el Notifier.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    pub recipient: String,
    pub confidence_threshold: f32,
    pub cooldown: Duration,
    /// Último envío con éxito. Los intentos fallidos no lo modifican.
    pub last_alert_at: Option<Instant>,
}

impl AlertConfig {
    pub fn new(recipient: &str, confidence_threshold: f32, cooldown: Duration) -> DomainResult<Self> {
        Ok(Self {
            recipient: parse_recipient(recipient)?,
            confidence_threshold: validate_confidence(confidence_threshold)?,
            cooldown,
            last_alert_at: None,
        })
    }

    /// Tiempo restante de enfriamiento, o `None` si ya se puede enviar.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_alert_at?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }
}

pub fn validate_confidence(value: f32) -> DomainResult<f32> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(DomainError::InvalidInput(format!("confianza fuera de rango [0, 1]: {value}")));
    }
    Ok(value)
}

pub fn parse_confidence(raw: &str) -> DomainResult<f32> {
    let value = raw
        .trim()
        .parse::<f32>()
        .map_err(|_| DomainError::InvalidInput(format!("confianza no numérica: {raw:?}")))?;
    validate_confidence(value)
}

pub fn parse_recipient(raw: &str) -> DomainResult<String> {
    let value = raw.trim();
    match value.split_once('@') {
        Some((user, host)) if !user.is_empty() && !host.is_empty() && !value.contains(char::is_whitespace) => {
            Ok(value.to_string())
        }
        _ => Err(DomainError::InvalidInput(format!("destinatario inválido: {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_parsing_rejects_garbage() {
        assert_eq!(parse_confidence(" 0.7 ").unwrap(), 0.7);
        assert_eq!(parse_confidence("1").unwrap(), 1.0);
        assert!(parse_confidence("abc").is_err());
        assert!(parse_confidence("NaN").is_err());
        assert!(parse_confidence("1.5").is_err());
        assert!(parse_confidence("-0.1").is_err());
        assert!(parse_confidence("").is_err());
    }

    #[test]
    fn recipient_requires_an_address() {
        assert_eq!(parse_recipient(" ranger@park.org ").unwrap(), "ranger@park.org");
        assert!(parse_recipient("ranger").is_err());
        assert!(parse_recipient("@park.org").is_err());
        assert!(parse_recipient("a b@park.org").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_window() {
        let mut cfg = AlertConfig::new("a@b.c", 0.5, Duration::from_secs(60)).unwrap();
        let t0 = Instant::now();
        assert_eq!(cfg.cooldown_remaining(t0), None);

        cfg.last_alert_at = Some(t0);
        assert_eq!(cfg.cooldown_remaining(t0 + Duration::from_secs(10)), Some(Duration::from_secs(50)));
        assert_eq!(cfg.cooldown_remaining(t0 + Duration::from_secs(60)), None);
    }
}
