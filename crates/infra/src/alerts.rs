//! Alert delivery boundary.
//!
//! Services hand [`AlertIntent`]s to an [`AlertSink`]; what happens next
//! (bus fan-out, email, a dashboard) is out of band.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::Duration;
use tracing::{debug, warn};

use stockwise_alerting::{AlertIntent, AlertKind};
use stockwise_events::EventBus;
use stockwise_inventory::ProductId;

pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: AlertIntent);
}

impl<S> AlertSink for std::sync::Arc<S>
where
    S: AlertSink + ?Sized,
{
    fn emit(&self, alert: AlertIntent) {
        (**self).emit(alert)
    }
}

/// Collects alerts in memory (tests, dev).
#[derive(Debug, Default)]
pub struct InMemoryAlertSink {
    alerts: Mutex<Vec<AlertIntent>>,
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<AlertIntent> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<AlertIntent> {
        std::mem::take(&mut *self.alerts.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl AlertSink for InMemoryAlertSink {
    fn emit(&self, alert: AlertIntent) {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert);
    }
}

/// Publishes alerts on an [`EventBus`] for out-of-band consumers.
#[derive(Debug)]
pub struct BusAlertSink<B> {
    bus: B,
}

impl<B> BusAlertSink<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B> AlertSink for BusAlertSink<B>
where
    B: EventBus<AlertIntent>,
{
    fn emit(&self, alert: AlertIntent) {
        let key = alert.dedup_key();
        if let Err(err) = self.bus.publish(alert) {
            warn!(kind = %key.0, product_id = %key.1, error = ?err, "failed to publish alert");
        }
    }
}

/// Drops an alert when one with the same (kind, product) went through less
/// than `window` earlier, measured on `raised_at`.
#[derive(Debug)]
pub struct SuppressingAlertSink<S> {
    inner: S,
    window: Duration,
    last_sent: Mutex<HashMap<(AlertKind, ProductId), chrono::DateTime<chrono::Utc>>>,
}

impl<S> SuppressingAlertSink<S> {
    pub fn new(inner: S, window: Duration) -> Self {
        Self {
            inner,
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S> AlertSink for SuppressingAlertSink<S>
where
    S: AlertSink,
{
    fn emit(&self, alert: AlertIntent) {
        let key = alert.dedup_key();
        {
            let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = last_sent.get(&key) {
                if alert.raised_at < *previous + self.window {
                    debug!(kind = %key.0, product_id = %key.1, "alert suppressed");
                    return;
                }
            }
            last_sent.insert(key, alert.raised_at);
        }

        warn!(
            kind = %alert.kind,
            severity = ?alert.severity,
            product_id = %alert.entity_id,
            title = %alert.title,
            "{}",
            alert.message
        );
        self.inner.emit(alert);
    }
}
