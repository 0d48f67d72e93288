use async_trait::async_trait;
use types::{SlotId, UnthrottleEvent};

/// Callback invoked when an unthrottling event clears an APN's most recent
/// retry action, i.e. the APN may be brought up immediately.
///
/// Injected into [`crate::RetryThrottle`]; the throttle never holds a back
/// pointer into the embedding layer.
#[async_trait]
pub trait UnthrottleNotifier: Send + Sync {
    /// Called once per unthrottled APN, on the event consumer task.
    async fn apn_unthrottled(&self, slot: SlotId, apn: &str);
}

/// Notifier that drops every notification.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl UnthrottleNotifier for NoopNotifier {
    async fn apn_unthrottled(&self, _slot: SlotId, _apn: &str) {}
}

/// Hook through which the embedding layer learns which external events the
/// installed policies reference, so it can wire up the matching platform
/// broadcasts.
///
/// Called with the registration diff on every policy install, before the
/// install returns.
pub trait EventSource: Send + Sync {
    /// A newly referenced event; start delivering it.
    fn subscribe(&self, event: UnthrottleEvent);

    /// An event no installed policy references anymore; stop delivering it.
    fn unsubscribe(&self, event: UnthrottleEvent);
}

/// Event source for embeddings that deliver every event unconditionally.
#[derive(Debug, Default)]
pub struct NoopEventSource;

impl EventSource for NoopEventSource {
    fn subscribe(&self, _event: UnthrottleEvent) {}

    fn unsubscribe(&self, _event: UnthrottleEvent) {}
}
