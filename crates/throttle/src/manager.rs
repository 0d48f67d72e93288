use std::{
    collections::HashSet,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use dashmap::DashMap;
use derive_more::Debug;
use eyre::Result;
use policy::PolicySet;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use types::{FailCause, SlotId, TunnelError, UnthrottleEvent};

use crate::{
    action::RetryAction,
    events::{EventSource, NoopEventSource, NoopNotifier, UnthrottleNotifier},
    stats::ErrorStats,
    store::ApnRetryStore,
};

/// Per-slot throttling façade.
///
/// The tunnel engine reports bring-up outcomes through [`report`] and
/// [`report_with_backoff`]; queries read the stored retry state without
/// mutating it. External events flow in through [`event_sender`] and are
/// applied one at a time on a consumer task owned by this instance.
///
/// Reports, policy installs and event handling are serialized by a
/// per-instance operation lock, so retry-index accumulation always observes
/// a well-defined predecessor. The lock is never held across an await.
///
/// [`report`]: Self::report
/// [`report_with_backoff`]: Self::report_with_backoff
/// [`event_sender`]: Self::event_sender
#[derive(Debug)]
pub struct RetryThrottle {
    inner: Arc<Inner>,
    events_tx: mpsc::UnboundedSender<UnthrottleEvent>,
    shutdown_tx: broadcast::Sender<()>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct Inner {
    slot: SlotId,
    /// Serializes reports, policy installs and event application.
    op_lock: Mutex<()>,
    policies: RwLock<PolicySet>,
    stores: DashMap<String, Arc<ApnRetryStore>>,
    /// Most recent (APN, error) reported through either entry point,
    /// including no-error reports.
    last_reported: Mutex<Option<(String, TunnelError)>>,
    stats: Mutex<ErrorStats>,
    registered_events: Mutex<HashSet<UnthrottleEvent>>,
    #[debug(skip)]
    notifier: Box<dyn UnthrottleNotifier>,
    #[debug(skip)]
    event_source: Box<dyn EventSource>,
}

impl RetryThrottle {
    /// Instance with the embedded default policies and no-op event wiring.
    ///
    /// Must run inside a Tokio runtime; the event consumer task is spawned
    /// here.
    pub fn new(slot: SlotId) -> Arc<Self> {
        Self::with_parts(slot, PolicySet::builtin(), Box::new(NoopNotifier), Box::new(NoopEventSource))
    }

    /// Instance with explicit policies, notifier and event source.
    pub fn with_parts(
        slot: SlotId,
        policies: PolicySet,
        notifier: Box<dyn UnthrottleNotifier>,
        event_source: Box<dyn EventSource>,
    ) -> Arc<Self> {
        let inner = Arc::new(Inner {
            slot,
            op_lock: Mutex::new(()),
            policies: RwLock::new(policies),
            stores: DashMap::new(),
            last_reported: Mutex::new(None),
            stats: Mutex::new(ErrorStats::default()),
            registered_events: Mutex::new(HashSet::new()),
            notifier,
            event_source,
        });
        {
            let current = inner.policies.read().expect("lock poisoned").clone();
            inner.sync_registrations(&current);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let consumer = spawn_consumer(Arc::clone(&inner), events_rx, shutdown_rx);

        Arc::new(Self { inner, events_tx, shutdown_tx, consumer: Mutex::new(Some(consumer)) })
    }

    /// Slot this instance is bound to.
    pub fn slot(&self) -> SlotId {
        self.inner.slot
    }

    /// Records a bring-up outcome for `apn` and returns the wait in whole
    /// seconds before the next attempt.
    ///
    /// A `NoError` report clears the APN's retry state and returns `None`:
    /// the next attempt may run immediately.
    pub fn report(&self, apn: &str, error: TunnelError) -> Option<u64> {
        let _guard = self.inner.op_lock.lock().expect("lock poisoned");
        *self.inner.last_reported.lock().expect("lock poisoned") =
            Some((apn.to_owned(), error));

        if error.is_no_error() {
            if self.inner.stores.remove(apn).is_some() {
                debug!(slot = self.inner.slot, %apn, "retry state cleared after successful bring-up");
            }
            return None;
        }

        self.inner.stats.lock().expect("lock poisoned").update(apn, &error);
        let policies = self.inner.policies.read().expect("lock poisoned").clone();
        let action = self.inner.store_for(apn).report(error, &policies);
        let wait_secs = action.total_wait().as_secs();
        debug!(
            slot = self.inner.slot,
            %apn,
            %error,
            retry_index = ?action.retry_index(),
            wait_secs,
            "throttling bring-up"
        );
        Some(wait_secs)
    }

    /// Records a bring-up outcome carrying a network-supplied back-off in
    /// seconds. The back-off overrides the policy's retry array; the policy
    /// is still consulted for handover and unthrottling semantics.
    pub fn report_with_backoff(
        &self,
        apn: &str,
        error: TunnelError,
        backoff_secs: u64,
    ) -> Option<u64> {
        let _guard = self.inner.op_lock.lock().expect("lock poisoned");
        *self.inner.last_reported.lock().expect("lock poisoned") =
            Some((apn.to_owned(), error));

        if error.is_no_error() {
            self.inner.stores.remove(apn);
            return None;
        }

        self.inner.stats.lock().expect("lock poisoned").update(apn, &error);
        let policies = self.inner.policies.read().expect("lock poisoned").clone();
        let backoff = Duration::from_secs(backoff_secs);
        self.inner.store_for(apn).report_backoff(error, backoff, &policies);
        debug!(slot = self.inner.slot, %apn, %error, backoff_secs, "throttling bring-up with network back-off");
        Some(backoff_secs)
    }

    /// Whether `apn` may attempt a bring-up right now.
    pub fn can_bring_up(&self, apn: &str) -> bool {
        self.inner.last_action(apn).is_none_or(|action| action.remaining_wait().is_zero())
    }

    /// Wait still outstanding for `apn`, `None` when no retry state is
    /// stored.
    pub fn remaining_wait(&self, apn: &str) -> Option<Duration> {
        self.inner.last_action(apn).map(|action| action.remaining_wait())
    }

    /// Public cause of the last error stored for `apn`.
    pub fn public_cause(&self, apn: &str) -> FailCause {
        self.inner
            .last_action(apn)
            .map_or(FailCause::None, |action| FailCause::from_error(action.error()))
    }

    /// Last error stored for `apn`, `NoError` when none is stored.
    pub fn last_error(&self, apn: &str) -> TunnelError {
        self.inner.last_action(apn).map_or(TunnelError::NoError, |action| *action.error())
    }

    /// Whether the caller should switch from handover to initial-attach
    /// bring-up for `apn`.
    pub fn should_retry_with_initial_attach(&self, apn: &str) -> bool {
        self.inner
            .last_action(apn)
            .is_some_and(|action| action.should_retry_with_initial_attach())
    }

    /// ePDG FQDN index to target next, derived from the most recently
    /// reported (APN, error) overall rather than a caller-supplied APN.
    pub fn current_fqdn_index(&self, num_fqdns: usize) -> Option<usize> {
        let (apn, _) = self.inner.last_reported.lock().expect("lock poisoned").clone()?;
        self.inner.last_action(&apn)?.fqdn_index(num_fqdns)
    }

    /// Public cause of the most recently reported error overall.
    pub fn most_recent_public_cause(&self) -> FailCause {
        self.inner
            .last_reported
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map_or(FailCause::None, |(_, error)| FailCause::from_error(error))
    }

    /// Replaces carrier policies with the compiled form of `json`.
    ///
    /// On success every APN's retry state is dropped and event
    /// registrations are re-synced before this returns. A malformed
    /// document is rejected and the previously installed policies stay in
    /// force.
    pub fn update_carrier_policies(&self, json: &str) -> Result<()> {
        let _guard = self.inner.op_lock.lock().expect("lock poisoned");
        let current = self.inner.policies.read().expect("lock poisoned").clone();
        match current.with_carrier(json) {
            Ok(next) => {
                info!(slot = self.inner.slot, "installing carrier policies");
                self.inner.install(next);
                Ok(())
            }
            Err(report) => {
                warn!(
                    slot = self.inner.slot,
                    error = %report,
                    "carrier policy document rejected, keeping previous policies"
                );
                Err(report)
            }
        }
    }

    /// Drops carrier policies, falling back to defaults only.
    pub fn clear_carrier_policies(&self) {
        let _guard = self.inner.op_lock.lock().expect("lock poisoned");
        let next = self.inner.policies.read().expect("lock poisoned").without_carrier();
        self.inner.install(next);
    }

    /// Sender on which the embedding layer delivers external events.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<UnthrottleEvent> {
        self.events_tx.clone()
    }

    /// Count recorded for `(apn, error)` since the last statistics reset.
    pub fn error_count(&self, apn: &str, error: &TunnelError) -> u64 {
        self.inner.stats.lock().expect("lock poisoned").count(apn, &error.to_string())
    }

    /// Stops the event consumer and unsubscribes every registered event.
    /// Pending events are discarded; the instance stays queryable.
    pub async fn shutdown(&self) {
        let handle = self.consumer.lock().expect("lock poisoned").take();
        let Some(handle) = handle else { return };
        let _ = self.shutdown_tx.send(());
        if let Err(e) = handle.await {
            warn!(slot = self.inner.slot, error = %e, "event consumer did not stop cleanly");
        }
        let mut registered = self.inner.registered_events.lock().expect("lock poisoned");
        for event in registered.drain() {
            self.inner.event_source.unsubscribe(event);
        }
    }
}

impl Inner {
    fn store_for(&self, apn: &str) -> Arc<ApnRetryStore> {
        Arc::clone(
            self.stores
                .entry(apn.to_owned())
                .or_insert_with(|| Arc::new(ApnRetryStore::new(apn.to_owned())))
                .value(),
        )
    }

    fn last_action(&self, apn: &str) -> Option<RetryAction> {
        self.stores.get(apn).and_then(|store| store.last_action())
    }

    /// Diffs the wanted event set against the registered one and tells the
    /// event source about both directions. The carrier-config event is
    /// always wanted so a reload can clear stale state.
    fn sync_registrations(&self, next: &PolicySet) {
        let mut wanted = next.unthrottle_events();
        wanted.insert(UnthrottleEvent::CarrierConfigChanged);

        let mut registered = self.registered_events.lock().expect("lock poisoned");
        for event in wanted.difference(&*registered) {
            debug!(slot = self.slot, event = %event, "subscribing to unthrottling event");
            self.event_source.subscribe(*event);
        }
        for event in registered.difference(&wanted) {
            debug!(slot = self.slot, event = %event, "unsubscribing from unthrottling event");
            self.event_source.unsubscribe(*event);
        }
        *registered = wanted;
    }

    /// Installs a new policy generation. Caller holds the operation lock.
    fn install(&self, next: PolicySet) {
        {
            let mut stats = self.stats.lock().expect("lock poisoned");
            if stats.total() > 0 {
                info!(slot = self.slot, stats = %stats, "error statistics before policy install");
            }
            stats.reset();
        }
        self.stores.clear();
        self.sync_registrations(&next);
        *self.policies.write().expect("lock poisoned") = next;
    }

    async fn handle_event(&self, event: UnthrottleEvent) {
        if !self.registered_events.lock().expect("lock poisoned").contains(&event) {
            debug!(slot = self.slot, %event, "ignoring unregistered event");
            return;
        }

        if event == UnthrottleEvent::CarrierConfigChanged {
            let _guard = self.op_lock.lock().expect("lock poisoned");
            self.stores.clear();
            info!(slot = self.slot, "carrier config changed, cleared retry state for every APN");
            return;
        }

        let mut unthrottled = Vec::new();
        {
            let _guard = self.op_lock.lock().expect("lock poisoned");
            for entry in self.stores.iter() {
                if entry.value().unthrottle(event) {
                    unthrottled.push(entry.key().clone());
                }
            }
        }
        // Notify outside the lock; the notifier may do arbitrary work.
        for apn in unthrottled {
            info!(slot = self.slot, %apn, %event, "APN unthrottled");
            self.notifier.apn_unthrottled(self.slot, &apn).await;
        }
    }
}

fn spawn_consumer(
    inner: Arc<Inner>,
    mut events_rx: mpsc::UnboundedReceiver<UnthrottleEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                event = events_rx.recv() => match event {
                    Some(event) => inner.handle_event(event).await,
                    None => break,
                },
            }
        }
        debug!(slot = inner.slot, "event consumer stopped");
    })
}

#[cfg(test)]
mod tests;
