//! Process-wide registry of per-slot throttle instances.
//!
//! Guarantees at most one live instance per SIM slot. Instances are created
//! on demand and must be torn down through [`teardown`] so the event
//! consumer is joined before the maps drop.

use std::sync::{Arc, LazyLock};

use dashmap::{DashMap, mapref::entry::Entry};
use eyre::{Result, bail};
use types::SlotId;

use crate::manager::RetryThrottle;

static REGISTRY: LazyLock<DashMap<SlotId, Arc<RetryThrottle>>> = LazyLock::new(DashMap::new);

/// Live instance for `slot`, creating one with the embedded default
/// policies on first use. Must run inside a Tokio runtime.
pub fn get_or_init(slot: SlotId) -> Arc<RetryThrottle> {
    Arc::clone(REGISTRY.entry(slot).or_insert_with(|| RetryThrottle::new(slot)).value())
}

/// Live instance for `slot`, if one exists.
pub fn get(slot: SlotId) -> Option<Arc<RetryThrottle>> {
    REGISTRY.get(&slot).map(|entry| Arc::clone(entry.value()))
}

/// Installs a pre-built instance for `slot`, e.g. one constructed with a
/// custom notifier. Fails if the slot already has a live instance.
pub fn install(slot: SlotId, throttle: Arc<RetryThrottle>) -> Result<()> {
    match REGISTRY.entry(slot) {
        Entry::Occupied(_) => bail!("slot {slot} already has a live throttle instance"),
        Entry::Vacant(vacant) => {
            vacant.insert(throttle);
            Ok(())
        }
    }
}

/// Removes and shuts down the instance for `slot`: the event consumer is
/// joined and all event registrations are released.
pub async fn teardown(slot: SlotId) {
    if let Some((_, throttle)) = REGISTRY.remove(&slot) {
        throttle.shutdown().await;
    }
}
