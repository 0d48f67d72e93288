use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use policy::PolicySet;
use tracing::debug;
use types::{ErrorCause, TunnelError, UnthrottleEvent};

use crate::action::RetryAction;

/// Retry state for one APN: the latest action per error cause plus the most
/// recently produced action overall.
///
/// The cause map is concurrent so queries can read it without taking the
/// manager's operation lock; report paths are serialized by that lock.
#[derive(Debug)]
pub(crate) struct ApnRetryStore {
    apn: String,
    by_cause: DashMap<ErrorCause, RetryAction>,
    last: Mutex<Option<RetryAction>>,
}

impl ApnRetryStore {
    pub(crate) fn new(apn: String) -> Self {
        Self { apn, by_cause: DashMap::new(), last: Mutex::new(None) }
    }

    /// Produces and stores a policy-derived action for `error`.
    ///
    /// The retry index accumulates only when the previous action for the
    /// same cause was policy-derived and reported an equal error, or both
    /// are IKEv2 protocol errors; anything else restarts the walk at 0.
    pub(crate) fn report(&self, error: TunnelError, policies: &PolicySet) -> RetryAction {
        let cause = ErrorCause::from(&error);
        let retry_index = match self.by_cause.get(&cause).as_deref() {
            Some(RetryAction::Policy { error: prev, retry_index, .. })
                if *prev == error
                    || (prev.is_ike_protocol() && error.is_ike_protocol()) =>
            {
                retry_index + 1
            }
            _ => 0,
        };
        let policy = policies.resolve(&self.apn, &error);
        let action =
            RetryAction::Policy { error, policy, retry_index, reported_at: Instant::now() };
        self.store(cause, action.clone());
        action
    }

    /// Produces and stores a backoff-derived action with a network-supplied
    /// wait. The policy is still resolved for handover and unthrottling
    /// semantics.
    pub(crate) fn report_backoff(
        &self,
        error: TunnelError,
        backoff: Duration,
        policies: &PolicySet,
    ) -> RetryAction {
        let cause = ErrorCause::from(&error);
        let policy = policies.resolve(&self.apn, &error);
        let action = RetryAction::Backoff { error, policy, backoff, reported_at: Instant::now() };
        self.store(cause, action.clone());
        action
    }

    fn store(&self, cause: ErrorCause, action: RetryAction) {
        self.by_cause.insert(cause, action.clone());
        *self.last.lock().expect("lock poisoned") = Some(action);
    }

    /// The most recently produced action, if any.
    pub(crate) fn last_action(&self) -> Option<RetryAction> {
        self.last.lock().expect("lock poisoned").clone()
    }

    /// Drops every action whose policy lists `event`. Returns `true` when
    /// the most recent action was among them, i.e. the APN just became
    /// eligible for an immediate attempt.
    pub(crate) fn unthrottle(&self, event: UnthrottleEvent) -> bool {
        self.by_cause.retain(|_, action| !action.unthrottled_by(event));

        let mut last = self.last.lock().expect("lock poisoned");
        if last.as_ref().is_some_and(|action| action.unthrottled_by(event)) {
            debug!(apn = %self.apn, %event, "retry state unthrottled");
            *last = None;
            return true;
        }
        false
    }
}
