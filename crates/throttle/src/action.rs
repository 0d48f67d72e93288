use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use policy::{ErrorPolicy, PolicyType};
use types::{TunnelError, UnthrottleEvent};

/// Snapshot of one throttling decision for an APN.
///
/// Policy-derived actions walk the policy's retry array; backoff-derived
/// actions carry a wait the network supplied directly and ignore the array.
#[derive(Clone, Debug)]
pub enum RetryAction {
    /// Wait taken from the resolved policy's retry array.
    Policy {
        /// The error that produced this action.
        error: TunnelError,
        /// The policy the wait was derived from.
        policy: Arc<ErrorPolicy>,
        /// 0-based position in the retry array, accumulated across reports
        /// of the same cause.
        retry_index: usize,
        /// Monotonic timestamp of the report.
        reported_at: Instant,
    },
    /// Wait supplied by the network as a back-off value.
    Backoff {
        /// The error that produced this action.
        error: TunnelError,
        /// Resolved policy, kept for handover and unthrottling semantics.
        policy: Arc<ErrorPolicy>,
        /// The network-supplied wait.
        backoff: Duration,
        /// Monotonic timestamp of the report.
        reported_at: Instant,
    },
}

impl RetryAction {
    /// The error that produced this action.
    pub const fn error(&self) -> &TunnelError {
        match self {
            Self::Policy { error, .. } | Self::Backoff { error, .. } => error,
        }
    }

    /// The policy this action was resolved against.
    pub const fn policy(&self) -> &Arc<ErrorPolicy> {
        match self {
            Self::Policy { policy, .. } | Self::Backoff { policy, .. } => policy,
        }
    }

    /// Retry-array position, for policy-derived actions.
    pub const fn retry_index(&self) -> Option<usize> {
        match self {
            Self::Policy { retry_index, .. } => Some(*retry_index),
            Self::Backoff { .. } => None,
        }
    }

    /// Full wait attached to this action at report time.
    pub fn total_wait(&self) -> Duration {
        match self {
            Self::Policy { policy, retry_index, .. } => {
                Duration::from_secs(policy.wait_secs(*retry_index))
            }
            Self::Backoff { backoff, .. } => *backoff,
        }
    }

    /// Wait still outstanding, measured against the monotonic clock.
    pub fn remaining_wait(&self) -> Duration {
        let reported_at = match self {
            Self::Policy { reported_at, .. } | Self::Backoff { reported_at, .. } => *reported_at,
        };
        self.total_wait().saturating_sub(reported_at.elapsed())
    }

    /// Whether the caller should abandon handover semantics and retry with
    /// an initial attach.
    pub fn should_retry_with_initial_attach(&self) -> bool {
        if self.policy().error_type() != PolicyType::IkeProtocol {
            return false;
        }
        match self {
            Self::Policy { retry_index, policy, .. } => policy
                .handover_attempt_count()
                .is_some_and(|count| *retry_index + 1 >= count as usize),
            Self::Backoff { policy, .. } => policy.handover_attempt_count() == Some(0),
        }
    }

    /// ePDG FQDN index this action targets, out of `num_fqdns` discovered
    /// names. Backoff-derived actions always target the first FQDN.
    pub fn fqdn_index(&self, num_fqdns: usize) -> Option<usize> {
        match self {
            Self::Policy { policy, retry_index, .. } => {
                policy.fqdn_index(*retry_index, num_fqdns)
            }
            Self::Backoff { .. } => Some(0),
        }
    }

    /// Whether `event` invalidates this action.
    pub fn unthrottled_by(&self, event: UnthrottleEvent) -> bool {
        self.policy().unthrottled_by(event)
    }
}
