use types::{TunnelError, UnthrottleEvent};

/// Wait applied when a policy has nothing left to offer: one day, in
/// seconds. Callers may treat it as a permanent stop.
pub const NO_RETRY_SECS: u64 = 86_400;

/// Error class a policy clause applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyType {
    /// Catch-all clause, matches every error.
    Fallback,
    /// Matches non-protocol errors by generic detail token.
    Generic,
    /// Matches IKEv2 protocol errors by notify code.
    IkeProtocol,
}

/// One compiled element of a retry array.
///
/// Randomized `B+rS` entries are drawn at compile time, so a compiled array
/// only ever holds concrete seconds plus the optional trailing repeat
/// marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryInterval {
    /// Wait this many seconds before the attempt at this index.
    Secs(u64),
    /// Terminal marker: keep repeating the previous entry forever.
    RepeatLast,
}

/// One compiled match token of a policy clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorDetail {
    /// Wildcard `*`, matches any error of the clause's class.
    Any,
    /// A single IKEv2 notify code.
    IkeCode(u32),
    /// An inclusive IKEv2 notify-code range.
    IkeCodeRange {
        /// Lower bound, inclusive.
        min: u32,
        /// Upper bound, inclusive.
        max: u32,
    },
    /// A generic detail token.
    Generic(types::GenericDetail),
}

/// A compiled policy clause. Immutable once built; shared via `Arc` between
/// the resolver and stored retry actions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub(crate) error_type: PolicyType,
    pub(crate) error_details: Vec<ErrorDetail>,
    pub(crate) retry_array: Vec<RetryInterval>,
    pub(crate) unthrottling_events: Vec<UnthrottleEvent>,
    pub(crate) num_attempts_per_fqdn: Option<u32>,
    pub(crate) handover_attempt_count: Option<u32>,
}

impl ErrorPolicy {
    /// Error class this clause applies to.
    pub const fn error_type(&self) -> PolicyType {
        self.error_type
    }

    /// Threshold at which the caller should switch from handover to
    /// initial-attach bring-up. Only ever present on IKE-protocol clauses.
    pub const fn handover_attempt_count(&self) -> Option<u32> {
        self.handover_attempt_count
    }

    /// Events that invalidate retry state produced by this clause.
    pub fn unthrottling_events(&self) -> &[UnthrottleEvent] {
        &self.unthrottling_events
    }

    /// Whether `event` unthrottles retry state produced by this clause.
    pub fn unthrottled_by(&self, event: UnthrottleEvent) -> bool {
        self.unthrottling_events.contains(&event)
    }

    /// Whether this clause can handle `error`.
    pub fn matches(&self, error: &TunnelError) -> bool {
        match self.error_type {
            PolicyType::Fallback => true,
            PolicyType::Generic => match error.generic_detail() {
                Some(detail) => self.error_details.iter().any(|d| match d {
                    ErrorDetail::Any => true,
                    ErrorDetail::Generic(token) => *token == detail,
                    _ => false,
                }),
                None => false,
            },
            PolicyType::IkeProtocol => match error.ike_code() {
                Some(code) => self.error_details.iter().any(|d| match d {
                    ErrorDetail::Any => true,
                    ErrorDetail::IkeCode(c) => *c == code,
                    ErrorDetail::IkeCodeRange { min, max } => (*min..=*max).contains(&code),
                    ErrorDetail::Generic(_) => false,
                }),
                None => false,
            },
        }
    }

    /// A clause is a fallback when it is the catch-all type or its details
    /// are a lone wildcard. Specific matches beat fallbacks during
    /// resolution.
    pub fn is_fallback(&self) -> bool {
        self.error_type == PolicyType::Fallback
            || self.error_details == [ErrorDetail::Any]
    }

    /// True when the array ends in the repeat marker, i.e. the
    /// second-to-last wait applies to every attempt from there on.
    pub fn infinite_retries(&self) -> bool {
        self.retry_array.len() >= 2
            && self.retry_array.last() == Some(&RetryInterval::RepeatLast)
    }

    /// Wait in seconds before the attempt at `retry_index`.
    pub fn wait_secs(&self, retry_index: usize) -> u64 {
        let Some(last) = self.retry_array.len().checked_sub(1) else {
            return NO_RETRY_SECS;
        };
        let idx = if self.infinite_retries() {
            // The trailing marker is not a real delay, reuse the entry
            // before it for every later attempt.
            retry_index.min(last - 1)
        } else {
            retry_index.min(last)
        };
        match self.retry_array[idx] {
            RetryInterval::Secs(secs) => secs,
            RetryInterval::RepeatLast => NO_RETRY_SECS,
        }
    }

    /// ePDG FQDN to target for the attempt at `retry_index`, rotating every
    /// `NumAttemptsPerFqdn` attempts across `num_fqdns` discovered names.
    /// `None` when the clause does not rotate.
    pub fn fqdn_index(&self, retry_index: usize, num_fqdns: usize) -> Option<usize> {
        let per_fqdn = self.num_attempts_per_fqdn? as usize;
        if self.retry_array.is_empty() || num_fqdns == 0 {
            return None;
        }
        Some(((retry_index + 1) / per_fqdn) % num_fqdns)
    }
}
