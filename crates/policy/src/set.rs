use std::{
    collections::HashSet,
    sync::{Arc, LazyLock},
};

use eyre::Result;
use tracing::debug;
use types::{TunnelError, UnthrottleEvent};

use crate::{
    document::{ApnPolicyMap, parse_document, strip_comments},
    policy::{ErrorDetail, ErrorPolicy, PolicyType, RetryInterval},
};

/// APN name that applies to every APN without its own entry.
pub const WILDCARD_APN: &str = "*";

/// Policy asset compiled into the binary. `#`-prefixed lines are comments.
const DEFAULT_ASSET: &str = include_str!("../assets/default_policies.json");

static BUILTIN_DEFAULTS: LazyLock<Arc<ApnPolicyMap>> = LazyLock::new(|| {
    let stripped = strip_comments(DEFAULT_ASSET);
    // The embedded asset is ground truth; failing to compile it is a build
    // defect, not a runtime condition.
    Arc::new(parse_document(&stripped).expect("embedded default policy asset is malformed"))
});

static FALLBACK_POLICY: LazyLock<Arc<ErrorPolicy>> = LazyLock::new(|| {
    Arc::new(ErrorPolicy {
        error_type: PolicyType::Fallback,
        error_details: vec![ErrorDetail::Any],
        retry_array: vec![RetryInterval::Secs(5), RetryInterval::RepeatLast],
        unthrottling_events: vec![],
        num_attempts_per_fqdn: None,
        handover_attempt_count: None,
    })
});

/// Compiled carrier and default policy tables with the four-tier lookup.
///
/// Sets are cheap to clone and swapped wholesale on carrier reload; the
/// default table is shared between generations.
#[derive(Clone, Debug)]
pub struct PolicySet {
    defaults: Arc<ApnPolicyMap>,
    carrier: Arc<ApnPolicyMap>,
}

impl PolicySet {
    /// Set backed by the embedded default asset, with no carrier policies.
    pub fn builtin() -> Self {
        Self { defaults: Arc::clone(&BUILTIN_DEFAULTS), carrier: Arc::new(ApnPolicyMap::new()) }
    }

    /// Set with defaults compiled from `json` instead of the embedded
    /// asset.
    pub fn with_defaults(json: &str) -> Result<Self> {
        Ok(Self {
            defaults: Arc::new(parse_document(json)?),
            carrier: Arc::new(ApnPolicyMap::new()),
        })
    }

    /// New generation of this set with carrier policies compiled from
    /// `json`. `self` is untouched on parse failure.
    pub fn with_carrier(&self, json: &str) -> Result<Self> {
        Ok(Self {
            defaults: Arc::clone(&self.defaults),
            carrier: Arc::new(parse_document(json)?),
        })
    }

    /// New generation of this set with carrier policies dropped.
    pub fn without_carrier(&self) -> Self {
        Self { defaults: Arc::clone(&self.defaults), carrier: Arc::new(ApnPolicyMap::new()) }
    }

    /// Whether any carrier policies are installed.
    pub fn has_carrier(&self) -> bool {
        !self.carrier.is_empty()
    }

    /// The implicit policy used when nothing else matches: five seconds,
    /// then repeat forever.
    pub fn fallback() -> Arc<ErrorPolicy> {
        Arc::clone(&FALLBACK_POLICY)
    }

    /// Picks the best policy for `(apn, error)`.
    ///
    /// Buckets are searched in priority order (carrier/apn, carrier/`*`,
    /// default/apn, default/`*`); the first bucket with any match decides.
    /// Within a bucket a specific match wins over fallbacks, and a generic
    /// fallback wins over a bare `*` one.
    pub fn resolve(&self, apn: &str, error: &TunnelError) -> Arc<ErrorPolicy> {
        let buckets = [
            self.carrier.get(apn),
            self.carrier.get(WILDCARD_APN),
            self.defaults.get(apn),
            self.defaults.get(WILDCARD_APN),
        ];
        for policies in buckets.into_iter().flatten() {
            if let Some(policy) = best_match(policies, error) {
                return policy;
            }
        }
        debug!(%apn, %error, "no policy matched, using implicit fallback");
        Self::fallback()
    }

    /// Union of the unthrottling events referenced by any installed policy.
    pub fn unthrottle_events(&self) -> HashSet<UnthrottleEvent> {
        self.carrier
            .values()
            .chain(self.defaults.values())
            .flatten()
            .flat_map(|policy| policy.unthrottling_events().iter().copied())
            .collect()
    }
}

fn best_match(policies: &[Arc<ErrorPolicy>], error: &TunnelError) -> Option<Arc<ErrorPolicy>> {
    let mut fallback: Option<&Arc<ErrorPolicy>> = None;
    for policy in policies {
        if !policy.matches(error) {
            continue;
        }
        if !policy.is_fallback() {
            return Some(Arc::clone(policy));
        }
        match fallback {
            None => fallback = Some(policy),
            // A generic fallback knows the error class, prefer it over a
            // bare catch-all.
            Some(prev)
                if prev.error_type() == PolicyType::Fallback
                    && policy.error_type() == PolicyType::Generic =>
            {
                fallback = Some(policy)
            }
            Some(_) => {}
        }
    }
    fallback.map(Arc::clone)
}
