use std::{collections::HashMap, fmt};

use types::TunnelError;

/// Distinct APNs tracked before the table resets.
const APN_COUNT_MAX: usize = 10;
/// Total reports tracked before the table resets.
const ERROR_COUNT_MAX: u64 = 1000;

/// Bounded in-memory error counters per (APN, error name).
///
/// The table exists for log dumps, not billing: when it outgrows its
/// bounds it resets wholesale rather than evicting piecemeal.
#[derive(Debug, Default)]
pub struct ErrorStats {
    counts: HashMap<String, HashMap<String, u64>>,
    total: u64,
}

impl ErrorStats {
    /// Records one reported error for `apn`.
    pub fn update(&mut self, apn: &str, error: &TunnelError) {
        if self.counts.len() > APN_COUNT_MAX || self.total > ERROR_COUNT_MAX {
            self.reset();
        }
        let count = self
            .counts
            .entry(apn.to_owned())
            .or_default()
            .entry(error.to_string())
            .or_insert(0);
        *count += 1;
        self.total += 1;
    }

    /// Count recorded for `(apn, error name)`.
    pub fn count(&self, apn: &str, error_name: &str) -> u64 {
        self.counts.get(apn).and_then(|by_error| by_error.get(error_name)).copied().unwrap_or(0)
    }

    /// Total reports recorded since the last reset.
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Drops every counter.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.total = 0;
    }
}

impl fmt::Display for ErrorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors", self.total)?;
        let mut apns: Vec<_> = self.counts.keys().collect();
        apns.sort();
        for apn in apns {
            let mut names: Vec<_> = self.counts[apn].iter().collect();
            names.sort();
            for (name, count) in names {
                write!(f, ", {apn}/{name}={count}")?;
            }
        }
        Ok(())
    }
}
