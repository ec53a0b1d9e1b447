//! Stall counters and the statistics collector stalls are exported
//! through.
//!
//! Stalls (queue-full, cache-miss-in-flight, downstream-busy) are not
//! errors per Section 7 of the spec: each stall site bumps a dedicated
//! counter local to the originating stage and retries next cycle. This
//! module is the local counter bag plus the per-stage export point; it
//! does not aggregate across stages (each stage owns one `StallCounters`)
//! and has no external metrics sink, per this repository's ambient-stack
//! decision to keep telemetry in-process.

use std::collections::HashMap;

/// Stall/degenerate-event counters local to one pipeline stage.
#[derive(Clone, Debug, Default)]
pub struct StallCounters {
    named: HashMap<&'static str, u64>,
}

impl StallCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps the counter named `reason` by one and logs at `trace` level.
    pub fn bump(&mut self, reason: &'static str) {
        *self.named.entry(reason).or_insert(0) += 1;
        log::trace!("stall: {reason}");
    }

    #[must_use]
    pub fn get(&self, reason: &str) -> u64 {
        self.named.get(reason).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&&'static str, &u64)> {
        self.named.iter()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.named.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_accumulates_per_reason() {
        let mut c = StallCounters::new();
        c.bump("queue-full");
        c.bump("queue-full");
        c.bump("cache-miss");
        assert_eq!(c.get("queue-full"), 2);
        assert_eq!(c.get("cache-miss"), 1);
        assert_eq!(c.total(), 3);
    }
}
