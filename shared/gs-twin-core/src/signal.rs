//! Signals: the only allowed cross-stage communication primitive.
//!
//! A [`Signal`] is a bounded delay buffer of values. It has a `bandwidth`
//! (max objects deliverable per cycle) and a `latency` (cycles between
//! send and earliest receive). A value written at cycle `c` becomes
//! readable at cycle `c + latency`; values written in the same cycle are
//! delivered in write order (FIFO).

use std::collections::VecDeque;

/// A value delayed until a specific delivery cycle.
struct Pending<T> {
    deliver_at: u64,
    value: T,
}

/// A bounded, latency-modeling channel between two pipeline stages.
///
/// `write` may be called at most `bandwidth` times per cycle; `read` may
/// succeed at most `bandwidth` times per cycle. Calling either beyond that
/// budget is a usage bug in the calling stage and panics in debug builds,
/// mirroring the "signalled as an assertion failure" contract used
/// throughout this pipeline's invariant checks.
pub struct Signal<T> {
    name: &'static str,
    bandwidth: u32,
    latency: u64,
    queue: VecDeque<Pending<T>>,
    default: Option<T>,
    writes_this_cycle: u64,
    write_cycle: u64,
    reads_this_cycle: u32,
    read_cycle: u64,
}

impl<T: Clone> Signal<T> {
    /// Creates a signal with the given bandwidth (objects/cycle) and
    /// latency (cycles from write to earliest read).
    #[must_use]
    pub fn new(name: &'static str, bandwidth: u32, latency: u64) -> Self {
        assert!(bandwidth > 0, "signal {name} must have nonzero bandwidth");
        Self {
            name,
            bandwidth,
            latency,
            queue: VecDeque::new(),
            default: None,
            writes_this_cycle: 0,
            write_cycle: 0,
            reads_this_cycle: 0,
            read_cycle: 0,
        }
    }

    /// Sets the value `read` returns when the signal is otherwise empty
    /// and no delivery is pending (used for "last fragment"/END sentinels
    /// that must flush even through idle stages).
    pub fn set_default(&mut self, value: T) {
        self.default = Some(value);
    }

    /// Writes `value` at `cycle`, optionally with extra latency beyond
    /// the signal's configured latency (used when a stage wants to delay
    /// a particular object further, e.g. the ROP's operation signal).
    ///
    /// # Panics
    /// Panics if more than `bandwidth` writes are attempted in one cycle.
    pub fn write(&mut self, cycle: u64, value: T, extra_latency: u64) {
        if cycle != self.write_cycle {
            self.write_cycle = cycle;
            self.writes_this_cycle = 0;
        }
        self.writes_this_cycle += 1;
        assert!(
            self.writes_this_cycle <= u64::from(self.bandwidth),
            "signal {} exceeded bandwidth {} writes in cycle {cycle}",
            self.name,
            self.bandwidth
        );
        self.queue.push_back(Pending {
            deliver_at: cycle + self.latency + extra_latency,
            value,
        });
    }

    /// Attempts to read one value visible at `cycle`. Returns `None`
    /// without consuming anything if the head of the queue is not yet
    /// deliverable, or falls back to the configured default value if the
    /// queue is empty and a default was set.
    ///
    /// # Panics
    /// Panics if more than `bandwidth` reads are attempted in one cycle.
    pub fn read(&mut self, cycle: u64) -> Option<T> {
        if cycle != self.read_cycle {
            self.read_cycle = cycle;
            self.reads_this_cycle = 0;
        }
        if self.reads_this_cycle >= self.bandwidth {
            return None;
        }
        match self.queue.front() {
            Some(p) if p.deliver_at <= cycle => {
                self.reads_this_cycle += 1;
                Some(self.queue.pop_front().expect("front just matched").value)
            }
            Some(_) => None,
            None => self.default.clone(),
        }
    }

    /// Number of objects currently buffered (delivered or not).
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Whether a value written this cycle could become visible to a
    /// reader at the same cycle (i.e. latency is zero). Used by the
    /// scheduler to validate "downstream reads of same-cycle writes are
    /// never observed" when stages are ticked in topological order.
    #[must_use]
    pub fn is_combinational(&self) -> bool {
        self.latency == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_after_latency() {
        let mut s = Signal::new("t", 1, 3);
        s.write(10, 42, 0);
        assert_eq!(s.read(10), None);
        assert_eq!(s.read(12), None);
        assert_eq!(s.read(13), Some(42));
    }

    #[test]
    fn fifo_ordering_same_cycle() {
        let mut s = Signal::new("t", 2, 1);
        s.write(0, 1, 0);
        s.write(0, 2, 0);
        assert_eq!(s.read(1), Some(1));
        assert_eq!(s.read(1), Some(2));
    }

    #[test]
    #[should_panic(expected = "exceeded bandwidth")]
    fn bandwidth_limits_writes_per_cycle() {
        let mut s = Signal::new("t", 1, 0);
        s.write(0, 1, 0);
        s.write(0, 2, 0);
    }

    #[test]
    fn default_value_used_when_empty() {
        let mut s = Signal::new("t", 1, 0);
        s.set_default(7);
        assert_eq!(s.read(0), Some(7));
    }

    #[test]
    fn unconsumed_read_does_not_advance_queue() {
        let mut s = Signal::new("t", 1, 5);
        s.write(0, 1, 0);
        assert_eq!(s.read(2), None);
        assert_eq!(s.read(5), Some(1));
    }
}
