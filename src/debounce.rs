use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Generic trailing-edge debounce on logical time.
///
/// Scheduling a key that is already pending replaces its deadline and
/// payload, so only the last call within a window survives. There is no
/// timer thread: the owner passes `now` into [`schedule`](Self::schedule)
/// and drains elapsed entries with [`fire_due`](Self::fire_due), which keeps
/// the whole thing deterministic under test.
#[derive(Debug, Clone)]
pub struct DebounceGate<K, P> {
    pending: HashMap<K, PendingEntry<P>>,
}

#[derive(Debug, Clone)]
struct PendingEntry<P> {
    deadline: Instant,
    payload: P,
}

impl<K, P> Default for DebounceGate<K, P> {
    fn default() -> Self {
        DebounceGate {
            pending: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, P> DebounceGate<K, P> {
    pub fn new() -> Self {
        DebounceGate::default()
    }

    /// Arm (or re-arm) `key` to fire `payload` once `delay` has elapsed.
    pub fn schedule(&mut self, key: K, payload: P, delay: Duration, now: Instant) {
        self.pending.insert(
            key,
            PendingEntry {
                deadline: now + delay,
                payload,
            },
        );
    }

    /// Remove and return every entry whose deadline has elapsed, earliest
    /// deadline first.
    pub fn fire_due(&mut self, now: Instant) -> Vec<(K, P)> {
        let mut due: Vec<(Instant, K)> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(key, entry)| (entry.deadline, key.clone()))
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);

        due.into_iter()
            .filter_map(|(_, key)| {
                self.pending
                    .remove(&key)
                    .map(|entry| (key, entry.payload))
            })
            .collect()
    }

    /// Drop a single pending entry. Returns whether one was armed.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Teardown: drop everything. Nothing scheduled before this call will
    /// ever fire.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(300);

    #[test]
    fn rapid_rescheduling_coalesces_to_the_last_payload() {
        let mut gate: DebounceGate<&str, u32> = DebounceGate::new();
        let t0 = Instant::now();
        gate.schedule("search", 1, DELAY, t0);
        gate.schedule("search", 2, DELAY, t0 + Duration::from_millis(20));
        gate.schedule("search", 3, DELAY, t0 + Duration::from_millis(50));

        // Not yet: the window restarted at t0+50ms.
        assert!(gate.fire_due(t0 + Duration::from_millis(320)).is_empty());

        let fired = gate.fire_due(t0 + Duration::from_millis(350));
        assert_eq!(fired, vec![("search", 3)]);
        assert!(gate.is_empty());
    }

    #[test]
    fn entries_fire_at_most_once() {
        let mut gate: DebounceGate<&str, u32> = DebounceGate::new();
        let t0 = Instant::now();
        gate.schedule("url", 7, DELAY, t0);
        assert_eq!(gate.fire_due(t0 + DELAY).len(), 1);
        assert!(gate.fire_due(t0 + DELAY * 2).is_empty());
    }

    #[test]
    fn keys_are_independent() {
        let mut gate: DebounceGate<&str, u32> = DebounceGate::new();
        let t0 = Instant::now();
        gate.schedule("a", 1, Duration::from_millis(100), t0);
        gate.schedule("b", 2, Duration::from_millis(200), t0);

        let fired = gate.fire_due(t0 + Duration::from_millis(150));
        assert_eq!(fired, vec![("a", 1)]);
        assert!(gate.is_pending(&"b"));
    }

    #[test]
    fn due_entries_come_out_in_deadline_order() {
        let mut gate: DebounceGate<&str, u32> = DebounceGate::new();
        let t0 = Instant::now();
        gate.schedule("late", 2, Duration::from_millis(200), t0);
        gate.schedule("early", 1, Duration::from_millis(100), t0);

        let fired = gate.fire_due(t0 + Duration::from_millis(300));
        assert_eq!(fired, vec![("early", 1), ("late", 2)]);
    }

    #[test]
    fn cancel_all_prevents_every_pending_fire() {
        let mut gate: DebounceGate<&str, u32> = DebounceGate::new();
        let t0 = Instant::now();
        gate.schedule("a", 1, DELAY, t0);
        gate.schedule("b", 2, DELAY, t0);
        gate.cancel_all();
        assert!(gate.fire_due(t0 + DELAY * 10).is_empty());
    }

    #[test]
    fn cancel_reports_whether_anything_was_armed() {
        let mut gate: DebounceGate<&str, u32> = DebounceGate::new();
        let t0 = Instant::now();
        gate.schedule("a", 1, DELAY, t0);
        assert!(gate.cancel(&"a"));
        assert!(!gate.cancel(&"a"));
    }
}
