use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Fault injection knobs for one simulated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum delivery delay in rounds, for fetch responses and push
    /// messages alike.
    pub max_delay_rounds: u8,
    /// Percentage chance of reversing the fetch responses ready in a round.
    pub reorder_rate_percent: u8,
    /// Percentage of push messages delivered twice.
    pub duplicate_rate_percent: u8,
    /// Percentage of fetches answered with a network error.
    pub fetch_failure_percent: u8,
    /// Percentage of local writes the server rejects.
    pub write_failure_percent: u8,
    /// Percentage chance per idle round that the push transport drops.
    pub disconnect_rate_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 3,
            reorder_rate_percent: 20,
            duplicate_rate_percent: 3,
            fetch_failure_percent: 5,
            write_failure_percent: 10,
            disconnect_rate_percent: 10,
        }
    }
}

impl FaultConfig {
    /// Draw a delay in `[0, max_delay_rounds]`.
    #[must_use]
    pub fn delay(&self, rng: &mut DeterministicRng) -> u64 {
        rng.next_bounded(u64::from(self.max_delay_rounds).saturating_add(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pending<T> {
    deliver_at_round: u64,
    item: T,
}

/// Result of delivering everything due in a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverOutcome<T> {
    pub delivered: Vec<T>,
    /// Whether delivery order differs from send order.
    pub reordered: bool,
}

/// Delayed delivery queue.
///
/// An ordered queue models one socket: a message is never due before the
/// one sent ahead of it, so delay never reorders. An unordered queue models
/// independent HTTP requests, whose responses may overtake each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayQueue<T> {
    pending: Vec<Pending<T>>,
    ordered: bool,
    last_due: u64,
}

impl<T> DelayQueue<T> {
    #[must_use]
    pub const fn ordered() -> Self {
        Self {
            pending: Vec::new(),
            ordered: true,
            last_due: 0,
        }
    }

    #[must_use]
    pub const fn unordered() -> Self {
        Self {
            pending: Vec::new(),
            ordered: false,
            last_due: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queue `item` for delivery `delay` rounds after `round`. Returns the
    /// round it becomes due.
    pub fn send(&mut self, item: T, round: u64, delay: u64) -> u64 {
        let mut due = round.saturating_add(delay);
        if self.ordered {
            due = due.max(self.last_due);
            self.last_due = due;
        }
        self.pending.push(Pending {
            deliver_at_round: due,
            item,
        });
        due
    }

    /// Take every item due at or before `round`, in send order unless an
    /// unordered queue rolls a reorder.
    pub fn deliver_ready(
        &mut self,
        round: u64,
        rng: &mut DeterministicRng,
        reorder_rate_percent: u8,
    ) -> DeliverOutcome<T> {
        let (mut ready, future): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| p.deliver_at_round <= round);
        self.pending = future;

        let reordered =
            !self.ordered && ready.len() > 1 && rng.hit_rate_percent(reorder_rate_percent);
        if reordered {
            ready.reverse();
        }

        DeliverOutcome {
            delivered: ready.into_iter().map(|p| p.item).collect(),
            reordered,
        }
    }

    /// Take everything still queued, in send order.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.pending.drain(..).map(|p| p.item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_queue_never_overtakes() {
        let mut queue = DelayQueue::ordered();
        assert_eq!(queue.send("a", 0, 3), 3);
        // Would be due at 1, held behind "a".
        assert_eq!(queue.send("b", 0, 1), 3);

        let mut rng = DeterministicRng::new(0);
        assert!(queue.deliver_ready(2, &mut rng, 100).delivered.is_empty());
        let out = queue.deliver_ready(3, &mut rng, 100);
        assert_eq!(out.delivered, vec!["a", "b"]);
        assert!(!out.reordered);
    }

    #[test]
    fn unordered_queue_can_reverse_ready_items() {
        let mut queue = DelayQueue::unordered();
        queue.send(1, 0, 0);
        queue.send(2, 0, 0);

        let mut rng = DeterministicRng::new(0);
        let out = queue.deliver_ready(0, &mut rng, 100);
        assert_eq!(out.delivered, vec![2, 1]);
        assert!(out.reordered);
        assert!(queue.is_empty());
    }

    #[test]
    fn later_items_wait_for_their_round() {
        let mut queue = DelayQueue::unordered();
        queue.send('x', 5, 2);
        queue.send('y', 5, 0);

        let mut rng = DeterministicRng::new(3);
        assert_eq!(queue.deliver_ready(5, &mut rng, 0).delivered, vec!['y']);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain_all(), vec!['x']);
    }

    #[test]
    fn delay_stays_within_bound() {
        let faults = FaultConfig {
            max_delay_rounds: 2,
            ..FaultConfig::default()
        };
        let mut rng = DeterministicRng::new(11);
        assert!((0..200).all(|_| faults.delay(&mut rng) <= 2));
    }
}
