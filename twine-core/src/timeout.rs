//! Phase-timeout bookkeeping
//!
//! The engine arms one timer per waiting phase; the driver realizes it with
//! a real clock and feeds the expiry back as
//! [`BusEvent::TimerExpired`](twine_hal::BusEvent::TimerExpired). This
//! module only does the bookkeeping: which timer is armed, and whether an
//! expiry that arrives is current or stale.

use twine_hal::TimerId;

/// Tracks the single armed phase timer.
///
/// At most one timer exists at a time. Arming hands out a fresh
/// [`TimerId`]; cancel and expiry are matched against it, which makes an
/// expiry that raced a cancel recognizable as stale. An armed timer
/// therefore fires at most once, and a fired or canceled timer never fires
/// again.
#[derive(Debug, Default)]
pub struct TimeoutManager {
    next_id: u32,
    pending: Option<(TimerId, u32)>,
}

impl TimeoutManager {
    pub const fn new() -> Self {
        Self {
            next_id: 0,
            pending: None,
        }
    }

    /// Arms the phase timer with a budget in milliseconds.
    ///
    /// # Panics
    ///
    /// If a timer is already pending. Re-arming without a cancel is a bug
    /// in the caller.
    pub fn arm(&mut self, budget_ms: u32) -> TimerId {
        assert!(self.pending.is_none(), "timer already armed");
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.pending = Some((id, budget_ms));
        id
    }

    /// Cancels the pending timer if `id` matches it. Stale ids are ignored.
    pub fn cancel(&mut self, id: TimerId) {
        if let Some((armed, _)) = self.pending {
            if armed == id {
                self.pending = None;
            }
        }
    }

    /// The timer the driver must realize, if any: id and budget in
    /// milliseconds.
    pub fn pending(&self) -> Option<(TimerId, u32)> {
        self.pending
    }

    /// Consumes the pending timer when `id` matches it.
    ///
    /// Returns `false` for a stale id, so an expiry that lost a race
    /// against a cancel (or against a later re-arm) is a no-op.
    pub fn expire(&mut self, id: TimerId) -> bool {
        match self.pending {
            Some((armed, _)) if armed == id => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_exposes_pending_timer() {
        let mut timeouts = TimeoutManager::new();
        let id = timeouts.arm(25);
        assert_eq!(timeouts.pending(), Some((id, 25)));
    }

    #[test]
    fn test_expire_consumes_matching_id() {
        let mut timeouts = TimeoutManager::new();
        let id = timeouts.arm(25);
        assert!(timeouts.expire(id));
        assert_eq!(timeouts.pending(), None);
        // A second expiry of the same id is stale.
        assert!(!timeouts.expire(id));
    }

    #[test]
    fn test_cancel_then_expire_is_stale() {
        let mut timeouts = TimeoutManager::new();
        let id = timeouts.arm(25);
        timeouts.cancel(id);
        assert!(!timeouts.expire(id));
    }

    #[test]
    fn test_stale_cancel_leaves_new_timer_armed() {
        let mut timeouts = TimeoutManager::new();
        let old = timeouts.arm(25);
        timeouts.cancel(old);
        let new = timeouts.arm(10);
        timeouts.cancel(old);
        assert_eq!(timeouts.pending(), Some((new, 10)));
    }

    #[test]
    fn test_rearm_hands_out_fresh_id() {
        let mut timeouts = TimeoutManager::new();
        let first = timeouts.arm(25);
        timeouts.cancel(first);
        let second = timeouts.arm(25);
        assert_ne!(first, second);
        assert!(!timeouts.expire(first));
        assert!(timeouts.expire(second));
    }

    #[test]
    #[should_panic(expected = "timer already armed")]
    fn test_double_arm_panics() {
        let mut timeouts = TimeoutManager::new();
        let _ = timeouts.arm(25);
        let _ = timeouts.arm(25);
    }
}
