/// Trailing-edge write coalescer.
///
/// Every [`request`](SaveDebouncer::request) pushes the deadline out to
/// `now + quiet`; the write happens once a poll observes the deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveDebouncer {
    quiet_ms: i64,
    deadline: Option<i64>,
}

impl SaveDebouncer {
    #[must_use]
    pub fn new(quiet_ms: u64) -> Self {
        Self {
            quiet_ms: i64::try_from(quiet_ms).unwrap_or(i64::MAX),
            deadline: None,
        }
    }

    pub const fn request(&mut self, now_ms: i64) {
        self.deadline = Some(now_ms.saturating_add(self.quiet_ms));
    }

    /// Consume the pending write if its quiet window has elapsed.
    pub fn take_due(&mut self, now_ms: i64) -> bool {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub const fn cancel(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<i64> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bursts_coalesce_into_one_trailing_write() {
        let mut debounce = SaveDebouncer::new(1_500);
        for t in [0, 400, 800, 1_200] {
            debounce.request(t);
            assert!(!debounce.take_due(t));
        }
        assert!(!debounce.take_due(2_600));
        assert!(debounce.take_due(2_700));
        assert!(!debounce.take_due(5_000));
    }

    #[test]
    fn cancel_drops_pending_write() {
        let mut debounce = SaveDebouncer::new(10);
        debounce.request(0);
        debounce.cancel();
        assert!(!debounce.is_pending());
        assert!(!debounce.take_due(100));
    }
}
