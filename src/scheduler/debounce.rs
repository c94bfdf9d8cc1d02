use std::time::Duration;
use tokio::time::Instant;

/// Minimum spacing between accepted lookups
///
/// Every trigger path asks the gate before calling the lookup service, so no
/// combination of timers and events can hit it more often than
/// `min_interval`.
#[derive(Debug, Clone, Copy)]
pub struct DebounceGate;

impl DebounceGate {
    /// Reject iff `now - last_check <= min_interval`; the first check always passes
    pub fn accept(now: Instant, last_check: Option<Instant>, min_interval: Duration) -> bool {
        match last_check {
            None => true,
            Some(last) => now.saturating_duration_since(last) > min_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(4);

    #[test]
    fn test_first_check_accepted() {
        assert!(DebounceGate::accept(Instant::now(), None, MIN));
    }

    #[test]
    fn test_within_interval_rejected() {
        let t0 = Instant::now();
        for ms in [0, 1, 1_500, 3_999, 4_000] {
            let t1 = t0 + Duration::from_millis(ms);
            assert!(!DebounceGate::accept(t1, Some(t0), MIN), "{}ms should be rejected", ms);
        }
    }

    #[test]
    fn test_after_interval_accepted() {
        let t0 = Instant::now();
        assert!(DebounceGate::accept(t0 + Duration::from_millis(4_001), Some(t0), MIN));
        assert!(DebounceGate::accept(t0 + Duration::from_secs(600), Some(t0), MIN));
    }

    #[test]
    fn test_clock_before_last_check_rejected() {
        let t0 = Instant::now() + Duration::from_secs(10);
        assert!(!DebounceGate::accept(Instant::now(), Some(t0), MIN));
    }
}
