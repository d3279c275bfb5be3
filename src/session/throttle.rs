//! Pairing attempt throttle.

/// Decides when a session has used up its QR pairing attempts.
///
/// The threshold is the number of QR codes a session may issue; the
/// `threshold + 1`-th code ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingThrottle {
    threshold: u32,
}

impl PairingThrottle {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    /// Configured maximum number of QR codes.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether pairing may continue after `attempt_count` QR codes.
    pub fn should_continue(&self, attempt_count: u32) -> bool {
        attempt_count <= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_threshold() {
        let throttle = PairingThrottle::new(3);
        assert!(throttle.should_continue(0));
        assert!(throttle.should_continue(1));
        assert!(throttle.should_continue(3));
    }

    #[test]
    fn test_exceeding_threshold() {
        let throttle = PairingThrottle::new(3);
        assert!(!throttle.should_continue(4));
        assert!(!throttle.should_continue(u32::MAX));
    }

    #[test]
    fn test_zero_threshold_stops_on_first_code() {
        let throttle = PairingThrottle::new(0);
        assert!(throttle.should_continue(0));
        assert!(!throttle.should_continue(1));
    }
}
