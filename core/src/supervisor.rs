//! Supervisor: watchdog feeding and the single fault latch
//! that gates solenoid power. Once latched there is no unlatch path short of
//! a reset — this is the system's one point of physical safety.

use crate::error::CoreError;

/// Which fatal condition tripped the latch, used to pick the fault LED code
/// for the fault LEDs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FaultKind {
    WatchdogTrip,
    StackOverflow,
    AllocFailure,
    AssertFailed,
}

impl FaultKind {
    /// `CoreError` → `FaultKind`, for the three runtime paths that latch
    /// (StackOverflow, AllocFailure, AssertFailed); returns
    /// `None` for every non-fatal error kind.
    pub fn from_error(err: CoreError) -> Option<Self> {
        match err {
            CoreError::StackOverflow => Some(FaultKind::StackOverflow),
            CoreError::AllocFailure => Some(FaultKind::AllocFailure),
            CoreError::AssertFailed => Some(FaultKind::AssertFailed),
            CoreError::WatchdogTrip => Some(FaultKind::WatchdogTrip),
            _ => None,
        }
    }

    /// Fault-LED `(red, green, blue)` code: assertion-family
    /// faults show `0b010` (green only); a watchdog trip shows red only.
    pub fn led_code(self) -> (bool, bool, bool) {
        match self {
            FaultKind::WatchdogTrip => (true, false, false),
            FaultKind::StackOverflow | FaultKind::AllocFailure | FaultKind::AssertFailed => {
                (false, true, false)
            }
        }
    }
}

/// Tracks the watchdog feed flag and the latched-fault state. `tick()` is
/// called once per main-loop iteration; `request_feed()` is called by every
/// task that completed its cycle successfully.
pub struct Supervisor {
    feed_requested: bool,
    tripped: bool,
    fault: Option<FaultKind>,
}

impl Supervisor {
    pub const fn new() -> Self {
        Supervisor {
            feed_requested: false,
            tripped: false,
            fault: None,
        }
    }

    pub fn is_latched(&self) -> bool {
        self.tripped
    }

    pub fn fault(&self) -> Option<FaultKind> {
        self.fault
    }

    /// Called by a task on completing its cycle without error.
    pub fn request_feed(&mut self) {
        self.feed_requested = true;
    }

    /// Latches a fatal fault: from now on `should_gate_solenoids()` returns
    /// `true` forever: after any AssertFailed / StackOverflow / AllocFailure,
    /// no further I2C write may set a non-zero output bit. Idempotent — the first fault wins.
    pub fn latch(&mut self, kind: FaultKind) {
        if self.tripped {
            return;
        }
        self.tripped = true;
        self.fault = Some(kind);
    }

    /// Models the watchdog ISR: on firing, either clears the
    /// hardware interrupt (feed was requested and we're not already
    /// tripped) or latches a `WatchdogTrip` fault. Returns `true` if the
    /// watchdog was serviced (caller should call `Hal::watchdog_kick`).
    pub fn on_watchdog_fire(&mut self) -> bool {
        if self.feed_requested && !self.tripped {
            self.feed_requested = false;
            true
        } else {
            self.latch(FaultKind::WatchdogTrip);
            false
        }
    }

    /// Solenoid power must be gated (set to `false`) whenever any fault is
    /// latched. Callers check this every cycle and before any
    /// `set_solenoid_master(true)`.
    pub fn should_gate_solenoids(&self) -> bool {
        self.tripped
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watchdog_services_when_feed_requested() {
        let mut sup = Supervisor::new();
        sup.request_feed();
        assert!(sup.on_watchdog_fire());
        assert!(!sup.is_latched());
    }

    #[test]
    fn watchdog_latches_when_feed_missing() {
        let mut sup = Supervisor::new();
        assert!(!sup.on_watchdog_fire());
        assert!(sup.is_latched());
        assert_eq!(sup.fault(), Some(FaultKind::WatchdogTrip));
    }

    #[test]
    fn first_fault_wins_and_is_permanent() {
        let mut sup = Supervisor::new();
        sup.latch(FaultKind::AssertFailed);
        sup.latch(FaultKind::StackOverflow);
        assert_eq!(sup.fault(), Some(FaultKind::AssertFailed));
        assert!(sup.should_gate_solenoids());
    }

    #[test]
    fn from_error_maps_only_fatal_kinds() {
        assert_eq!(FaultKind::from_error(CoreError::StackOverflow), Some(FaultKind::StackOverflow));
        assert_eq!(FaultKind::from_error(CoreError::BadCommand), None);
    }

    #[test]
    fn led_codes_are_correct() {
        assert_eq!(FaultKind::WatchdogTrip.led_code(), (true, false, false));
        assert_eq!(FaultKind::AssertFailed.led_code(), (false, true, false));
    }
}
