//! Scripted fault injection.
//!
//! [`ScriptedFaults`] plugs into `Config::fault_injector` and fails chosen
//! crash points, either every time or a fixed number of times. It also
//! counts how often each point was reached.

use fount_core::{CoreResult, FaultInjector, FaultPoint};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Script {
    /// Remaining failures per point; `None` fails forever.
    armed: HashMap<FaultPoint, Option<usize>>,
    reached: HashMap<FaultPoint, usize>,
    triggered: HashMap<FaultPoint, usize>,
}

/// A fault injector driven by the test.
///
/// # Example
///
/// ```rust,ignore
/// let faults = ScriptedFaults::new();
/// let config = test_config().fault_injector(faults.injector());
/// faults.fail_times(FaultPoint::WalSync, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedFaults {
    script: Arc<Mutex<Script>>,
}

impl ScriptedFaults {
    /// Creates an injector with nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every check at `point` until disarmed.
    pub fn fail(&self, point: FaultPoint) {
        self.script.lock().armed.insert(point, None);
    }

    /// Fails the next `times` checks at `point`.
    pub fn fail_times(&self, point: FaultPoint, times: usize) {
        self.script.lock().armed.insert(point, Some(times));
    }

    /// Stops failing at `point`.
    pub fn disarm(&self, point: FaultPoint) {
        self.script.lock().armed.remove(&point);
    }

    /// Stops failing everywhere and clears counters.
    pub fn reset(&self) {
        *self.script.lock() = Script::default();
    }

    /// Number of times `point` was checked.
    pub fn reached(&self, point: FaultPoint) -> usize {
        self.script.lock().reached.get(&point).copied().unwrap_or(0)
    }

    /// Number of times `point` failed.
    pub fn triggered(&self, point: FaultPoint) -> usize {
        self.script.lock().triggered.get(&point).copied().unwrap_or(0)
    }

    /// Returns this injector as a config value.
    pub fn injector(&self) -> Arc<dyn FaultInjector> {
        Arc::new(self.clone())
    }
}

impl FaultInjector for ScriptedFaults {
    fn check(&self, point: FaultPoint) -> CoreResult<()> {
        let mut script = self.script.lock();
        *script.reached.entry(point).or_insert(0) += 1;

        let fire = match script.armed.get_mut(&point) {
            None => false,
            Some(None) => true,
            Some(Some(0)) => false,
            Some(Some(remaining)) => {
                *remaining -= 1;
                true
            }
        };
        if fire {
            *script.triggered.entry(point).or_insert(0) += 1;
            return Err(point.fault());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fount_core::CoreError;

    #[test]
    fn fails_a_fixed_number_of_times() {
        let faults = ScriptedFaults::new();
        faults.fail_times(FaultPoint::WalSync, 2);

        assert!(faults.check(FaultPoint::WalSync).is_err());
        assert!(faults.check(FaultPoint::WalSync).is_err());
        assert!(faults.check(FaultPoint::WalSync).is_ok());
        assert!(faults.check(FaultPoint::WalAppend).is_ok());

        assert_eq!(faults.reached(FaultPoint::WalSync), 3);
        assert_eq!(faults.triggered(FaultPoint::WalSync), 2);
    }

    #[test]
    fn fail_until_disarmed() {
        let faults = ScriptedFaults::new();
        faults.fail(FaultPoint::ManifestSave);
        for _ in 0..3 {
            let err = faults.check(FaultPoint::ManifestSave).unwrap_err();
            assert!(matches!(
                err,
                CoreError::InjectedFault {
                    point: "manifest_save"
                }
            ));
        }
        faults.disarm(FaultPoint::ManifestSave);
        assert!(faults.check(FaultPoint::ManifestSave).is_ok());
    }

    #[test]
    fn clones_share_the_script() {
        let faults = ScriptedFaults::new();
        let injector = faults.injector();
        faults.fail_times(FaultPoint::MemtableFlush, 1);
        assert!(injector.check(FaultPoint::MemtableFlush).is_err());
        assert_eq!(faults.triggered(FaultPoint::MemtableFlush), 1);
    }
}
