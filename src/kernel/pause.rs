//! The V1 scheduler's global pause flag.
//!
//! Guarded by a reader-writer lock: workers read it once per poll iteration,
//! `Pause`/`Resume` write it. It is process-local, not shared across
//! instances — a fleet-wide pause is out of scope.

use std::sync::RwLock;

#[derive(Default)]
pub struct PauseFlag(RwLock<bool>);

impl PauseFlag {
    pub fn new() -> Self {
        Self(RwLock::new(false))
    }

    pub fn is_paused(&self) -> bool {
        *self.0.read().expect("pause flag lock poisoned")
    }

    pub fn pause(&self) {
        *self.0.write().expect("pause flag lock poisoned") = true;
    }

    pub fn resume(&self) {
        *self.0.write().expect("pause flag lock poisoned") = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unpaused() {
        assert!(!PauseFlag::new().is_paused());
    }

    #[test]
    fn pause_then_resume() {
        let flag = PauseFlag::new();
        flag.pause();
        assert!(flag.is_paused());
        flag.resume();
        assert!(!flag.is_paused());
    }
}
