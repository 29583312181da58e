//! Observer tracking
//!
//! The engine may move the observer any number of times between ticks; only
//! the latest position is committed when a tick runs.

use glam::DVec3;

/// Staged and committed observer positions
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ObserverState {
    staged: DVec3,
    current: DVec3,
    previous: DVec3,
    committed: bool,
}

impl ObserverState {
    pub fn new(position: DVec3) -> Self {
        Self {
            staged: position,
            current: position,
            previous: position,
            committed: false,
        }
    }

    /// Stage a new position for the next tick
    pub fn set_position(&mut self, position: DVec3) {
        self.staged = position;
    }

    /// Promote the staged position; the first commit has no previous position
    pub fn commit(&mut self) {
        if self.committed {
            self.previous = self.current;
        } else {
            self.previous = self.staged;
            self.committed = true;
        }
        self.current = self.staged;
    }

    /// Position as of the last tick
    pub fn current(&self) -> DVec3 {
        self.current
    }

    /// Movement between the last two ticks
    pub fn displacement(&self) -> DVec3 {
        self.current - self.previous
    }

    /// Unit travel direction, `None` when stationary
    pub fn direction(&self) -> Option<DVec3> {
        let d = self.displacement();
        if d.length_squared() > 0.0 {
            Some(d.normalize())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_commit_has_no_direction() {
        let mut observer = ObserverState::default();
        observer.set_position(DVec3::new(5000.0, 0.0, 0.0));
        observer.commit();

        assert_eq!(observer.current(), DVec3::new(5000.0, 0.0, 0.0));
        assert_eq!(observer.direction(), None);
    }

    #[test]
    fn test_only_latest_staged_position_counts() {
        let mut observer = ObserverState::new(DVec3::ZERO);
        observer.commit();

        observer.set_position(DVec3::new(0.0, 50.0, 0.0));
        observer.set_position(DVec3::new(0.0, 0.0, 100.0));
        assert_eq!(observer.current(), DVec3::ZERO);

        observer.commit();
        assert_eq!(observer.displacement(), DVec3::new(0.0, 0.0, 100.0));
        assert_eq!(observer.direction(), Some(DVec3::Z));
    }

    #[test]
    fn test_stationary_tick_clears_direction() {
        let mut observer = ObserverState::new(DVec3::ZERO);
        observer.commit();
        observer.set_position(DVec3::X * 10.0);
        observer.commit();
        assert!(observer.direction().is_some());

        observer.commit();
        assert_eq!(observer.direction(), None);
    }
}
