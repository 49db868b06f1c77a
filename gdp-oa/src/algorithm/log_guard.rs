//! Scoped log verbosity.

use log::LevelFilter;

/// Raises the global log level to `Info` for its lifetime when `tee` is set.
///
/// The previous maximum level is restored on drop, so an aborted solve
/// leaves the logger as it found it.
#[derive(Debug)]
pub struct LogLevelGuard {
    previous: Option<LevelFilter>,
}

impl LogLevelGuard {
    /// Raise the level if `tee` is set and it is currently below `Info`.
    pub fn new(tee: bool) -> Self {
        let current = log::max_level();
        if tee && current < LevelFilter::Info {
            log::set_max_level(LevelFilter::Info);
            return Self {
                previous: Some(current),
            };
        }
        Self { previous: None }
    }

    /// True if the guard changed the level.
    pub fn is_active(&self) -> bool {
        self.previous.is_some()
    }
}

impl Drop for LogLevelGuard {
    fn drop(&mut self) {
        if let Some(level) = self.previous.take() {
            log::set_max_level(level);
        }
    }
}
