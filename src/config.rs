//! # Global runtime configuration.
//!
//! Provides [`SupervisorConfig`] centralized settings for the supervisor runtime.
//! Service definitions live in [`crate::services`]; this type only carries the
//! knobs that shape how the fleet is driven.

use std::time::Duration;

/// Global configuration for the supervisor runtime.
///
/// ## Field semantics
/// - `restart_delay`: pause before an auto-restarted service is relaunched
/// - `kill_grace`: time a cancelled command gets between `SIGTERM` and `SIGKILL`
/// - `grace`: how long `run` waits for tasks once termination has been requested
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Fixed delay before an auto-restart relaunch.
    ///
    /// Keeps a crashing service from spinning in a tight loop.
    pub restart_delay: Duration,

    /// Time between the polite and the forced kill of a cancelled command.
    pub kill_grace: Duration,

    /// Maximum time to wait for all tasks after termination was requested.
    ///
    /// When exceeded, `run` returns `RuntimeError::GraceExceeded`.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages
    /// skip older items.
    pub bus_capacity: usize,
}

impl SupervisorConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `restart_delay = 100ms`
    /// - `kill_grace = 5s`
    /// - `grace = 60s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_millis(100),
            kill_grace: Duration::from_secs(5),
            grace: Duration::from_secs(60),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_clamped() {
        let cfg = SupervisorConfig {
            bus_capacity: 0,
            ..SupervisorConfig::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
