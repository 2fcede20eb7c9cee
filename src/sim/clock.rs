//! Mission clock: the bounded minute counter fused with the orbit
//! ephemeris.

use crate::config::{OrbitConfig, SimulationConfig};
use crate::sim::orbit::{OrbitOracle, OrbitPhase};

/// Drives simulated time for one mission.
///
/// Each `tick()` yields the next minute stamped with its orbit phase,
/// until the configured duration is exhausted. The supervisor feeds the
/// pair straight into the power refresh and the tick gate, so a minute
/// can never be released under the wrong illumination.
///
/// # Examples
///
/// ```
/// use fab_sim::config::{OrbitConfig, SimulationConfig};
/// use fab_sim::sim::clock::MissionClock;
/// use fab_sim::sim::orbit::OrbitPhase;
///
/// let simulation = SimulationConfig { duration_ticks: 2, seed: 0 };
/// let mut clock = MissionClock::new(&simulation, &OrbitConfig::default());
///
/// assert_eq!(clock.tick(), Some((0, OrbitPhase::Sunlight)));
/// assert_eq!(clock.tick(), Some((1, OrbitPhase::Sunlight)));
/// assert_eq!(clock.tick(), None);
/// ```
pub struct MissionClock {
    current: u64,
    total: u64,
    oracle: OrbitOracle,
}

impl MissionClock {
    /// Builds the clock for a mission duration and orbit profile.
    ///
    /// # Panics
    ///
    /// Panics if the orbit profile is malformed (see [`OrbitOracle::new`]).
    pub fn new(simulation: &SimulationConfig, orbit: &OrbitConfig) -> Self {
        Self {
            current: 0,
            total: simulation.duration_ticks,
            oracle: OrbitOracle::new(orbit),
        }
    }

    /// The ephemeris oracle, for workers that derive phase themselves.
    pub fn oracle(&self) -> OrbitOracle {
        self.oracle
    }

    /// Advances one minute.
    ///
    /// Returns the minute number and its illumination, or `None` once
    /// the mission duration is exhausted.
    pub fn tick(&mut self) -> Option<(u64, OrbitPhase)> {
        if self.current >= self.total {
            return None;
        }
        let minute = self.current;
        self.current += 1;
        Some((minute, self.oracle.phase(minute)))
    }

    /// Minutes already released.
    pub fn elapsed(&self) -> u64 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(duration: u64, period: u64, sunlight: u64) -> MissionClock {
        MissionClock::new(
            &SimulationConfig {
                duration_ticks: duration,
                seed: 0,
            },
            &OrbitConfig {
                period_ticks: period,
                sunlight_ticks: sunlight,
            },
        )
    }

    #[test]
    fn stamps_each_minute_with_its_phase() {
        // Period 2 with a 1-minute sunlit window alternates every tick.
        let mut clock = clock(4, 2, 1);
        let minutes: Vec<_> = std::iter::from_fn(|| clock.tick()).collect();
        assert_eq!(
            minutes,
            vec![
                (0, OrbitPhase::Sunlight),
                (1, OrbitPhase::Eclipse),
                (2, OrbitPhase::Sunlight),
                (3, OrbitPhase::Eclipse),
            ]
        );
        assert_eq!(clock.elapsed(), 4);
    }

    #[test]
    fn agrees_with_the_oracle_across_the_default_cycle() {
        let mut clock = clock(180, 90, 45);
        let oracle = clock.oracle();
        while let Some((minute, phase)) = clock.tick() {
            assert_eq!(phase, oracle.phase(minute), "minute {minute}");
        }
        // Spot-check the eclipse entry and the wrap back to sunlight.
        assert_eq!(oracle.phase(44), OrbitPhase::Sunlight);
        assert_eq!(oracle.phase(45), OrbitPhase::Eclipse);
        assert_eq!(oracle.phase(90), OrbitPhase::Sunlight);
    }

    #[test]
    fn exhausted_mission_yields_nothing() {
        let mut clock = clock(0, 90, 45);
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.elapsed(), 0);
    }

    #[test]
    fn elapsed_tracks_partial_progress() {
        let mut clock = clock(10, 90, 45);
        clock.tick();
        clock.tick();
        clock.tick();
        assert_eq!(clock.elapsed(), 3);
    }
}
