//! Shared electrical subsystem: solar generation, battery storage, and
//! the per-tick power bus.
//!
//! All accounting is integer watt-ticks. The bus budget for a tick is the
//! solar output plus a capped battery draw; successful reservations spend
//! solar before battery so that concurrent consumers see the same
//! aggregate outcome in any order.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::PowerConfig;
use crate::sim::orbit::OrbitPhase;

/// Typed failure for a reservation the bus cannot cover this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientPower {
    /// Watts the caller asked for.
    pub requested_w: u32,
    /// Watts still available on the bus.
    pub available_w: u32,
}

impl fmt::Display for InsufficientPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "insufficient power: requested {} W, {} W available",
            self.requested_w, self.available_w
        )
    }
}

impl std::error::Error for InsufficientPower {}

/// Consistent observer snapshot taken under the bus lock.
#[derive(Debug, Clone, Copy)]
pub struct PowerReading {
    /// Current battery charge (mWh).
    pub battery_mwh: u64,
    /// Watts still reservable this tick.
    pub budget_w: u32,
    /// Solar output published at the last refresh (W).
    pub produced_w: u32,
}

/// Solar generator, battery, and per-tick bus state.
///
/// `refresh` must run exactly once per tick before any module reserves;
/// `consume` is the atomic reserve-and-debit. Wrap in [`SharedPower`] for
/// cross-thread use.
#[derive(Debug)]
pub struct PowerSubsystem {
    capacity_mwh: u64,
    battery_mwh: u64,
    solar_sunlight_w: u32,
    solar_eclipse_w: u32,
    max_battery_draw_w: u32,

    // Per-tick scratch, rebuilt by refresh.
    produced_this_tick_w: u32,
    solar_remaining_w: u32,
    budget_this_tick_w: u32,

    // Refresh bookkeeping: pre-credit battery level for idempotent replay.
    last_tick: Option<u64>,
    battery_at_refresh: u64,
    consumed_this_tick_w: u32,
    consumed_total: u64,
}

impl PowerSubsystem {
    /// Builds the subsystem from scenario parameters. The initial charge
    /// is clamped to capacity.
    pub fn new(cfg: &PowerConfig) -> Self {
        Self {
            capacity_mwh: cfg.battery_capacity_mwh,
            battery_mwh: cfg.battery_initial_mwh.min(cfg.battery_capacity_mwh),
            solar_sunlight_w: cfg.solar_sunlight_w,
            solar_eclipse_w: cfg.solar_eclipse_w,
            max_battery_draw_w: cfg.max_battery_draw_w,
            produced_this_tick_w: 0,
            solar_remaining_w: 0,
            budget_this_tick_w: 0,
            last_tick: None,
            battery_at_refresh: 0,
            consumed_this_tick_w: 0,
            consumed_total: 0,
        }
    }

    /// Solar output for an orbit phase (W).
    pub fn generation(&self, phase: OrbitPhase) -> u32 {
        match phase {
            OrbitPhase::Sunlight => self.solar_sunlight_w,
            OrbitPhase::Eclipse => self.solar_eclipse_w,
        }
    }

    /// Opens the bus for tick `tick`: publishes solar output, credits the
    /// battery, and sets the reservable budget.
    ///
    /// Calling again for the same tick with nothing consumed replays the
    /// computation from the pre-credit battery level. Calling again after
    /// a reservation is a programmer error and is ignored.
    pub fn refresh(&mut self, tick: u64, phase: OrbitPhase) {
        if self.last_tick == Some(tick) {
            if self.consumed_this_tick_w > 0 {
                debug_assert!(false, "refresh called after consume within tick {tick}");
                return;
            }
            self.battery_mwh = self.battery_at_refresh;
        } else {
            self.battery_at_refresh = self.battery_mwh;
            self.last_tick = Some(tick);
            self.consumed_this_tick_w = 0;
        }

        let produced = self.generation(phase);
        self.produced_this_tick_w = produced;
        self.solar_remaining_w = produced;
        self.battery_mwh = (self.battery_mwh + u64::from(produced)).min(self.capacity_mwh);

        let draw_cap = self.battery_mwh.min(u64::from(self.max_battery_draw_w)) as u32;
        self.budget_this_tick_w = produced + draw_cap;
    }

    /// Whether a reservation of `watts` would fit the remaining budget.
    pub fn can_satisfy(&self, watts: u32) -> bool {
        watts <= self.budget_this_tick_w
    }

    /// Atomic reserve-and-debit of `watts` from this tick's budget.
    ///
    /// Solar is spent before battery. On failure the state is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientPower`] when the remaining budget cannot
    /// cover the request.
    pub fn consume(&mut self, watts: u32) -> Result<(), InsufficientPower> {
        if watts > self.budget_this_tick_w {
            return Err(InsufficientPower {
                requested_w: watts,
                available_w: self.budget_this_tick_w,
            });
        }

        self.budget_this_tick_w -= watts;
        let solar_part = watts.min(self.solar_remaining_w);
        self.solar_remaining_w -= solar_part;
        let battery_part = u64::from(watts - solar_part);
        debug_assert!(battery_part <= self.battery_mwh);
        self.battery_mwh = self.battery_mwh.saturating_sub(battery_part);

        self.consumed_this_tick_w += watts;
        self.consumed_total += u64::from(watts);
        Ok(())
    }

    /// Current battery charge (mWh).
    pub fn battery_mwh(&self) -> u64 {
        self.battery_mwh
    }

    /// Battery capacity (mWh).
    pub fn capacity_mwh(&self) -> u64 {
        self.capacity_mwh
    }

    /// Watts still reservable this tick.
    pub fn budget_this_tick_w(&self) -> u32 {
        self.budget_this_tick_w
    }

    /// Solar output published at the last refresh (W).
    pub fn produced_this_tick_w(&self) -> u32 {
        self.produced_this_tick_w
    }

    /// Cumulative watt-ticks consumed over the whole run.
    pub fn consumed_total(&self) -> u64 {
        self.consumed_total
    }
}

/// Cross-thread handle serializing all bus operations behind one lock.
///
/// Readers only ever observe values from completed mutations.
#[derive(Debug, Clone)]
pub struct SharedPower {
    inner: Arc<Mutex<PowerSubsystem>>,
}

impl SharedPower {
    pub fn new(cfg: &PowerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PowerSubsystem::new(cfg))),
        }
    }

    /// See [`PowerSubsystem::refresh`].
    pub fn refresh(&self, tick: u64, phase: OrbitPhase) {
        self.inner.lock().refresh(tick, phase);
    }

    /// See [`PowerSubsystem::can_satisfy`].
    pub fn can_satisfy(&self, watts: u32) -> bool {
        self.inner.lock().can_satisfy(watts)
    }

    /// See [`PowerSubsystem::consume`].
    pub fn consume(&self, watts: u32) -> Result<(), InsufficientPower> {
        self.inner.lock().consume(watts)
    }

    /// Consistent snapshot of battery, budget, and solar output.
    pub fn reading(&self) -> PowerReading {
        let bus = self.inner.lock();
        PowerReading {
            battery_mwh: bus.battery_mwh(),
            budget_w: bus.budget_this_tick_w(),
            produced_w: bus.produced_this_tick_w(),
        }
    }

    pub fn battery_mwh(&self) -> u64 {
        self.inner.lock().battery_mwh()
    }

    pub fn consumed_total(&self) -> u64 {
        self.inner.lock().consumed_total()
    }
}
