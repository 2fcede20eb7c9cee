//! Process modules: shared contract, tagged module state, and the common
//! work-tick helper.

pub mod deposition;
pub mod growth;
pub mod implant;
pub mod queue;

pub use deposition::Deposition;
pub use growth::CrystalGrowth;
pub use implant::IonImplant;

use rand::Rng;
use rand::rngs::StdRng;

use crate::job::{JobRef, PhaseState, Stage};
use crate::power::SharedPower;
use crate::sim::orbit::OrbitPhase;
use crate::telemetry::{TelemetryRow, TelemetryWriter};

/// Why a module abandoned a job's phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultReason {
    /// The stochastic per-tick defect sample fired.
    DefectSample,
    /// Power was lost during implant calibration.
    CalibrationPowerLoss,
    /// Power was lost during an implant run tick.
    RunPowerLoss,
}

/// Tagged operating state of one module.
///
/// `Completed` and `Faulted` are transient: a module ends a tick in one
/// of them and the harness collects the job via
/// [`ProcessModule::take_finished`] at the tick boundary.
#[derive(Debug)]
pub enum ModuleState {
    Idle,
    /// Implant only: pre-run calibration with the job attached.
    Calibrating { job: JobRef, remaining: u32 },
    Running { job: JobRef },
    /// Implant only: post-completion thermal relaxation; no job may start.
    CoolingDown { remaining: u32 },
    /// Finished phase awaiting supervisor handoff.
    Completed { job: JobRef },
    /// Poisoned phase awaiting supervisor handoff.
    Faulted { job: JobRef, reason: FaultReason },
}

/// Outcome a module hands to the supervisor at a tick boundary.
#[derive(Debug, Clone)]
pub enum StageEvent {
    Completed(JobRef),
    Faulted(JobRef, FaultReason),
}

/// Common contract the harness drives once per tick.
///
/// A module only ever touches the phase record whose index equals its
/// stage; jobs themselves are shared references into the supervisor's
/// arena.
pub trait ProcessModule {
    /// Stage identity; the only phase index this module may write.
    fn stage(&self) -> Stage;

    /// Appends a job to the module's FIFO.
    fn enqueue(&mut self, job: JobRef);

    /// Advances at most one unit of work and emits at most one telemetry
    /// row. Never blocks on external I/O beyond the telemetry append.
    fn tick(
        &mut self,
        minute: u64,
        orbit: OrbitPhase,
        power: &SharedPower,
        telemetry: &TelemetryWriter,
    );

    /// Whether a finished job is waiting for handoff.
    fn has_finished(&self) -> bool;

    /// Takes the finished job, if any, resetting the module for the next
    /// tick.
    fn take_finished(&mut self) -> Option<StageEvent>;

    /// Drops a job from the active slot or queue (used when an earlier
    /// stage poisoned it).
    fn discard(&mut self, job_id: &str);
}

/// Result of one attempted work tick on a running phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkTick {
    /// Power acquired, phase advanced, more to do.
    Worked,
    /// Power acquired and the phase reached its requirement.
    Finished,
    /// The defect sample fired; the phase is poisoned.
    Defected,
    /// Power refused; elapsed still creeps forward.
    Interrupted,
    /// Power refused and the creep reached the requirement.
    InterruptedFinished,
}

/// One work tick with the interrupt-creep semantics shared by the simple
/// stages: a refused reservation still advances `elapsed_time`, so a
/// starved phase eventually completes in wall-clock terms with
/// `energy_used` frozen.
pub(crate) fn attempt_work_tick(
    phase: &mut PhaseState,
    power: &SharedPower,
    watts: u32,
    rng: &mut StdRng,
) -> WorkTick {
    match power.consume(watts) {
        Ok(()) => {
            phase.advance();
            phase.energy_used += u64::from(watts);
            if rng.random::<f64>() < phase.defect_chance {
                phase.defective = true;
                WorkTick::Defected
            } else if phase.is_done() {
                WorkTick::Finished
            } else {
                WorkTick::Worked
            }
        }
        Err(_) => {
            phase.was_interrupted = true;
            phase.advance();
            if phase.is_done() {
                WorkTick::InterruptedFinished
            } else {
                WorkTick::Interrupted
            }
        }
    }
}

/// Builds and appends the telemetry row for one module action.
#[expect(clippy::too_many_arguments)]
pub(crate) fn emit_row(
    telemetry: &TelemetryWriter,
    minute: u64,
    stage: Stage,
    task_id: &str,
    phase: &PhaseState,
    active: bool,
    calibrating: bool,
    cooldown_remaining: u32,
    power: &SharedPower,
    orbit: OrbitPhase,
    action: &'static str,
) {
    let reading = power.reading();
    telemetry.write_row(&TelemetryRow {
        minute,
        module: stage.label(),
        task_id,
        phase_index: stage.index(),
        active,
        calibrating,
        cooldown_remaining,
        elapsed: phase.elapsed_time,
        required: phase.required_time,
        energy_used: phase.energy_used,
        battery_level_wh: reading.battery_mwh / 1000,
        power_available_w: reading.budget_w,
        interrupted: phase.was_interrupted,
        defective: phase.defective,
        orbit: orbit.label(),
        action,
    });
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::PowerConfig;
    use crate::telemetry::TelemetryWriter;

    /// Telemetry writer backed by a throwaway buffer.
    pub fn null_telemetry() -> TelemetryWriter {
        TelemetryWriter::from_writer(Box::new(std::io::sink())).expect("sink writer")
    }

    /// A bus with ample solar so every reservation succeeds.
    pub fn ample_power() -> SharedPower {
        SharedPower::new(&PowerConfig {
            battery_capacity_mwh: 1_000_000,
            battery_initial_mwh: 1_000_000,
            solar_sunlight_w: 10_000,
            solar_eclipse_w: 10_000,
            max_battery_draw_w: 10_000,
        })
    }

    /// A bus that can never satisfy any module.
    pub fn dead_power() -> SharedPower {
        SharedPower::new(&PowerConfig {
            battery_capacity_mwh: 0,
            battery_initial_mwh: 0,
            solar_sunlight_w: 0,
            solar_eclipse_w: 0,
            max_battery_draw_w: 0,
        })
    }
}
