//! Ion implantation module (stage 1).
//!
//! Implantation wraps its work ticks in two auxiliary sub-states: a
//! calibration pass before each new job and a cooldown window after each
//! completed one. Power loss is fatal here (an interrupted beam ruins
//! the dose profile), so any refused reservation poisons the phase.

use rand::{SeedableRng, rngs::StdRng};

use crate::config::ImplantConfig;
use crate::job::{JobRef, Stage};
use crate::power::SharedPower;
use crate::sim::orbit::OrbitPhase;
use crate::telemetry::TelemetryWriter;

use super::queue::ModuleQueue;
use super::{
    FaultReason, ModuleState, ProcessModule, StageEvent, WorkTick, attempt_work_tick, emit_row,
};

pub struct IonImplant {
    power_w: u32,
    calibration_ticks: u32,
    calibration_power_w: u32,
    cooldown_ticks: u32,
    queue: ModuleQueue,
    state: ModuleState,
    // Job whose completion started the current cooldown; telemetry keeps
    // attributing the unavailability window to it.
    last_finished: Option<JobRef>,
    rng: StdRng,
}

impl IonImplant {
    /// Creates the module with its own seeded defect RNG.
    pub fn new(cfg: &ImplantConfig, seed: u64) -> Self {
        Self {
            power_w: cfg.power_w,
            calibration_ticks: cfg.calibration_ticks,
            calibration_power_w: cfg.calibration_power_w,
            cooldown_ticks: cfg.cooldown_ticks,
            queue: ModuleQueue::new(),
            state: ModuleState::Idle,
            last_finished: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn calibration_tick(
        &mut self,
        job: JobRef,
        remaining: u32,
        minute: u64,
        orbit: OrbitPhase,
        power: &SharedPower,
        telemetry: &TelemetryWriter,
    ) {
        let consumed = power.consume(self.calibration_power_w);
        let snapshot = {
            let mut phase = job.phase(Stage::IonImplant).lock();
            match consumed {
                Ok(()) => {
                    phase.advance();
                    phase.energy_used += u64::from(self.calibration_power_w);
                }
                Err(_) => {
                    // Calibration interruption is fatal for the phase.
                    phase.was_interrupted = true;
                    phase.defective = true;
                }
            }
            phase.clone()
        };

        let (next, action): (ModuleState, &'static str) = match consumed {
            Ok(()) => {
                let remaining = remaining - 1;
                let next = if remaining == 0 {
                    ModuleState::Running { job: job.clone() }
                } else {
                    ModuleState::Calibrating {
                        job: job.clone(),
                        remaining,
                    }
                };
                (next, "calibrate")
            }
            Err(_) => (
                ModuleState::Faulted {
                    job: job.clone(),
                    reason: FaultReason::CalibrationPowerLoss,
                },
                "interrupted",
            ),
        };

        emit_row(
            telemetry,
            minute,
            Stage::IonImplant,
            job.id(),
            &snapshot,
            true,
            true,
            0,
            power,
            orbit,
            action,
        );
        self.state = next;
    }

    fn run_tick(
        &mut self,
        job: JobRef,
        minute: u64,
        orbit: OrbitPhase,
        power: &SharedPower,
        telemetry: &TelemetryWriter,
    ) {
        let (outcome, snapshot) = {
            let mut phase = job.phase(Stage::IonImplant).lock();
            let outcome = attempt_work_tick(&mut phase, power, self.power_w, &mut self.rng);
            // Unlike the simple stages, an outage mid-run poisons the dose.
            if matches!(
                outcome,
                WorkTick::Interrupted | WorkTick::InterruptedFinished
            ) {
                phase.defective = true;
            }
            (outcome, phase.clone())
        };

        let action = match outcome {
            WorkTick::Worked => "work",
            WorkTick::Finished => "complete",
            WorkTick::Defected => "defect",
            WorkTick::Interrupted | WorkTick::InterruptedFinished => "interrupted",
        };
        emit_row(
            telemetry,
            minute,
            Stage::IonImplant,
            job.id(),
            &snapshot,
            true,
            false,
            0,
            power,
            orbit,
            action,
        );

        self.state = match outcome {
            WorkTick::Worked => ModuleState::Running { job },
            WorkTick::Finished => ModuleState::Completed { job },
            WorkTick::Defected => ModuleState::Faulted {
                job,
                reason: FaultReason::DefectSample,
            },
            WorkTick::Interrupted | WorkTick::InterruptedFinished => ModuleState::Faulted {
                job,
                reason: FaultReason::RunPowerLoss,
            },
        };
    }
}

impl ProcessModule for IonImplant {
    fn stage(&self) -> Stage {
        Stage::IonImplant
    }

    fn enqueue(&mut self, job: JobRef) {
        self.queue.push(job);
    }

    fn tick(
        &mut self,
        minute: u64,
        orbit: OrbitPhase,
        power: &SharedPower,
        telemetry: &TelemetryWriter,
    ) {
        // Cooldown performs no work and blocks activation.
        if let ModuleState::CoolingDown { remaining } = &self.state {
            let remaining = *remaining - 1;
            self.state = if remaining == 0 {
                ModuleState::Idle
            } else {
                ModuleState::CoolingDown { remaining }
            };
            if let Some(job) = self.last_finished.clone() {
                let snapshot = job.phase_snapshot(Stage::IonImplant);
                emit_row(
                    telemetry,
                    minute,
                    Stage::IonImplant,
                    job.id(),
                    &snapshot,
                    false,
                    false,
                    remaining,
                    power,
                    orbit,
                    "cooldown",
                );
            }
            return;
        }

        if matches!(self.state, ModuleState::Idle) {
            if let Some(job) = self.queue.pop() {
                self.state = if self.calibration_ticks > 0 {
                    ModuleState::Calibrating {
                        job,
                        remaining: self.calibration_ticks,
                    }
                } else {
                    ModuleState::Running { job }
                };
            }
        }

        match &self.state {
            ModuleState::Calibrating { job, remaining } => {
                let (job, remaining) = (job.clone(), *remaining);
                self.calibration_tick(job, remaining, minute, orbit, power, telemetry);
            }
            ModuleState::Running { job } => {
                let job = job.clone();
                self.run_tick(job, minute, orbit, power, telemetry);
            }
            _ => {}
        }
    }

    fn has_finished(&self) -> bool {
        matches!(
            self.state,
            ModuleState::Completed { .. } | ModuleState::Faulted { .. }
        )
    }

    fn take_finished(&mut self) -> Option<StageEvent> {
        match std::mem::replace(&mut self.state, ModuleState::Idle) {
            ModuleState::Completed { job } => {
                if self.cooldown_ticks > 0 {
                    self.state = ModuleState::CoolingDown {
                        remaining: self.cooldown_ticks,
                    };
                    self.last_finished = Some(job.clone());
                }
                Some(StageEvent::Completed(job))
            }
            ModuleState::Faulted { job, reason } => Some(StageEvent::Faulted(job, reason)),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn discard(&mut self, job_id: &str) {
        self.queue.remove(job_id);
        let drop_active = match &self.state {
            ModuleState::Calibrating { job, .. }
            | ModuleState::Running { job }
            | ModuleState::Completed { job }
            | ModuleState::Faulted { job, .. } => job.id() == job_id,
            _ => false,
        };
        if drop_active {
            self.state = ModuleState::Idle;
        }
    }
}
