//! Crystal growth module (stage 2).

use rand::{SeedableRng, rngs::StdRng};

use crate::config::StageConfig;
use crate::job::{JobRef, Stage};
use crate::power::SharedPower;
use crate::sim::orbit::OrbitPhase;
use crate::telemetry::TelemetryWriter;

use super::queue::ModuleQueue;
use super::{
    FaultReason, ModuleState, ProcessModule, StageEvent, WorkTick, attempt_work_tick, emit_row,
};

/// Crystal growth is the long tail of the pipeline: 250 W per work tick
/// in the default profile, 120 ticks of furnace time, and the same
/// interrupt-creep semantics as deposition. No calibration, no cooldown.
pub struct CrystalGrowth {
    power_w: u32,
    queue: ModuleQueue,
    state: ModuleState,
    rng: StdRng,
}

impl CrystalGrowth {
    /// Creates the module with its own seeded defect RNG.
    pub fn new(cfg: &StageConfig, seed: u64) -> Self {
        Self {
            power_w: cfg.power_w,
            queue: ModuleQueue::new(),
            state: ModuleState::Idle,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl ProcessModule for CrystalGrowth {
    fn stage(&self) -> Stage {
        Stage::CrystalGrowth
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
        if matches!(self.state, ModuleState::Idle) {
            if let Some(job) = self.queue.pop() {
                self.state = ModuleState::Running { job };
            }
        }
        let ModuleState::Running { job } = &self.state else {
            return;
        };
        let job = job.clone();

        let (outcome, snapshot) = {
            let mut phase = job.phase(Stage::CrystalGrowth).lock();
            let outcome = attempt_work_tick(&mut phase, power, self.power_w, &mut self.rng);
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
            Stage::CrystalGrowth,
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
            WorkTick::Worked | WorkTick::Interrupted => ModuleState::Running { job },
            WorkTick::Finished | WorkTick::InterruptedFinished => ModuleState::Completed { job },
            WorkTick::Defected => ModuleState::Faulted {
                job,
                reason: FaultReason::DefectSample,
            },
        };
    }

    fn has_finished(&self) -> bool {
        matches!(
            self.state,
            ModuleState::Completed { .. } | ModuleState::Faulted { .. }
        )
    }

    fn take_finished(&mut self) -> Option<StageEvent> {
        match std::mem::replace(&mut self.state, ModuleState::Idle) {
            ModuleState::Completed { job } => Some(StageEvent::Completed(job)),
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
            ModuleState::Running { job }
            | ModuleState::Completed { job }
            | ModuleState::Faulted { job, .. } => job.id() == job_id,
            _ => false,
        };
        if drop_active {
            self.state = ModuleState::Idle;
        }
    }
}
