//! Thin-film deposition module (stage 0).

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

/// Deposition draws 300 W per work tick in the default profile, with no
/// calibration and no cooldown. A refused reservation marks the phase
/// interrupted but still creeps `elapsed_time` forward.
pub struct Deposition {
    power_w: u32,
    queue: ModuleQueue,
    state: ModuleState,
    rng: StdRng,
}

impl Deposition {
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

impl ProcessModule for Deposition {
    fn stage(&self) -> Stage {
        Stage::Deposition
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
            let mut phase = job.phase(Stage::Deposition).lock();
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
            Stage::Deposition,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, PhaseState};
    use crate::process::test_support::{ample_power, dead_power, null_telemetry};

    fn module(power_w: u32) -> Deposition {
        Deposition::new(
            &StageConfig {
                power_w,
                required_ticks: 60,
                defect_chance: 0.010,
            },
            7,
        )
    }

    fn job(required: u32, defect_chance: f64) -> JobRef {
        Job::new(
            "T_1",
            [
                PhaseState::new(required, defect_chance),
                PhaseState::new(20, 0.0),
                PhaseState::new(120, 0.0),
            ],
        )
    }

    #[test]
    fn idle_module_with_empty_queue_emits_nothing() {
        let mut dep = module(300);
        let power = ample_power();
        let telemetry = null_telemetry();
        power.refresh(0, OrbitPhase::Sunlight);
        dep.tick(0, OrbitPhase::Sunlight, &power, &telemetry);
        assert_eq!(telemetry.rows_written(), 0);
        assert!(!dep.has_finished());
    }

    #[test]
    fn work_ticks_accumulate_and_complete() {
        let mut dep = module(300);
        let power = ample_power();
        let telemetry = null_telemetry();
        let job = job(3, 0.0);
        dep.enqueue(job.clone());

        for t in 0..3 {
            power.refresh(t, OrbitPhase::Sunlight);
            dep.tick(t, OrbitPhase::Sunlight, &power, &telemetry);
        }

        let phase = job.phase_snapshot(Stage::Deposition);
        assert_eq!(phase.elapsed_time, 3);
        assert_eq!(phase.energy_used, 900);
        assert!(!phase.was_interrupted);
        assert!(!phase.defective);
        assert_eq!(telemetry.rows_written(), 3);

        assert!(dep.has_finished());
        let event = dep.take_finished();
        assert!(matches!(event, Some(StageEvent::Completed(_))));
        assert!(!dep.has_finished());
    }

    #[test]
    fn certain_defect_faults_on_first_tick() {
        let mut dep = module(300);
        let power = ample_power();
        let telemetry = null_telemetry();
        let job = job(60, 1.0);
        dep.enqueue(job.clone());

        power.refresh(0, OrbitPhase::Sunlight);
        dep.tick(0, OrbitPhase::Sunlight, &power, &telemetry);

        let phase = job.phase_snapshot(Stage::Deposition);
        assert!(phase.defective);
        assert_eq!(phase.elapsed_time, 1);
        assert!(matches!(
            dep.take_finished(),
            Some(StageEvent::Faulted(_, FaultReason::DefectSample))
        ));
    }

    #[test]
    fn outage_interrupts_but_elapsed_creeps() {
        let mut dep = module(300);
        let power = dead_power();
        let telemetry = null_telemetry();
        let job = job(2, 0.0);
        dep.enqueue(job.clone());

        power.refresh(0, OrbitPhase::Eclipse);
        dep.tick(0, OrbitPhase::Eclipse, &power, &telemetry);

        let phase = job.phase_snapshot(Stage::Deposition);
        assert!(phase.was_interrupted);
        assert!(!phase.defective);
        assert_eq!(phase.elapsed_time, 1);
        assert_eq!(phase.energy_used, 0);
        assert!(!dep.has_finished());

        // The creep eventually completes the phase with no energy spent.
        power.refresh(1, OrbitPhase::Eclipse);
        dep.tick(1, OrbitPhase::Eclipse, &power, &telemetry);
        assert!(matches!(dep.take_finished(), Some(StageEvent::Completed(_))));
        assert_eq!(job.phase_snapshot(Stage::Deposition).energy_used, 0);
    }

    #[test]
    fn discard_removes_queued_and_active_jobs() {
        let mut dep = module(300);
        let power = ample_power();
        let telemetry = null_telemetry();
        let first = job(60, 0.0);
        let second = Job::new(
            "T_2",
            [
                PhaseState::new(60, 0.0),
                PhaseState::new(20, 0.0),
                PhaseState::new(120, 0.0),
            ],
        );
        dep.enqueue(first.clone());
        dep.enqueue(second.clone());

        power.refresh(0, OrbitPhase::Sunlight);
        dep.tick(0, OrbitPhase::Sunlight, &power, &telemetry);

        // T_1 is active, T_2 queued.
        dep.discard("T_2");
        dep.discard("T_1");
        assert!(matches!(dep.state, ModuleState::Idle));

        // Nothing left to run.
        power.refresh(1, OrbitPhase::Sunlight);
        dep.tick(1, OrbitPhase::Sunlight, &power, &telemetry);
        assert_eq!(telemetry.rows_written(), 1);
    }
}
