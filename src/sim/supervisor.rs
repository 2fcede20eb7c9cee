//! Supervisor: owns the job arena, wires the subsystems, drives the
//! per-tick protocol, and terminates cleanly.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};

use crate::config::ScenarioConfig;
use crate::job::{Job, JobRef, STAGE_COUNT, STAGE_DONE, Stage};
use crate::power::SharedPower;
use crate::process::{CrystalGrowth, Deposition, IonImplant, ProcessModule, StageEvent};
use crate::sim::clock::MissionClock;
use crate::sim::harness::{ModuleCommand, TickGate, WORKER_COUNT, spawn_worker};
use crate::sim::report::RunReport;
use crate::telemetry::TelemetryWriter;

/// Seed offsets keeping per-module defect streams decorrelated.
const DEPOSITION_SEED_OFFSET: u64 = 1;
const IMPLANT_SEED_OFFSET: u64 = 2;
const GROWTH_SEED_OFFSET: u64 = 3;

/// Harness failure: a worker vanished or could not be spawned.
#[derive(Debug)]
pub struct HarnessError {
    pub message: String,
}

impl HarnessError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "harness error: {}", self.message)
    }
}

impl std::error::Error for HarnessError {}

/// Per-run bookkeeping folded from worker reports.
#[derive(Debug, Default)]
struct RunCounters {
    completed: usize,
    defective: usize,
    defects_by_stage: [usize; STAGE_COUNT],
    finished: usize,
}

/// Owns the jobs, constructs the modules, spawns the workers, and drives
/// the main loop until the duration is exhausted or every job has left
/// the pipeline.
pub struct Supervisor {
    scenario: ScenarioConfig,
    jobs: Vec<JobRef>,
    telemetry: Arc<TelemetryWriter>,
}

impl Supervisor {
    /// Builds the job arena from loaded ids and takes ownership of the
    /// telemetry sink.
    pub fn new(scenario: ScenarioConfig, job_ids: &[String], telemetry: TelemetryWriter) -> Self {
        let jobs = job_ids
            .iter()
            .map(|id| Job::from_scenario(id.as_str(), &scenario))
            .collect();
        Self {
            scenario,
            jobs,
            telemetry: Arc::new(telemetry),
        }
    }

    /// Shared handles into the job arena (primarily for inspection after
    /// a run).
    pub fn jobs(&self) -> &[JobRef] {
        &self.jobs
    }

    /// Runs the simulation to completion and returns the aggregate
    /// report. The telemetry sink is flushed before returning.
    ///
    /// # Errors
    ///
    /// Returns a [`HarnessError`] if a worker thread cannot be spawned or
    /// disconnects mid-run.
    pub fn run(&mut self) -> Result<RunReport, HarnessError> {
        let seed = self.scenario.simulation.seed;
        let mut clock = MissionClock::new(&self.scenario.simulation, &self.scenario.orbit);
        let oracle = clock.oracle();
        let power = SharedPower::new(&self.scenario.power);
        let gate = Arc::new(TickGate::new());

        let mut deposition = Deposition::new(
            &self.scenario.deposition,
            seed.wrapping_add(DEPOSITION_SEED_OFFSET),
        );
        let implant = IonImplant::new(
            &self.scenario.implant,
            seed.wrapping_add(IMPLANT_SEED_OFFSET),
        );
        let growth = CrystalGrowth::new(
            &self.scenario.growth,
            seed.wrapping_add(GROWTH_SEED_OFFSET),
        );

        // Every job enters the pipeline at deposition.
        for job in &self.jobs {
            deposition.enqueue(job.clone());
        }

        let (report_tx, report_rx) = mpsc::channel();
        let (dep_cmd_tx, dep_cmd_rx) = mpsc::channel();
        let (imp_cmd_tx, imp_cmd_rx) = mpsc::channel();
        let (gro_cmd_tx, gro_cmd_rx) = mpsc::channel();
        let command_txs: [Sender<ModuleCommand>; STAGE_COUNT] =
            [dep_cmd_tx, imp_cmd_tx, gro_cmd_tx];

        let spawn_failed = |e: std::io::Error| HarnessError::new(format!("spawn failed: {e}"));
        let handles = vec![
            spawn_worker(
                deposition,
                gate.clone(),
                oracle,
                power.clone(),
                self.telemetry.clone(),
                dep_cmd_rx,
                report_tx.clone(),
            )
            .map_err(spawn_failed)?,
            spawn_worker(
                implant,
                gate.clone(),
                oracle,
                power.clone(),
                self.telemetry.clone(),
                imp_cmd_rx,
                report_tx.clone(),
            )
            .map_err(spawn_failed)?,
            spawn_worker(
                growth,
                gate.clone(),
                oracle,
                power.clone(),
                self.telemetry.clone(),
                gro_cmd_rx,
                report_tx.clone(),
            )
            .map_err(spawn_failed)?,
        ];
        // Workers hold the only senders now, so a dead fleet surfaces as
        // a recv error instead of a hang.
        drop(report_tx);

        let mut counters = RunCounters::default();
        let run_result = loop {
            let Some((t, phase)) = clock.tick() else {
                break Ok(());
            };

            power.refresh(t, phase);
            gate.release(t);

            let mut tick_error = None;
            for _ in 0..WORKER_COUNT {
                match report_rx.recv() {
                    Ok(report) => {
                        debug_assert_eq!(report.minute, t);
                        if let Some(event) = report.event {
                            if let Err(e) =
                                handle_event(report.stage, event, &command_txs, &mut counters)
                            {
                                tick_error = Some(e);
                            }
                        }
                    }
                    Err(_) => {
                        tick_error =
                            Some(HarnessError::new("a module worker disconnected mid-run"));
                        break;
                    }
                }
            }
            if let Some(e) = tick_error {
                break Err(e);
            }

            if counters.finished == self.jobs.len() {
                break Ok(());
            }
        };

        gate.shut_down();
        for handle in handles {
            if handle.join().is_err() {
                eprintln!("supervisor: a module worker panicked during shutdown");
            }
        }
        if let Err(e) = self.telemetry.flush() {
            eprintln!("telemetry: flush failed: {e}");
        }
        run_result?;

        Ok(RunReport {
            ticks_run: clock.elapsed(),
            jobs_total: self.jobs.len(),
            jobs_completed: counters.completed,
            jobs_defective: counters.defective,
            defects_by_stage: counters.defects_by_stage,
            energy_consumed: power.consumed_total(),
            final_battery_mwh: power.battery_mwh(),
            telemetry_rows: self.telemetry.rows_written(),
        })
    }
}

/// Folds one finished-job event into job state and counters: completions
/// flow to the next stage's queue, defects short-circuit the job and
/// purge it from every later module.
fn handle_event(
    stage: Stage,
    event: StageEvent,
    command_txs: &[Sender<ModuleCommand>; STAGE_COUNT],
    counters: &mut RunCounters,
) -> Result<(), HarnessError> {
    match event {
        StageEvent::Completed(job) => {
            let next_index = stage.index() + 1;
            job.advance_stage_to(next_index);
            if next_index < STAGE_COUNT {
                command_txs[next_index]
                    .send(ModuleCommand::Enqueue(job))
                    .map_err(|_| HarnessError::new("a module worker disconnected mid-run"))?;
            } else {
                counters.completed += 1;
                counters.finished += 1;
            }
        }
        StageEvent::Faulted(job, _reason) => {
            counters.defective += 1;
            counters.defects_by_stage[stage.index()] += 1;
            counters.finished += 1;
            job.advance_stage_to(STAGE_DONE);
            for later in stage.index() + 1..STAGE_COUNT {
                command_txs[later]
                    .send(ModuleCommand::Discard(job.id().to_string()))
                    .map_err(|_| HarnessError::new("a module worker disconnected mid-run"))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryWriter;

    fn sink_telemetry() -> TelemetryWriter {
        TelemetryWriter::from_writer(Box::new(std::io::sink())).expect("sink writer")
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn zero_duration_run_terminates_immediately() {
        let mut scenario = ScenarioConfig::baseline();
        scenario.simulation.duration_ticks = 0;
        // validate() rejects this for the CLI, but the supervisor itself
        // must still wind down cleanly.
        let mut supervisor = Supervisor::new(scenario, &ids(&["T_1"]), sink_telemetry());
        let report = supervisor.run().expect("run");
        assert_eq!(report.ticks_run, 0);
        assert_eq!(report.jobs_completed, 0);
        assert_eq!(report.telemetry_rows, 0);
    }

    #[test]
    fn single_job_pipeline_completes_and_stops_early() {
        let mut scenario = ScenarioConfig::baseline();
        // Deterministic: no defects anywhere.
        scenario.deposition.defect_chance = 0.0;
        scenario.implant.defect_chance = 0.0;
        scenario.growth.defect_chance = 0.0;
        let mut supervisor = Supervisor::new(scenario, &ids(&["T_1"]), sink_telemetry());
        let report = supervisor.run().expect("run");

        // 60 deposition + 20 implant (3 calibration + 17 run) + 120 growth.
        assert_eq!(report.ticks_run, 200);
        assert_eq!(report.jobs_completed, 1);
        assert_eq!(report.jobs_defective, 0);

        let job = &supervisor.jobs()[0];
        assert!(job.is_finished());
        assert_eq!(job.phase_snapshot(Stage::Deposition).energy_used, 18_000);
        assert_eq!(job.phase_snapshot(Stage::IonImplant).energy_used, 3_700);
        assert_eq!(job.phase_snapshot(Stage::CrystalGrowth).energy_used, 30_000);
    }

    #[test]
    fn certain_deposition_defect_short_circuits_every_job() {
        let mut scenario = ScenarioConfig::baseline();
        scenario.deposition.defect_chance = 1.0;
        let names = ids(&["T_1", "T_2", "T_3"]);
        let mut supervisor = Supervisor::new(scenario, &names, sink_telemetry());
        let report = supervisor.run().expect("run");

        assert_eq!(report.jobs_defective, 3);
        assert_eq!(report.defects_by_stage, [3, 0, 0]);
        assert_eq!(report.jobs_completed, 0);
        // One deposition tick per job, one job active at a time.
        assert_eq!(report.ticks_run, 3);
        for job in supervisor.jobs() {
            assert!(job.is_finished());
            assert!(job.phase_snapshot(Stage::Deposition).defective);
            assert_eq!(job.phase_snapshot(Stage::IonImplant).elapsed_time, 0);
            assert_eq!(job.phase_snapshot(Stage::CrystalGrowth).elapsed_time, 0);
        }
    }
}
