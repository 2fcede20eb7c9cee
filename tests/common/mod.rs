//! Shared test fixtures for integration tests.
#![allow(dead_code)] // not every test binary uses every fixture

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use fab_sim::config::ScenarioConfig;
use fab_sim::job::JobRef;
use fab_sim::sim::report::RunReport;
use fab_sim::sim::supervisor::Supervisor;
use fab_sim::telemetry::TelemetryWriter;

// Telemetry column indices (schema v1).
pub const COL_MINUTE: usize = 0;
pub const COL_MODULE: usize = 1;
pub const COL_TASK_ID: usize = 2;
pub const COL_CALIBRATING: usize = 5;
pub const COL_ENERGY_USED: usize = 9;
pub const COL_BATTERY_LEVEL_WH: usize = 10;
pub const COL_POWER_AVAILABLE_W: usize = 11;
pub const COL_INTERRUPTED: usize = 12;
pub const COL_DEFECTIVE: usize = 13;
pub const COL_ACTION: usize = 15;

static NEXT_FILE: AtomicU64 = AtomicU64::new(0);

/// Unique temp path for a telemetry sink.
pub fn telemetry_path(tag: &str) -> PathBuf {
    let n = NEXT_FILE.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "fab-sim-test-{}-{tag}-{n}.csv",
        std::process::id()
    ))
}

/// Baseline scenario with every stochastic defect disabled.
pub fn deterministic_scenario() -> ScenarioConfig {
    let mut scenario = ScenarioConfig::baseline();
    scenario.deposition.defect_chance = 0.0;
    scenario.implant.defect_chance = 0.0;
    scenario.growth.defect_chance = 0.0;
    scenario
}

/// Complete outcome of one simulated run.
pub struct RunOutcome {
    pub report: RunReport,
    pub jobs: Vec<JobRef>,
    /// Telemetry data rows (header excluded), as parsed string fields.
    pub rows: Vec<Vec<String>>,
}

/// Runs a scenario to completion against a real CSV sink and reads the
/// telemetry back.
pub fn run_scenario(scenario: ScenarioConfig, job_ids: &[&str], tag: &str) -> RunOutcome {
    let path = telemetry_path(tag);
    let telemetry = TelemetryWriter::create(&path).expect("create telemetry sink");
    let ids: Vec<String> = job_ids.iter().map(|s| s.to_string()).collect();

    let mut supervisor = Supervisor::new(scenario, &ids, telemetry);
    let report = supervisor.run().expect("simulation run");
    let jobs = supervisor.jobs().to_vec();

    let mut rdr = csv::ReaderBuilder::new()
        .from_path(&path)
        .expect("open telemetry csv");
    let rows = rdr
        .records()
        .map(|record| {
            record
                .expect("telemetry row parses")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect();
    fs::remove_file(&path).ok();

    RunOutcome { report, jobs, rows }
}

/// Rows sorted by (minute, module) so runs with different thread
/// interleavings can be compared, with the two bus-observer columns
/// (battery level, remaining budget) stripped: those snapshots depend on
/// which module touched the bus first within a tick, and intra-tick
/// ordering is unspecified.
pub fn stable_rows(outcome: &RunOutcome) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = outcome
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|&(i, _)| i != COL_BATTERY_LEVEL_WH && i != COL_POWER_AVAILABLE_W)
                .map(|(_, field)| field.clone())
                .collect()
        })
        .collect();
    rows.sort_by_key(|row| {
        (
            row[COL_MINUTE].parse::<u64>().expect("minute parses"),
            row[COL_MODULE].clone(),
        )
    });
    rows
}
