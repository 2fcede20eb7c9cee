//! Post-run aggregate report.

use std::fmt;

use crate::job::STAGE_COUNT;

/// Aggregate outcome of a complete simulation run.
///
/// Assembled by the supervisor after the workers have joined, so every
/// counter reflects final state.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Ticks actually simulated (may be fewer than the configured
    /// duration when all jobs finish early).
    pub ticks_run: u64,
    /// Jobs loaded into the pipeline.
    pub jobs_total: usize,
    /// Jobs that completed all three stages.
    pub jobs_completed: usize,
    /// Jobs short-circuited by a defect.
    pub jobs_defective: usize,
    /// Defects broken down by the stage that raised them.
    pub defects_by_stage: [usize; STAGE_COUNT],
    /// Total watt-ticks drawn from the bus over the run.
    pub energy_consumed: u64,
    /// Battery charge at shutdown (mWh).
    pub final_battery_mwh: u64,
    /// Telemetry rows appended (header excluded).
    pub telemetry_rows: u64,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Report ---")?;
        writeln!(f, "Ticks simulated:   {}", self.ticks_run)?;
        writeln!(
            f,
            "Jobs completed:    {} / {}",
            self.jobs_completed, self.jobs_total
        )?;
        writeln!(
            f,
            "Jobs defective:    {} (deposition {}, implant {}, growth {})",
            self.jobs_defective,
            self.defects_by_stage[0],
            self.defects_by_stage[1],
            self.defects_by_stage[2]
        )?;
        writeln!(f, "Energy consumed:   {} W-ticks", self.energy_consumed)?;
        writeln!(f, "Final battery:     {} mWh", self.final_battery_mwh)?;
        write!(f, "Telemetry rows:    {}", self.telemetry_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_does_not_panic() {
        let report = RunReport {
            ticks_run: 200,
            jobs_total: 4,
            jobs_completed: 3,
            jobs_defective: 1,
            defects_by_stage: [1, 0, 0],
            energy_consumed: 51_700,
            final_battery_mwh: 223_000,
            telemetry_rows: 204,
        };
        let text = format!("{report}");
        assert!(text.contains("Jobs completed:    3 / 4"));
        assert!(text.contains("deposition 1"));
    }
}
