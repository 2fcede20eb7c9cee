//! Wafer jobs and their per-stage phase records.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::config::ScenarioConfig;

/// Number of manufacturing stages in the fixed pipeline.
pub const STAGE_COUNT: usize = 3;

/// Stage cursor value meaning the job has left the pipeline.
pub const STAGE_DONE: usize = 3;

/// Identity of one manufacturing stage, bound to a fixed phase index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Deposition,
    IonImplant,
    CrystalGrowth,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; STAGE_COUNT] = [Stage::Deposition, Stage::IonImplant, Stage::CrystalGrowth];

    /// Phase index this stage owns (0, 1, 2).
    pub fn index(self) -> usize {
        match self {
            Stage::Deposition => 0,
            Stage::IonImplant => 1,
            Stage::CrystalGrowth => 2,
        }
    }

    /// Stage for a phase index, if in range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Stable label used in telemetry and thread names.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Deposition => "deposition",
            Stage::IonImplant => "ion_implant",
            Stage::CrystalGrowth => "crystal_growth",
        }
    }

    /// The next stage in the pipeline, if any.
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }
}

/// Progress record for one phase of one job.
///
/// A phase record is written only by the module owning its stage index;
/// everyone else reads snapshots.
#[derive(Debug, Clone)]
pub struct PhaseState {
    /// Ticks of credited work needed to finish the phase.
    pub required_time: u32,
    /// Ticks credited so far (0 ..= required_time).
    pub elapsed_time: u32,
    /// Cumulative watt-ticks charged to this phase.
    pub energy_used: u64,
    /// Sticky: a tick failed to acquire power.
    pub was_interrupted: bool,
    /// Per-tick defect probability in [0, 1].
    pub defect_chance: f64,
    /// Sticky: the phase is poisoned.
    pub defective: bool,
}

impl PhaseState {
    /// Creates a fresh phase record.
    ///
    /// # Panics
    ///
    /// Panics if `required_time` is zero or `defect_chance` is outside [0, 1].
    pub fn new(required_time: u32, defect_chance: f64) -> Self {
        assert!(required_time > 0, "required_time must be > 0");
        assert!(
            (0.0..=1.0).contains(&defect_chance),
            "defect_chance must be in [0, 1]"
        );
        Self {
            required_time,
            elapsed_time: 0,
            energy_used: 0,
            was_interrupted: false,
            defect_chance,
            defective: false,
        }
    }

    /// Whether the phase has accumulated its required time.
    pub fn is_done(&self) -> bool {
        self.elapsed_time >= self.required_time
    }

    /// Ticks still outstanding.
    pub fn time_remaining(&self) -> u32 {
        self.required_time.saturating_sub(self.elapsed_time)
    }

    /// Credits one tick of wall-clock progress, saturating at the requirement.
    pub fn advance(&mut self) {
        self.elapsed_time = (self.elapsed_time + 1).min(self.required_time);
    }
}

/// A single wafer's lifecycle across all three stages.
///
/// Jobs live in the supervisor's arena and are shared by reference among
/// the modules. Each phase record sits behind its own lock, but only the
/// module owning that stage index ever mutates it; the stage cursor is
/// advanced solely by the supervisor.
#[derive(Debug)]
pub struct Job {
    id: String,
    phases: [Mutex<PhaseState>; STAGE_COUNT],
    current_stage: AtomicUsize,
}

/// Shared handle to a job in the arena.
pub type JobRef = Arc<Job>;

impl Job {
    /// Creates a job from explicit phase records.
    pub fn new(id: impl Into<String>, phases: [PhaseState; STAGE_COUNT]) -> JobRef {
        Arc::new(Self {
            id: id.into(),
            phases: phases.map(Mutex::new),
            current_stage: AtomicUsize::new(0),
        })
    }

    /// Creates a job with the scenario's per-stage durations and defect chances.
    pub fn from_scenario(id: impl Into<String>, cfg: &ScenarioConfig) -> JobRef {
        Self::new(
            id,
            [
                PhaseState::new(cfg.deposition.required_ticks, cfg.deposition.defect_chance),
                PhaseState::new(cfg.implant.required_ticks, cfg.implant.defect_chance),
                PhaseState::new(cfg.growth.required_ticks, cfg.growth.defect_chance),
            ],
        )
    }

    /// Stable job identifier (e.g. `T_1`).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lock guarding the phase record for `stage`.
    pub fn phase(&self, stage: Stage) -> &Mutex<PhaseState> {
        &self.phases[stage.index()]
    }

    /// Clones the current phase record for `stage`.
    pub fn phase_snapshot(&self, stage: Stage) -> PhaseState {
        self.phase(stage).lock().clone()
    }

    /// Current pipeline cursor: 0..=2 for the active stage, 3 when done.
    pub fn current_stage(&self) -> usize {
        self.current_stage.load(Ordering::Acquire)
    }

    /// Advances the cursor. Monotonic: a lower value never overwrites a
    /// higher one.
    pub fn advance_stage_to(&self, stage_index: usize) {
        debug_assert!(stage_index <= STAGE_DONE);
        self.current_stage.fetch_max(stage_index, Ordering::AcqRel);
    }

    /// Whether the job has left the pipeline (completed or short-circuited).
    pub fn is_finished(&self) -> bool {
        self.current_stage() >= STAGE_DONE
    }
}
