//! TOML-based scenario configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline orbital profile. Load
/// from TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and global parameters.
    pub simulation: SimulationConfig,
    /// Orbital light/shadow cycle parameters.
    pub orbit: OrbitConfig,
    /// Electrical subsystem parameters.
    pub power: PowerConfig,
    /// Deposition stage parameters.
    pub deposition: StageConfig,
    /// Ion implantation stage parameters.
    pub implant: ImplantConfig,
    /// Crystal growth stage parameters.
    pub growth: StageConfig,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Total ticks to simulate (one tick = one minute; must be > 0).
    pub duration_ticks: u64,
    /// Master random seed for defect sampling.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration_ticks: 1440,
            seed: 42,
        }
    }
}

/// Orbital light/shadow cycle parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrbitConfig {
    /// Full orbit period in ticks (must be > 0).
    pub period_ticks: u64,
    /// Sunlit window at the start of each period (must be <= period).
    pub sunlight_ticks: u64,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            period_ticks: 90,
            sunlight_ticks: 45,
        }
    }
}

/// Electrical subsystem parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PowerConfig {
    /// Battery capacity in mWh.
    pub battery_capacity_mwh: u64,
    /// Initial battery charge in mWh (clamped to capacity at build time).
    pub battery_initial_mwh: u64,
    /// Solar array output during sunlight (W).
    pub solar_sunlight_w: u32,
    /// Solar array output during eclipse (W).
    pub solar_eclipse_w: u32,
    /// Hard cap on battery draw within a single tick (W).
    pub max_battery_draw_w: u32,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            battery_capacity_mwh: 250_000,
            battery_initial_mwh: 250_000,
            solar_sunlight_w: 300,
            solar_eclipse_w: 0,
            max_battery_draw_w: 300,
        }
    }
}

/// Parameters shared by the simple stages (deposition, crystal growth).
///
/// Deliberately not `#[serde(default)]`: deposition and growth carry
/// different baseline numbers, so a stage section in TOML must be given
/// in full. A missing section falls back to the scenario default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Power drawn per work tick (W).
    pub power_w: u32,
    /// Ticks of credited work needed to finish the phase.
    pub required_ticks: u32,
    /// Per-tick defect probability in [0, 1].
    pub defect_chance: f64,
}

impl Default for StageConfig {
    fn default() -> Self {
        // Deposition defaults; growth overrides via `growth_defaults`.
        Self {
            power_w: 300,
            required_ticks: 60,
            defect_chance: 0.010,
        }
    }
}

impl StageConfig {
    /// Crystal growth defaults: a long, simple consumer.
    pub fn growth_defaults() -> Self {
        Self {
            power_w: 250,
            required_ticks: 120,
            defect_chance: 0.025,
        }
    }
}

/// Ion implantation stage parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImplantConfig {
    /// Power drawn per work tick while running (W).
    pub power_w: u32,
    /// Ticks of credited work needed to finish the phase.
    pub required_ticks: u32,
    /// Per-tick defect probability in [0, 1].
    pub defect_chance: f64,
    /// Calibration ticks before a new job may run.
    pub calibration_ticks: u32,
    /// Power drawn per calibration tick (W).
    pub calibration_power_w: u32,
    /// Cooldown ticks after a completed phase.
    pub cooldown_ticks: u32,
}

impl Default for ImplantConfig {
    fn default() -> Self {
        Self {
            power_w: 200,
            required_ticks: 20,
            defect_chance: 0.001,
            calibration_ticks: 3,
            calibration_power_w: 100,
            cooldown_ticks: 5,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"orbit.sunlight_ticks"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::baseline()
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario (the default orbital profile).
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            orbit: OrbitConfig::default(),
            power: PowerConfig::default(),
            deposition: StageConfig::default(),
            implant: ImplantConfig::default(),
            growth: StageConfig::growth_defaults(),
        }
    }

    /// Returns the starved preset: no solar input and a small battery,
    /// for exercising exhaustion and interruption paths.
    pub fn starved() -> Self {
        Self {
            power: PowerConfig {
                battery_capacity_mwh: 1_000,
                battery_initial_mwh: 1_000,
                solar_sunlight_w: 0,
                solar_eclipse_w: 0,
                ..PowerConfig::default()
            },
            ..Self::baseline()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "starved"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "starved" => Ok(Self::starved()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "scenario".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.simulation.duration_ticks == 0 {
            errors.push(ConfigError {
                field: "simulation.duration_ticks".into(),
                message: "must be > 0".into(),
            });
        }

        let o = &self.orbit;
        if o.period_ticks == 0 {
            errors.push(ConfigError {
                field: "orbit.period_ticks".into(),
                message: "must be > 0".into(),
            });
        }
        if o.sunlight_ticks > o.period_ticks {
            errors.push(ConfigError {
                field: "orbit.sunlight_ticks".into(),
                message: "must be <= orbit.period_ticks".into(),
            });
        }

        let p = &self.power;
        if p.battery_initial_mwh > p.battery_capacity_mwh {
            errors.push(ConfigError {
                field: "power.battery_initial_mwh".into(),
                message: "must be <= power.battery_capacity_mwh".into(),
            });
        }

        for (name, stage) in [("deposition", &self.deposition), ("growth", &self.growth)] {
            errors.extend(validate_stage(name, stage));
        }

        let i = &self.implant;
        if i.required_ticks == 0 {
            errors.push(ConfigError {
                field: "implant.required_ticks".into(),
                message: "must be > 0".into(),
            });
        }
        if !(0.0..=1.0).contains(&i.defect_chance) {
            errors.push(ConfigError {
                field: "implant.defect_chance".into(),
                message: "must be in [0.0, 1.0]".into(),
            });
        }
        if i.calibration_ticks > i.required_ticks {
            errors.push(ConfigError {
                field: "implant.calibration_ticks".into(),
                message: "must be <= implant.required_ticks".into(),
            });
        }

        errors
    }
}

fn validate_stage(name: &str, stage: &StageConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    if stage.required_ticks == 0 {
        errors.push(ConfigError {
            field: format!("{name}.required_ticks"),
            message: "must be > 0".into(),
        });
    }
    if !(0.0..=1.0).contains(&stage.defect_chance) {
        errors.push(ConfigError {
            field: format!("{name}.defect_chance"),
            message: "must be in [0.0, 1.0]".into(),
        });
    }
    errors
}
