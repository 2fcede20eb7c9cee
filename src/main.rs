//! fab-sim entry point — CLI wiring and scenario-driven supervisor construction.

use std::path::{Path, PathBuf};
use std::process;

use fab_sim::config::ScenarioConfig;
use fab_sim::io::jobs::load_job_ids;
use fab_sim::sim::supervisor::Supervisor;
use fab_sim::telemetry::TelemetryWriter;

/// Parsed CLI arguments for the `run` subcommand.
struct CliArgs {
    jobs: Option<PathBuf>,
    out: Option<PathBuf>,
    scenario_path: Option<PathBuf>,
    preset: Option<String>,
    seed: Option<u64>,
    duration: Option<u64>,
    orbit_period: Option<u64>,
    sunlight_window: Option<u64>,
    battery_capacity: Option<u64>,
    battery_initial: Option<u64>,
    solar_sunlight: Option<u32>,
    solar_eclipse: Option<u32>,
    max_battery_draw: Option<u32>,
    deposition_power: Option<u32>,
    implant_power: Option<u32>,
    growth_power: Option<u32>,
    calibration_ticks: Option<u32>,
    calibration_power: Option<u32>,
    cooldown_ticks: Option<u32>,
}

fn print_help() {
    eprintln!("fab-sim — orbital wafer fabrication platform simulator");
    eprintln!();
    eprintln!("Usage: fab-sim run --jobs <path> --out <path> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --jobs <path>               Job input file, one job id per line (required)");
    eprintln!("  --out <path>                Telemetry CSV output path (required)");
    eprintln!("  --scenario <path>           Load tunables from a TOML scenario file");
    eprintln!("  --preset <name>             Use a built-in preset (baseline, starved)");
    eprintln!("  --seed <u64>                Override the defect-sampling seed");
    eprintln!("  --duration <ticks>          Override simulation duration");
    eprintln!("  --orbit-period <ticks>      Override the orbit period");
    eprintln!("  --sunlight-window <ticks>   Override the sunlit window per orbit");
    eprintln!("  --battery-capacity <mWh>    Override battery capacity");
    eprintln!("  --battery-initial <mWh>     Override initial battery charge");
    eprintln!("  --solar-sunlight <W>        Override solar output in sunlight");
    eprintln!("  --solar-eclipse <W>         Override solar output in eclipse");
    eprintln!("  --max-battery-draw <W>      Override per-tick battery draw cap");
    eprintln!("  --deposition-power <W>      Override deposition work power");
    eprintln!("  --implant-power <W>         Override implant run power");
    eprintln!("  --growth-power <W>          Override crystal growth work power");
    eprintln!("  --calibration-ticks <n>     Override implant calibration length");
    eprintln!("  --calibration-power <W>     Override implant calibration power");
    eprintln!("  --cooldown-ticks <n>        Override implant cooldown length");
    eprintln!("  --help                      Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> &'a str {
    *i += 1;
    match args.get(*i) {
        Some(value) => value,
        None => {
            eprintln!("error: {flag} requires a value");
            process::exit(1);
        }
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("error: {flag} value \"{value}\" is not a valid number");
        process::exit(1);
    })
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("run") => {}
        Some("--help") | Some("-h") => {
            print_help();
            process::exit(0);
        }
        Some(other) => {
            eprintln!("error: unknown command \"{other}\"");
            print_help();
            process::exit(1);
        }
        None => {
            print_help();
            process::exit(1);
        }
    }

    let mut cli = CliArgs {
        jobs: None,
        out: None,
        scenario_path: None,
        preset: None,
        seed: None,
        duration: None,
        orbit_period: None,
        sunlight_window: None,
        battery_capacity: None,
        battery_initial: None,
        solar_sunlight: None,
        solar_eclipse: None,
        max_battery_draw: None,
        deposition_power: None,
        implant_power: None,
        growth_power: None,
        calibration_ticks: None,
        calibration_power: None,
        cooldown_ticks: None,
    };

    let mut i = 2;
    while i < args.len() {
        let flag = args[i].clone();
        match flag.as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--jobs" => cli.jobs = Some(PathBuf::from(next_value(&args, &mut i, &flag))),
            "--out" => cli.out = Some(PathBuf::from(next_value(&args, &mut i, &flag))),
            "--scenario" => {
                cli.scenario_path = Some(PathBuf::from(next_value(&args, &mut i, &flag)));
            }
            "--preset" => cli.preset = Some(next_value(&args, &mut i, &flag).to_string()),
            "--seed" => cli.seed = Some(parse_number(next_value(&args, &mut i, &flag), &flag)),
            "--duration" => {
                cli.duration = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--orbit-period" => {
                cli.orbit_period = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--sunlight-window" => {
                cli.sunlight_window = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--battery-capacity" => {
                cli.battery_capacity = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--battery-initial" => {
                cli.battery_initial = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--solar-sunlight" => {
                cli.solar_sunlight = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--solar-eclipse" => {
                cli.solar_eclipse = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--max-battery-draw" => {
                cli.max_battery_draw = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--deposition-power" => {
                cli.deposition_power = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--implant-power" => {
                cli.implant_power = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--growth-power" => {
                cli.growth_power = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--calibration-ticks" => {
                cli.calibration_ticks = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--calibration-power" => {
                cli.calibration_power = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            "--cooldown-ticks" => {
                cli.cooldown_ticks = Some(parse_number(next_value(&args, &mut i, &flag), &flag));
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    if cli.scenario_path.is_some() && cli.preset.is_some() {
        eprintln!("error: --scenario and --preset are mutually exclusive");
        process::exit(1);
    }

    cli
}

/// Applies CLI overrides on top of the loaded scenario.
fn apply_overrides(scenario: &mut ScenarioConfig, cli: &CliArgs) {
    if let Some(seed) = cli.seed {
        scenario.simulation.seed = seed;
    }
    if let Some(duration) = cli.duration {
        scenario.simulation.duration_ticks = duration;
    }
    if let Some(period) = cli.orbit_period {
        scenario.orbit.period_ticks = period;
    }
    if let Some(window) = cli.sunlight_window {
        scenario.orbit.sunlight_ticks = window;
    }
    if let Some(capacity) = cli.battery_capacity {
        scenario.power.battery_capacity_mwh = capacity;
        // Clamp the scenario's initial charge to a reduced capacity
        // unless --battery-initial overrides it outright.
        if cli.battery_initial.is_none() {
            scenario.power.battery_initial_mwh =
                scenario.power.battery_initial_mwh.min(capacity);
        }
    }
    if let Some(initial) = cli.battery_initial {
        scenario.power.battery_initial_mwh = initial;
    }
    if let Some(watts) = cli.solar_sunlight {
        scenario.power.solar_sunlight_w = watts;
    }
    if let Some(watts) = cli.solar_eclipse {
        scenario.power.solar_eclipse_w = watts;
    }
    if let Some(watts) = cli.max_battery_draw {
        scenario.power.max_battery_draw_w = watts;
    }
    if let Some(watts) = cli.deposition_power {
        scenario.deposition.power_w = watts;
    }
    if let Some(watts) = cli.implant_power {
        scenario.implant.power_w = watts;
    }
    if let Some(watts) = cli.growth_power {
        scenario.growth.power_w = watts;
    }
    if let Some(ticks) = cli.calibration_ticks {
        scenario.implant.calibration_ticks = ticks;
    }
    if let Some(watts) = cli.calibration_power {
        scenario.implant.calibration_power_w = watts;
    }
    if let Some(ticks) = cli.cooldown_ticks {
        scenario.implant.cooldown_ticks = ticks;
    }
}

fn main() {
    let cli = parse_args();

    // Load config: --scenario takes priority, then --preset, then baseline.
    let mut scenario = if let Some(ref path) = cli.scenario_path {
        match ScenarioConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = cli.preset {
        match ScenarioConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        ScenarioConfig::baseline()
    };

    apply_overrides(&mut scenario, &cli);

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let Some(jobs_path) = cli.jobs else {
        eprintln!("error: --jobs is required");
        process::exit(1);
    };
    let Some(out_path) = cli.out else {
        eprintln!("error: --out is required");
        process::exit(1);
    };

    let job_ids = match load_job_ids(&jobs_path) {
        Ok(ids) => ids,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    let telemetry = match TelemetryWriter::create(&out_path) {
        Ok(writer) => writer,
        Err(e) => {
            eprintln!("error: cannot open \"{}\": {e}", out_path.display());
            process::exit(1);
        }
    };

    let mut supervisor = Supervisor::new(scenario, &job_ids, telemetry);
    match supervisor.run() {
        Ok(report) => {
            println!("{report}");
            eprintln!("Telemetry written to {}", out_path.display());
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
