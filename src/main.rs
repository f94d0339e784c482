//! community-sim entry point: CLI wiring and config-driven engine construction.

use std::path::Path;
use std::process;
use std::sync::Arc;

use community_sim::billing::billing_summary;
use community_sim::community::CommunityEngine;
use community_sim::config::CommunityConfig;
use community_sim::io::billing_input::load_billing_input;
use community_sim::io::export::{export_billing_csv, export_labeled_csv, export_ranking_csv};
use community_sim::io::meter_csv::load_meter_store;
use community_sim::jobs::{BatchScheduler, RunRequest};
use community_sim::logging;
use community_sim::participant::{Participant, load_participants_csv, synthetic_population};
use community_sim::sim::cache::{AutarkyCache, MemoryCache};
use community_sim::store::{MeterStore, NoMeterData};
use tracing::{info, warn};

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    participants: Option<String>,
    meter_readings: Option<String>,
    ranking_out: Option<String>,
    labeled_out: Option<String>,
    billing_input: Option<String>,
    billing_out: Option<String>,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("community-sim: energy community discovery and billing");
    eprintln!();
    eprintln!("Usage: community-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load configuration from TOML file");
    eprintln!("  --preset <name>          Use a built-in preset (baseline, dense_town, quick)");
    eprintln!("  --seed <u64>             Override the demo population seed");
    eprintln!("  --participants <path>    Participant CSV (default: synthetic population)");
    eprintln!("  --meter-readings <path>  Long-form meter readings CSV");
    eprintln!("  --ranking-out <path>     Export the community ranking to CSV");
    eprintln!("  --labeled-out <path>     Export participants with cluster labels to CSV");
    eprintln!("  --billing-input <path>   Run period billing on a production/consumption table");
    eprintln!("  --billing-out <path>     Export per-member billing to CSV");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start REST API server after the run");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --config or --preset is given, the baseline preset is used.");
}

/// Returns the value following flag `args[*i]`, exiting when it is missing.
fn flag_value(args: &[String], i: &mut usize, what: &str) -> String {
    let flag = &args[*i];
    *i += 1;
    match args.get(*i) {
        Some(v) => v.clone(),
        None => {
            eprintln!("error: {flag} requires a {what} argument");
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        preset: None,
        seed_override: None,
        participants: None,
        meter_readings: None,
        ranking_out: None,
        labeled_out: None,
        billing_input: None,
        billing_out: None,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => cli.config_path = Some(flag_value(&args, &mut i, "path")),
            "--preset" => cli.preset = Some(flag_value(&args, &mut i, "name")),
            "--seed" => {
                let raw = flag_value(&args, &mut i, "u64");
                if let Ok(s) = raw.parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{raw}\" is not a valid u64");
                    process::exit(1);
                }
            }
            "--participants" => cli.participants = Some(flag_value(&args, &mut i, "path")),
            "--meter-readings" => cli.meter_readings = Some(flag_value(&args, &mut i, "path")),
            "--ranking-out" => cli.ranking_out = Some(flag_value(&args, &mut i, "path")),
            "--labeled-out" => cli.labeled_out = Some(flag_value(&args, &mut i, "path")),
            "--billing-input" => cli.billing_input = Some(flag_value(&args, &mut i, "path")),
            "--billing-out" => cli.billing_out = Some(flag_value(&args, &mut i, "path")),
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                let raw = flag_value(&args, &mut i, "u16");
                if let Ok(p) = raw.parse::<u16>() {
                    cli.port = p;
                } else {
                    eprintln!("error: --port value \"{raw}\" is not a valid u16");
                    process::exit(1);
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn load_config(cli: &CliArgs) -> CommunityConfig {
    let loaded = if let Some(ref path) = cli.config_path {
        CommunityConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        CommunityConfig::from_preset(name)
    } else {
        Ok(CommunityConfig::baseline())
    };
    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(seed) = cli.seed_override {
        config.demo.seed = seed;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    config
}

fn load_participants(cli: &CliArgs, config: &CommunityConfig) -> Vec<Participant> {
    match cli.participants {
        Some(ref path) => load_participants_csv(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("error: failed to read participants from {path}: {e}");
            process::exit(1);
        }),
        None => {
            let spec = config.population_spec();
            info!(count = spec.count, seed = spec.seed, "using synthetic demo population");
            synthetic_population(&spec)
        }
    }
}

fn load_meters(cli: &CliArgs) -> Arc<dyn MeterStore> {
    let Some(ref path) = cli.meter_readings else {
        return Arc::new(NoMeterData);
    };
    match load_meter_store(Path::new(path)) {
        Ok((store, errors)) => {
            for e in errors.iter().take(10) {
                warn!(file = %path, "skipped meter row: {e}");
            }
            Arc::new(store)
        }
        Err(e) => {
            eprintln!("error: failed to read meter readings from {path}: {e}");
            process::exit(1);
        }
    }
}

fn build_engine(cli: &CliArgs, config: &CommunityConfig) -> CommunityEngine {
    let window = config.window().unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });
    let cache = if config.cache.enabled {
        AutarkyCache::new(Arc::new(MemoryCache::new()), config.cache_ttl())
    } else {
        AutarkyCache::disabled()
    };
    CommunityEngine::new(load_meters(cli), Arc::new(cache))
        .with_window(window)
        .with_strategy(config.simulation.strategy)
        .with_sim_version(config.simulation.sim_version.clone())
}

fn run_billing(path: &str, out: Option<&str>, config: &CommunityConfig) {
    let input = load_billing_input(Path::new(path)).unwrap_or_else(|e| {
        eprintln!("error: failed to read billing input from {path}: {e}");
        process::exit(1);
    });
    let summary = billing_summary(
        &input.production_kwh,
        &input.consumption,
        &config.billing_params(),
    );
    println!("\n{summary}");

    if let Some(out) = out {
        if let Err(e) = export_billing_csv(&summary, Path::new(out)) {
            eprintln!("error: failed to write billing CSV: {e}");
            process::exit(1);
        }
        eprintln!("Billing written to {out}");
    }
}

fn main() {
    logging::init();
    let cli = parse_args();
    let config = load_config(&cli);

    let participants = load_participants(&cli, &config);
    let scheduler = BatchScheduler::new(build_engine(&cli, &config));
    let tenant = config.simulation.scope.clone();

    let run_id = scheduler.submit(
        &tenant,
        RunRequest {
            participants,
            radius_m: config.clustering.radius_m,
            min_size: config.clustering.min_community_size,
        },
    );
    let Some(snapshot) = scheduler.wait(&tenant, run_id) else {
        eprintln!("error: discovery run {run_id} failed, see the log for details");
        process::exit(1);
    };

    println!("{}", snapshot.report);

    if let Some(ref path) = cli.ranking_out {
        if let Err(e) = export_ranking_csv(&snapshot.report.ranked, Path::new(path)) {
            eprintln!("error: failed to write ranking CSV: {e}");
            process::exit(1);
        }
        eprintln!("Ranking written to {path}");
    }
    if let Some(ref path) = cli.labeled_out {
        if let Err(e) = export_labeled_csv(&snapshot.report.labeled, Path::new(path)) {
            eprintln!("error: failed to write labeled participants CSV: {e}");
            process::exit(1);
        }
        eprintln!("Labeled participants written to {path}");
    }

    if let Some(ref path) = cli.billing_input {
        run_billing(path, cli.billing_out.as_deref(), &config);
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;

        let state = Arc::new(community_sim::api::AppState { scheduler, tenant });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });
        if let Err(e) = rt.block_on(community_sim::api::serve(state, addr)) {
            eprintln!("error: API server failed: {e}");
            process::exit(1);
        }
    }
}
