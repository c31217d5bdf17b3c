//! Profile steering entry point: CLI wiring and config-driven run.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use profile_steer::config::{BackendKind, ScenarioConfig};
use profile_steer::io::export::{export_profile_csv, export_rounds_csv, write_summary_json};
use profile_steer::scenario;

/// Steers a fleet of private devices toward a target profile.
#[derive(Parser, Debug)]
#[command(name = "profile-steer", version, long_about = None)]
struct Cli {
    /// Load the run configuration from a TOML file
    #[arg(long, conflicts_with = "preset")]
    scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, discrete_ev, differential)
    #[arg(long)]
    preset: Option<String>,

    /// Override the fleet and base-load seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the privacy backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Export the final profile to CSV
    #[arg(long)]
    profile_out: Option<PathBuf>,

    /// Export the round log to CSV
    #[arg(long)]
    rounds_out: Option<PathBuf>,

    /// Write the run summary as JSON
    #[arg(long)]
    summary_out: Option<PathBuf>,

    /// Start the read-only REST API after the run
    #[cfg(feature = "api")]
    #[arg(long)]
    serve: bool,

    /// API server port
    #[cfg(feature = "api")]
    #[arg(long, default_value_t = 3000)]
    port: u16,
}

fn load_config(cli: &Cli) -> Result<ScenarioConfig, String> {
    // --scenario takes priority, then --preset, then baseline default
    let mut cfg = if let Some(path) = &cli.scenario {
        ScenarioConfig::from_toml_file(path).map_err(|e| e.to_string())?
    } else if let Some(name) = &cli.preset {
        ScenarioConfig::from_preset(name).map_err(|e| e.to_string())?
    } else {
        ScenarioConfig::baseline()
    };

    if let Some(seed) = cli.seed {
        cfg.horizon.seed = seed;
    }
    if let Some(kind) = cli.backend {
        cfg.privacy.backend = kind;
    }
    Ok(cfg)
}

fn write_file(path: &Path, what: &str, result: std::io::Result<()>) {
    if let Err(e) = result {
        eprintln!("error: failed to write {what}: {e}");
        process::exit(1);
    }
    eprintln!("{what} written to {}", path.display());
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let errors = cfg.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let outcome = match scenario::run(&cfg) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("error: steering failed ({:?}): {e}", e.kind());
            process::exit(1);
        }
    };

    for r in &outcome.rounds {
        println!("{r}");
    }
    println!("\n{}", outcome.report);

    if let Some(path) = &cli.profile_out {
        write_file(path, "Profile", export_profile_csv(&outcome, path));
    }
    if let Some(path) = &cli.rounds_out {
        write_file(path, "Round log", export_rounds_csv(&outcome.rounds, path));
    }
    if let Some(path) = &cli.summary_out {
        let result = std::fs::File::create(path).and_then(|f| write_summary_json(&outcome, f));
        write_file(path, "Summary", result);
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(profile_steer::api::AppState::from(outcome));
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });
        rt.block_on(profile_steer::api::serve(state, addr));
    }
}
