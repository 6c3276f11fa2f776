//! sessiontier CLI - run placement solvers against optimization snapshots

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use sessiontier_core::error::format_error_with_remediation;
use sessiontier_core::logging::init_logging;
use sessiontier_core::optimizer::{SolverKind, SolverSettings, configured_kind};
use sessiontier_core::storage::{
    FileSessionStorage, MemorySessionStorage, SessionCodec, SessionStorage,
};
use sessiontier_core::{Config, Error, OptimizationData, Placement, SessionManager};

#[derive(Parser)]
#[command(name = "sessiontier")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "SESSIONTIER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a JSON optimization snapshot and print the placements
    Solve {
        /// Snapshot file (`-` reads stdin)
        #[arg(long)]
        snapshot: PathBuf,
        /// Solver override
        #[arg(long)]
        solver: Option<SolverKind>,
        /// Seed for randomized solvers
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List the available solvers
    Solvers,
    /// Print the resolved configuration as TOML
    Config {
        /// Ignore the config file and print the built-in defaults
        #[arg(long)]
        defaults: bool,
    },
    /// Run a session manager against synthetic client traffic
    Simulate {
        /// Number of sessions to create
        #[arg(long, default_value = "100")]
        sessions: usize,
        /// How long to run the background tasks, seconds
        #[arg(long, default_value = "10")]
        duration_secs: u64,
        /// Store remote sessions in this directory instead of memory
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Remote capacity, bytes
        #[arg(long, default_value = "67108864")]
        remote_capacity: u64,
        /// Seed for the synthetic traffic
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Serialize)]
struct SolveOutput<'a> {
    solver: &'a str,
    value: f64,
    counts: BTreeMap<&'static str, usize>,
    local_bytes: u64,
    remote_bytes: u64,
    placements: BTreeMap<&'a str, Placement>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<Error>() {
                Some(core) => eprintln!("{}", format_error_with_remediation(core)),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Config { defaults: true } = cli.command {
        print!("{}", Config::default().to_toml_string().map_err(Error::from)?);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.log)?;

    match cli.command {
        Commands::Solve {
            snapshot,
            solver,
            seed,
        } => solve(&config, &snapshot, solver, seed),
        Commands::Solvers => {
            let configured = configured_kind(&config);
            for kind in SolverKind::ALL {
                let marker = if kind == configured { " (configured)" } else { "" };
                println!("{kind}{marker}");
            }
            Ok(())
        }
        Commands::Config { .. } => {
            print!("{}", config.to_toml_string().map_err(Error::from)?);
            Ok(())
        }
        Commands::Simulate {
            sessions,
            duration_secs,
            dir,
            remote_capacity,
            seed,
        } => {
            simulate(
                config,
                sessions,
                Duration::from_secs(duration_secs),
                dir,
                remote_capacity,
                seed,
            )
            .await
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path).map_err(Error::from)?),
        None => Ok(Config::default()),
    }
}

fn read_snapshot(path: &Path) -> anyhow::Result<OptimizationData> {
    let raw = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read snapshot from stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?
    };
    Ok(serde_json::from_str(&raw).map_err(Error::from)?)
}

fn solve(
    config: &Config,
    snapshot: &Path,
    solver: Option<SolverKind>,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let data = read_snapshot(snapshot)?;
    let kind = solver.unwrap_or_else(|| configured_kind(config));
    let settings = SolverSettings {
        seed,
        ..SolverSettings::from(config)
    };
    let solver = kind.build(&settings);
    let solution = solver.solve(&data).map_err(Error::from)?;

    let counts = Placement::ALL
        .iter()
        .zip(solution.counts())
        .map(|(placement, count)| (placement.as_str(), count))
        .collect();
    let (local_bytes, remote_bytes) = solution.usage(&data);
    let output = SolveOutput {
        solver: solver.name(),
        value: solution.value(),
        counts,
        local_bytes,
        remote_bytes,
        placements: solution.placements().collect(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn simulate(
    config: Config,
    sessions: usize,
    duration: Duration,
    dir: Option<PathBuf>,
    remote_capacity: u64,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    if sessions == 0 {
        bail!("--sessions must be at least 1");
    }
    let storage: Arc<dyn SessionStorage> = match dir {
        Some(dir) => Arc::new(
            FileSessionStorage::open(dir, SessionCodec::compressed())
                .map_err(Error::from)?
                .with_capacity_cap(remote_capacity),
        ),
        None => Arc::new(MemorySessionStorage::new(remote_capacity)),
    };
    let manager = Arc::new(SessionManager::new(config, storage));

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let ids: Vec<String> = (0..sessions)
        .map(|_| {
            let session = manager.create_session();
            let payload = "x".repeat(rng.random_range(64..4096));
            session.set_attribute("payload", json!(payload));
            session.id().to_string()
        })
        .collect();

    let handle = manager.start();
    info!(sessions, tasks = ?handle.task_names(), "simulation started");

    let deadline = tokio::time::Instant::now() + duration;
    let mut requests = 0u64;
    while tokio::time::Instant::now() < deadline {
        // skewed traffic: low indices are hot
        let hot = rng.random::<f64>().powi(3);
        let index = ((hot * ids.len() as f64) as usize).min(ids.len() - 1);
        let id = ids[index].clone();
        let worker = Arc::clone(&manager);
        tokio::task::spawn_blocking(move || worker.touch_session(&id))
            .await?
            .map_err(Error::from)?;
        requests += 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle.shutdown().await?;

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for id in &ids {
        *counts.entry(manager.placement_of(id).as_str()).or_default() += 1;
    }
    let summary = json!({
        "solver": manager.solver_name(),
        "storage": manager.storage().name(),
        "requests": requests,
        "last_utility": manager.last_utility(),
        "next_period_secs": manager.optimizer_period(),
        "placements": counts,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_solve() {
        let cli = Cli::try_parse_from([
            "sessiontier",
            "solve",
            "--snapshot",
            "snap.json",
            "--solver",
            "chp",
        ])
        .unwrap();
        match cli.command {
            Commands::Solve { solver, seed, .. } => {
                assert_eq!(solver, Some(SolverKind::Chp));
                assert_eq!(seed, None);
            }
            _ => panic!("expected solve"),
        }
    }

    #[test]
    fn cli_rejects_unknown_solver() {
        let parsed = Cli::try_parse_from([
            "sessiontier",
            "solve",
            "--snapshot",
            "snap.json",
            "--solver",
            "simplex",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn snapshot_file_feeds_the_solver() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut data = OptimizationData::new(1 << 20, 0.0);
        data.insert_storage("remote", sessiontier_core::StorageProperties::default());
        data.insert_session(
            "a",
            sessiontier_core::SessionProperties {
                local_size: Some(10),
                remote_size: Some(10),
                ..sessiontier_core::SessionProperties::new(1.0, 0)
            },
        );
        std::fs::write(&path, serde_json::to_string(&data).unwrap()).unwrap();

        let loaded = read_snapshot(&path).unwrap();
        assert_eq!(loaded, data);
        solve(&Config::default(), &path, Some(SolverKind::Local), None).unwrap();
    }

    #[test]
    fn unknown_configured_solver_still_solves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut data = OptimizationData::new(1 << 20, 0.0);
        data.insert_storage("remote", sessiontier_core::StorageProperties::default());
        std::fs::write(&path, serde_json::to_string(&data).unwrap()).unwrap();

        let config = Config {
            solver: "simplex".to_string(),
            ..Config::default()
        };
        assert_eq!(configured_kind(&config), SolverKind::Lp);
        solve(&config, &path, None, None).unwrap();
    }

    #[test]
    fn missing_config_file_is_a_core_error() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some());
    }
}
