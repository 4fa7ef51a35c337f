//! strata-shard: serve one rank of a Strata workspace.
//!
//! `strata-shard --workspace DIR --rank R --shards N` opens `DIR/R`, listens
//! on `DIR/R_sock`, and serves until SIGINT/SIGTERM or a client `Shutdown`.

mod commands;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use strata_shard::{ShardConfig, ShardServer, CONFIG_FILE_NAME};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use commands::build_cli;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("strata-shard: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    let workspace = PathBuf::from(
        matches
            .get_one::<String>("workspace")
            .context("--workspace is required")?,
    );
    let rank = *matches.get_one::<u32>("rank").context("--rank is required")?;
    let shards = *matches.get_one::<u32>("shards").context("--shards is required")?;
    if rank >= shards {
        bail!("rank {} is out of range for {} shards", rank, shards);
    }

    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;

    let config = match matches.get_one::<String>("config") {
        Some(path) => ShardConfig::from_file(Path::new(path))?,
        None => {
            let path = workspace.join(CONFIG_FILE_NAME);
            ShardConfig::write_default_if_missing(&path)?;
            ShardConfig::from_file(&path)?
        }
    };

    let server = Arc::new(ShardServer::with_config(rank, shards, &workspace, config));

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to register signal handlers")?;
    {
        let server = Arc::clone(&server);
        thread::Builder::new()
            .name("strata-shard-signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    info!(target: "strata::shard", signal, "Received signal, shutting down");
                    server.shutdown();
                }
            })
            .context("failed to spawn signal thread")?;
    }

    server.run()?;

    if let Some(&grace_ms) = matches.get_one::<u64>("grace-ms") {
        let live = server.live_workers();
        if live > 0 {
            info!(target: "strata::shard", live, grace_ms, "Waiting for connected clients");
            if !server.wait_for_workers(Duration::from_millis(grace_ms)) {
                warn!(target: "strata::shard", live = server.live_workers(), "Clients still connected after grace period");
            }
        }
    }

    server
        .close_database()
        .context("failed to close the database")?;

    info!(target: "strata::shard", rank, "Shard stopped");
    Ok(())
}
