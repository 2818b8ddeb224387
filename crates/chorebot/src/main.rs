//! Binary entrypoint for chorebot.
use std::{
    fs, io,
    path::{Path, PathBuf},
    process,
    sync::Arc,
    time::Duration,
};

use chorebot_engine::{
    Clock, ConditionalOperator, EventBus, NotificationDispatcher, Services, SystemClock,
};
use chorebot_protocol::ipc::{codec, status_channel};
use clap::{Parser, Subcommand};
use config::{Profile, load_from_path, resolve_profile_path};
use logging::{self as logshared, forward};
use relaykey::RelayKey;
use tokio::{signal, time};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*};

/// Resolved-profile JSON for `check --dump`.
mod dump;
/// Recorded perception feeds.
mod feed;

use crate::dump::ProfileDump;

#[derive(Parser, Debug)]
#[command(name = "chorebot", about = "State-driven game automation engine", version)]
/// Command-line interface for the `chorebot` binary.
struct Cli {
    /// Subcommand.
    #[command(subcommand)]
    command: Command,

    /// Logging controls
    #[command(flatten)]
    log: logshared::LogArgs,
}

#[derive(Subcommand, Debug)]
/// Top-level CLI subcommands.
enum Command {
    /// Load and validate a profile then exit.
    Check {
        /// Profile to check (defaults to ~/.chorebot/profile.yaml)
        path: Option<PathBuf>,

        /// Dump the resolved profile as JSON to stdout
        #[arg(long)]
        dump: bool,
    },

    /// Run the engine against a dry-run input relay.
    Run {
        /// Profile to run (defaults to ~/.chorebot/profile.yaml)
        profile: Option<PathBuf>,

        /// JSON-lines perception feed to replay
        #[arg(long, value_name = "PATH")]
        feed: Option<PathBuf>,

        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long, value_name = "SECS")]
        seconds: Option<f64>,

        /// Also forward log events to the status stream
        #[arg(long)]
        forward_logs: bool,
    },
}

/// Resolve and load a profile, exiting with a rendered error on failure.
fn load_or_exit(explicit: Option<&Path>) -> Profile {
    let resolved = match resolve_profile_path(explicit) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e.pretty());
            process::exit(1);
        }
    };
    match load_from_path(&resolved) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e.pretty());
            process::exit(1);
        }
    }
}

/// `chorebot check`.
fn check(path: Option<&Path>, dump: bool) {
    let profile = load_or_exit(path);
    if !dump {
        println!("OK");
        return;
    }
    match serde_json::to_string_pretty(&ProfileDump::new(&profile)) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to serialize profile: {e}");
            process::exit(1);
        }
    }
}

/// `chorebot run`.
async fn run(profile: &Profile, feed_path: Option<&Path>, seconds: Option<f64>, forward_logs: bool) {
    let lines = match feed_path {
        None => Vec::new(),
        Some(p) => match fs::read_to_string(p)
            .map_err(|e| e.to_string())
            .and_then(|src| feed::parse(&src).map_err(|e| e.to_string()))
        {
            Ok(lines) => lines,
            Err(e) => {
                eprintln!("{}: {e}", p.display());
                process::exit(1);
            }
        },
    };

    let (tx, mut rx) = status_channel();
    if forward_logs {
        forward::set_sink(tx.clone());
    }
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let bus = EventBus::default();
    let services = Services {
        relay: RelayKey::dry_run(),
        bus: bus.clone(),
        notifier: NotificationDispatcher::new(tx),
        clock: Arc::clone(&clock),
    };
    let engine = match ConditionalOperator::new(profile, services) {
        Ok(e) => e,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let printer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match codec::msg_to_line(&msg) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "status_encode_failed"),
            }
        }
    });

    if let Err(e) = engine.start_running_async() {
        error!("{}", e);
        process::exit(1);
    }
    if !lines.is_empty() {
        info!(events = lines.len(), "feed_replay");
        tokio::spawn(feed::replay(lines, bus.clone(), Arc::clone(&clock)));
    }

    let limit = match seconds.map(|s| Duration::try_from_secs_f64(s.max(0.0))) {
        None => None,
        Some(Ok(d)) => Some(d),
        Some(Err(e)) => {
            eprintln!("--seconds: {e}");
            process::exit(1);
        }
    };
    tokio::select! {
        res = signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "ctrl_c_unavailable");
            }
            debug!("interrupted");
        }
        _ = time::sleep(limit.unwrap_or_default()), if limit.is_some() => {
            debug!("time_limit_reached");
        }
    }

    if !bus.drain(Duration::from_millis(200)) {
        debug!("bus_drain_timeout");
    }
    info!(
        failures = bus.failure_count(),
        dropped = bus.dropped_count(),
        "bus_stats"
    );
    engine.dispose();
    drop(engine);
    bus.shutdown();
    forward::clear_sink();
    if time::timeout(Duration::from_millis(500), printer).await.is_err() {
        debug!("status_printer_timeout");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Compute final filter spec via shared helpers
    let env_filter = logshared::env_filter_from_spec(&cli.log.spec());

    // Install a single subscriber combining:
    // - Env filter (from CLI or env)
    // - Compact fmt output on stderr (no time)
    // - Forward layer (no-op until a sink is set)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr).without_time())
        .with(forward::layer())
        .try_init()
        .ok();

    match cli.command {
        Command::Check { path, dump } => check(path.as_deref(), dump),
        Command::Run {
            profile,
            feed,
            seconds,
            forward_logs,
        } => {
            let p = load_or_exit(profile.as_deref());
            info!(profile = %p.name, scenes = p.scenes.len(), "profile_loaded");
            run(&p, feed.as_deref(), seconds, forward_logs).await;
        }
    }
}
