mod boot_services;
mod bringup;
mod config;
mod data_dir;
mod error;
mod executor;
mod log_sink;
mod privileged;
mod probe;
mod retention;
mod retry;
mod serve;
mod signals;
mod status;
#[cfg(test)]
mod testing;
mod watchdog;

use bringup::{BringupParams, HotspotParams, NetworkBringup};
use clap::Parser;
use config::WardenConfig;
use data_dir::DataDir;
use executor::{LaunchSpec, SystemExecutor};
use log_sink::LogSink;
use privileged::SuShellOps;
use probe::ConfiguredProbe;
use signals::ShutdownSignal;
use status::{StatusTracker, WardenState};
use std::path::PathBuf;
use std::sync::Arc;
use watchdog::{ProcessWatchdog, SupervisedProcess, WatchdogSettings};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Boot-time supervisor: bring the network up (or fall back to a local
/// access point), start boot services, then keep one background process
/// running whenever the network is reachable.
#[derive(Parser, Debug)]
#[command(name = "bootwarden", version, about)]
pub struct Cli {
    /// Config file path (default: <data-dir>/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory for logs, status, and lock
    #[arg(short, long, default_value = ".bootwarden")]
    data_dir: PathBuf,

    /// Watchdog poll interval in seconds (overrides config)
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Host probed for connectivity (overrides config)
    #[arg(long)]
    probe_host: Option<String>,

    /// Max network bring-up attempts (overrides config)
    #[arg(long)]
    attempts: Option<u32>,

    /// Skip network bring-up and go straight to the watchdog
    #[arg(long)]
    skip_bringup: bool,

    /// Run a single watchdog tick and exit
    #[arg(long)]
    once: bool,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (probe results, liveness checks)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Print the running supervisor's status and exit
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "bootwarden=debug"
    } else if cli.quiet {
        "bootwarden=warn"
    } else {
        "bootwarden=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "bootwarden failed to start");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Merge CLI overrides into the loaded config.
fn apply_overrides(config: &mut WardenConfig, cli: &Cli) {
    if let Some(secs) = cli.poll_interval {
        config.watchdog.poll_interval_secs = secs;
    }
    if let Some(host) = &cli.probe_host {
        config.network.probe_host = host.clone();
    }
    if let Some(attempts) = cli.attempts {
        config.network.max_bringup_attempts = attempts;
    }
}

fn print_status(dd: &DataDir) {
    match status::read_status(&dd.status()) {
        Some(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{value}"),
        },
        None => println!("No status at {} (not running?)", dd.status().display()),
    }
}

fn print_resolved(config: &WardenConfig, config_path: &std::path::Path, dd: &DataDir) {
    println!("bootwarden v{}", env!("CARGO_PKG_VERSION"));
    println!("Config file:   {}", config_path.display());
    println!("Data dir:      {}", dd.root().display());
    println!(
        "Probe:         {:?} {} (timeout {}s)",
        config.network.probe_method, config.network.probe_host, config.network.probe_timeout_secs
    );
    println!(
        "Bring-up:      {} attempts, {}s apart",
        config.network.max_bringup_attempts, config.network.bringup_retry_delay_secs
    );
    println!(
        "Hotspot:       {}<user>, passphrase {}",
        config.hotspot.ssid_prefix,
        if config.hotspot.resolve_passphrase().is_some() {
            "configured"
        } else {
            "MISSING"
        }
    );
    println!(
        "Watchdog:      {} every {}s, pattern {:?}",
        config.process.name, config.watchdog.poll_interval_secs, config.process.pattern
    );
    println!(
        "Command:       {} {}",
        config.process.command,
        config.process.args.join(" ")
    );
    for service in &config.boot_services {
        println!("Boot service:  {} ({})", service.name, service.command);
    }
    println!("Dry run mode: config validated, not running.");
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let dd = DataDir::new(&cli.data_dir);

    if cli.status {
        print_status(&dd);
        return Ok(());
    }

    dd.init()?;
    let config_path = cli.config.clone().unwrap_or_else(|| dd.config());
    let mut config = WardenConfig::load(&config_path)?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    if cli.dry_run {
        print_resolved(&config, &config_path, &dd);
        return Ok(());
    }

    let lock = dd.acquire_lock()?;
    tracing::debug!(path = %lock.path().display(), "instance lock acquired");
    retention::apply(
        &dd.logs_dir(),
        config.logging.rotate_bytes,
        config.logging.retention_days,
    );

    let boot_log = LogSink::new(dd.boot_log());
    boot_log.append(&format!(
        "bootwarden v{} starting (pid {})",
        env!("CARGO_PKG_VERSION"),
        std::process::id()
    ));
    let mut status = StatusTracker::new(dd.status(), &config.process.name);
    status.update(WardenState::Starting);

    let mut shutdown = ShutdownSignal::install(dd.stop_file())?;

    let executor = Arc::new(SystemExecutor::new());
    let probe = ConfiguredProbe::from_config(&config.network);
    let ops = SuShellOps::new(Arc::clone(&executor), config.privileged.clone());

    if cli.skip_bringup {
        tracing::info!("skipping network bring-up");
    } else {
        status.update(WardenState::BringingUp);
        let user = privileged::resolve_user_name();
        let params = BringupParams {
            max_attempts: config.network.max_bringup_attempts,
            probe_host: config.network.probe_host.clone(),
            probe_timeout: config.network.probe_timeout(),
            retry_delay: config.network.retry_delay(),
            hotspot: HotspotParams {
                ssid: privileged::hotspot_ssid(&config.hotspot.ssid_prefix, &user),
                passphrase: config.hotspot.resolve_passphrase(),
            },
        };
        let connectivity = NetworkBringup::new(&probe, &ops, &boot_log)
            .with_shutdown(shutdown.clone())
            .bring_up(&params)
            .await;
        status.set_connectivity(connectivity);
    }

    if shutdown.is_requested() {
        tracing::info!("shutdown requested during startup, not starting services");
        boot_log.append("shutdown requested during startup");
        status.update(WardenState::ShuttingDown);
        return Ok(());
    }

    if !config.boot_services.is_empty() {
        status.update(WardenState::StartingServices);
        boot_services::start_all(executor.as_ref(), &config.boot_services, &dd, &boot_log);
    }

    if config.serve.enabled {
        let serve_config = config.serve.clone();
        let status_path = dd.status();
        tokio::spawn(async move {
            if let Err(e) = serve::run(&serve_config, status_path).await {
                tracing::warn!(error = %e, "status server stopped");
            }
        });
    }

    let process = SupervisedProcess::new(
        &config.process.name,
        &config.process.pattern,
        LaunchSpec {
            command: config.process.command.clone(),
            args: config.process.args.clone(),
            working_dir: config.process.working_dir.clone(),
        },
        LogSink::new(dd.process_log(&config.process.name)),
    );
    let settings = WatchdogSettings {
        poll_interval: config.watchdog.poll_interval(),
        probe_host: config.network.probe_host.clone(),
        probe_timeout: config.network.probe_timeout(),
        kill_grace_ticks: config.watchdog.kill_grace_ticks,
        stop_process_on_exit: config.watchdog.stop_process_on_exit,
    };
    let mut watchdog = ProcessWatchdog::new(executor, probe, settings, process, boot_log)
        .with_status(status);

    if cli.once {
        let (connectivity, outcome) = watchdog.tick().await;
        println!(
            "tick {}: {connectivity:?}, {outcome:?}, {} is {:?}",
            watchdog.ticks(),
            watchdog.process().name,
            watchdog.process().phase()
        );
        return Ok(());
    }

    watchdog.run(&mut shutdown).await;
    Ok(())
}
