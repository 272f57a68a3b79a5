mod commands;
mod input;
mod parse;
mod setup;
mod terminal_output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use lmc_api::HttpApi;
use lmc_auth::{Authenticator, CredentialStore};
use lmc_config::schema::ApiConfig;
use lmc_config::{ConfigPaths, ConfigValidationError, LmcConfig};
use lmc_core::RemoteApi;
use lmc_dispatch::{ConnectionMonitor, Dispatcher, DispatcherInputs, JobSubmitter, LinkDelivery};
use lmc_journal::{JobLog, SqliteJobLog};
use lmc_scheduler::{PoolOptions, RetryPolicy, WorkerPool};

use commands::Session;
use input::LineInput;
use terminal_output::Console;

#[derive(Parser)]
#[command(name = "lmc")]
#[command(about = "Links manager client: add links now, deliver them when the server is reachable")]
#[command(version)]
struct Cli {
    /// Configuration directory (default: $LMC_CONFIG_DIR or ~/.lmc)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// API base URL, overrides the config file
    #[arg(long)]
    api_host: Option<String>,

    /// Also write logs to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let console = Console::detect();
    let code = match run(cli, console).await {
        Ok(()) => 0,
        Err(e) => {
            console.error(&format!("{e:#}"));
            1
        }
    };
    // A stdin read still parked on the blocking pool would hold up runtime shutdown.
    std::process::exit(code);
}

async fn run(cli: Cli, console: Console) -> Result<()> {
    let dir = cli.config_dir.unwrap_or_else(lmc_config::config_dir);
    setup::ensure_config_dir(&dir).await?;

    let (mut config, mut warnings) = lmc_config::load_and_prepare(&dir).await?;
    if let Some(host) = cli.api_host {
        warnings = override_api_host(&mut config, host)?;
    }
    let paths = ConfigPaths::new(&dir, &config);

    tokio::fs::create_dir_all(&paths.log_dir)
        .await
        .with_context(|| format!("Cannot create log folder {}", paths.log_dir.display()))?;
    lmc_logging::init_logger(&paths.log_dir, &config.log_level(), cli.verbose);
    lmc_config::log_warnings(&warnings);
    info!(dir = %dir.display(), api_host = %config.api_host(), "Starting links manager client");

    let mut input = LineInput::stdin();
    let store = CredentialStore::new(&paths.auth_token, &paths.credentials);
    let credentials = setup::bootstrap(&store, &mut input, &console).await?;

    let http = Arc::new(HttpApi::with_timeout(config.api_host(), config.api_timeout())?);
    let api: Arc<dyn RemoteApi> = http.clone();
    let auth = Arc::new(Authenticator::new(Arc::clone(&api), store.clone(), credentials));
    let log: Arc<dyn JobLog> = Arc::new(
        SqliteJobLog::open(&paths.jobs_db)
            .with_context(|| format!("Cannot open job journal {}", paths.jobs_db.display()))?,
    );

    let capacity = config.channel_capacity();
    let (submit_tx, submit_rx) = mpsc::channel(capacity);
    let (results_tx, results_rx) = mpsc::channel(capacity);
    let (arm_tx, arm_rx) = mpsc::channel(1);
    let (recovered_tx, recovered_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut pool = WorkerPool::new(
        LinkDelivery::new(Arc::clone(&api), Arc::clone(&auth)),
        PoolOptions {
            workers: config.delivery_workers(),
            retry: RetryPolicy::new(config.max_tries(), config.retry_base_delay_ms()),
        },
    );
    pool.add_logger(Arc::new(|msg: &str| debug!(target: "lmc_scheduler", "{msg}")));
    pool.add_result_output(results_tx);
    pool.run();
    let pool = Arc::new(pool);

    let monitor = ConnectionMonitor::new(http.clone(), config.probe_initial(), config.probe_max());
    let monitor_task = tokio::spawn(monitor.run(arm_rx, recovered_tx, shutdown_rx.clone()));

    let dispatcher = Dispatcher::new(Arc::clone(&log), pool.clone(), arm_tx);
    let state = dispatcher.state_watch();
    let dispatcher_task = tokio::spawn(dispatcher.run(DispatcherInputs {
        submissions: submit_rx,
        results: results_rx,
        recovered: recovered_rx,
        shutdown: shutdown_rx,
    }));

    let session = Session {
        console,
        auth,
        api,
        probe: http,
        submitter: JobSubmitter::new(submit_tx),
        log: Arc::clone(&log),
        state,
        store,
    };

    console.line("Type 'help' for the list of commands.");
    tokio::select! {
        _ = session.run(&mut input) => {}
        _ = tokio::signal::ctrl_c() => {
            console.line("");
            info!("Interrupted");
        }
    }
    drop(session);

    console.info("Shutting down, waiting for deliveries in progress...");
    shutdown_tx.send_replace(true);
    if let Err(e) = dispatcher_task.await {
        warn!(error = %e, "Dispatcher task ended abnormally");
    }
    pool.wait().await;
    if let Err(e) = monitor_task.await {
        warn!(error = %e, "Monitor task ended abnormally");
    }

    let uncompleted = pool.uncompleted_jobs().len();
    let pending = log.count()?;
    info!(pending, uncompleted, "Stopped");
    if pending > 0 {
        console.info(&format!("{pending} link(s) kept for the next start"));
    }
    Ok(())
}

/// Returns the warnings for the updated config.
fn override_api_host(config: &mut LmcConfig, host: String) -> Result<Vec<ConfigValidationError>> {
    config.api.get_or_insert_with(ApiConfig::default).host = Some(host);
    lmc_config::check(config).context("Invalid --api-host")
}
