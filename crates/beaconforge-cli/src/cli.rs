//! Argument parsing, configuration resolution and run dispatch.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use beaconforge_config::{ConfigLayer, Configuration, FailurePolicy, resolve};
use beaconforge_events::EventBus;
use beaconforge_runner::{HttpTransformClient, RunResult, Runner, RunnerSettings};
use beaconforge_telemetry::{LogFormat, LoggingConfig, init_logging};
use clap::{Args, Parser, ValueEnum};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::CliResult;
use crate::output;

/// Parses CLI arguments, initialises logging and executes the run. Returns
/// the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig::for_cli(cli.verbose, cli.log_format.map(LogFormat::from));
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: {err}");
    }
    run_with(cli, |key| env::var(key).ok()).await
}

pub(crate) async fn run_with<F>(cli: Cli, env_lookup: F) -> i32
where
    F: Fn(&str) -> Option<String>,
{
    match execute(cli, env_lookup).await {
        Ok(result) => {
            println!("{}", output::render_summary(&result));
            0
        }
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn execute<F>(cli: Cli, env_lookup: F) -> CliResult<RunResult>
where
    F: Fn(&str) -> Option<String>,
{
    let config_path = cli.config.clone();
    let verbose = cli.verbose;
    let config = resolve(config_path.as_deref(), cli.into_layer(), env_lookup)?;
    info!(
        files = ?config.files,
        endpoint = %config.endpoint(),
        "transforming {} file(s)",
        config.files.len()
    );

    let runner = build_runner(&config)?;
    let progress =
        verbose.then(|| tokio::spawn(output::report_progress(runner.events().subscribe(None))));
    let outcome = runner.run(&config.files).await;
    drop(runner);
    if let Some(progress) = progress
        && let Err(err) = progress.await
    {
        warn!(error = %err, "progress reporter stopped unexpectedly");
    }
    let result = outcome?;
    if !result.is_complete() {
        warn!(
            run_id = %result.run_id,
            failed = result.failures.len(),
            "some files were not transformed"
        );
    }
    Ok(result)
}

fn build_runner(config: &Configuration) -> CliResult<Runner> {
    let client = HttpTransformClient::from_config(config)?;
    Ok(Runner::new(
        Arc::new(client),
        EventBus::new(),
        RunnerSettings::from(config),
    ))
}

#[derive(Parser)]
#[command(
    name = "beaconforge",
    about = "BeaconForge turns binaries into beacons through a beacon creator service"
)]
pub(crate) struct Cli {
    #[arg(
        short = 'a',
        long,
        env = "BEACON_CREATOR_ADDR",
        help = "Address of the beacon creator server [default: http://127.0.0.1:8080]"
    )]
    addr: Option<String>,
    #[arg(
        short = 'f',
        long,
        value_delimiter = ',',
        help = "Binaries to convert into beacons (repeatable, comma-separated)"
    )]
    files: Vec<PathBuf>,
    #[arg(short = 'o', long, help = "Write results here instead of replacing the originals")]
    output: Option<PathBuf>,
    #[arg(long, help = "Finalize successful files even when others fail")]
    continue_on_failure: bool,
    #[arg(
        long,
        requires = "continue_on_failure",
        help = "With --continue-on-failure, fail when no file was finalized"
    )]
    fail_if_none_succeed: bool,
    #[arg(long, help = "Directory for staged responses; keep it on the destination filesystem")]
    temp_dir: Option<PathBuf>,
    #[arg(long, value_name = "SECS", help = "Per-request timeout in seconds")]
    timeout: Option<u64>,
    #[arg(long, help = "Maximum simultaneous uploads and commits")]
    max_concurrency: Option<usize>,
    #[arg(long, help = "Request path on the beacon creator [default: /creator]")]
    upload_path: Option<String>,
    #[arg(short = 'C', long, help = "Path to a YAML configuration file")]
    config: Option<PathBuf>,
    #[arg(short = 'v', long, help = "Enable verbose output")]
    verbose: bool,
    #[arg(long, value_enum, help = "Log output format")]
    log_format: Option<LogFormatArg>,
    #[command(flatten, next_help_heading = "Beacon Options")]
    beacon: BeaconArgs,
}

#[derive(Args)]
struct BeaconArgs {
    #[arg(
        short = 'c',
        long,
        env = "CONNECTION_STRING",
        help = "Connection string for the beacon server [default: 127.0.0.1:5353]"
    )]
    connection_string: Option<String>,
    #[arg(
        short = 't',
        long,
        help = "Transport protocol for the beacon server (http, dns, tcp)"
    )]
    transport: Option<String>,
    #[arg(short = 's', long = "static", help = "Build a static binary")]
    static_binary: bool,
    #[arg(short = 'u', long, help = "Compress the binary with upx")]
    upx: bool,
    #[arg(long, help = "Compression level for upx (1-10)")]
    upx_level: Option<i64>,
    #[arg(long, help = "Gzip the transformed binary")]
    gzip: bool,
    #[arg(short = 'd', long, help = "Enable beacon debug output")]
    debug: bool,
    #[arg(long, help = "Target operating system [default: host]")]
    os: Option<String>,
    #[arg(long, help = "Target architecture [default: host]")]
    arch: Option<String>,
    #[arg(long, help = "Group identifier for the generated beacons")]
    group_id: Option<Uuid>,
    #[arg(long, help = "Extra linker flags")]
    ldflags: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Json,
    Pretty,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Json => Self::Json,
            LogFormatArg::Pretty => Self::Pretty,
        }
    }
}

const fn flag(set: bool) -> Option<bool> {
    if set { Some(true) } else { None }
}

impl Cli {
    /// Command-line layer: unset flags stay `None` so lower layers show through.
    fn into_layer(self) -> ConfigLayer {
        let failure_policy = match (self.continue_on_failure, self.fail_if_none_succeed) {
            (true, true) => Some(FailurePolicy::ContinueUnlessAllFail),
            (true, false) => Some(FailurePolicy::Continue),
            (false, _) => None,
        };
        let beacon = self.beacon;
        ConfigLayer {
            addr: self.addr,
            files: Some(self.files).filter(|files| !files.is_empty()),
            output: self.output,
            upload_path: self.upload_path,
            temp_dir: self.temp_dir,
            timeout_secs: self.timeout,
            max_concurrency: self.max_concurrency,
            failure_policy,
            connection_string: beacon.connection_string,
            transport: beacon.transport,
            static_binary: flag(beacon.static_binary),
            upx: flag(beacon.upx),
            upx_level: beacon.upx_level,
            gzip: flag(beacon.gzip),
            debug: flag(beacon.debug),
            os: beacon.os,
            arch: beacon.arch,
            group_id: beacon.group_id,
            ldflags: beacon.ldflags,
        }
    }
}
