use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use appvisor::{
    AppSettings, ChildLauncher, ClusterConfig, FileSettings, PropsCommandFactory, SchedulerBuilder,
    SchedulerConfig, SettingsLoader, StopCause, StopWatcher, Subscribe, build_app_state,
    request_stop, settings::keys,
};

/// Supervisor for the search, web and compute worker processes.
#[derive(Parser, Debug)]
#[command(name = "appvisor", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the workers and supervise them until stopped.
    Start(StartArgs),
    /// Ask a running supervisor to stop.
    Stop(CommonArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// TOML configuration file.
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Installation directory (`path.home`).
    #[arg(long, value_name = "DIR", default_value = ".")]
    home: PathBuf,
}

#[derive(Args, Debug)]
struct StartArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Property override, may be repeated.
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, String)>,
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn loader(common: &CommonArgs) -> SettingsLoader {
    let loader = SettingsLoader::new(&common.home);
    match &common.config {
        Some(path) => loader.with_config_file(path),
        None => loader,
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let outcome = match cli.command {
        Command::Start(args) => start(args).await,
        Command::Stop(args) => stop(args),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "appvisor failed");
            ExitCode::FAILURE
        }
    }
}

async fn start(args: StartArgs) -> Result<()> {
    let mut loader = loader(&args.common);
    for (key, value) in args.overrides {
        loader = loader.with_override(key, value);
    }
    let settings: Arc<dyn AppSettings> =
        Arc::new(FileSettings::load(loader).context("failed to load configuration")?);
    let props = settings.props();

    let cluster = ClusterConfig::from_props(&props).context("invalid cluster configuration")?;
    let cfg = SchedulerConfig::from_props(&props).context("invalid scheduler configuration")?;
    settings.enabled_roles()?;

    let temp = PathBuf::from(props.value_or(keys::PATH_TEMP, "temp"));
    tokio::fs::create_dir_all(&temp)
        .await
        .with_context(|| format!("failed to create {}", temp.display()))?;

    let state = build_app_state(&cluster).await.context("failed to start application state")?;

    #[cfg(feature = "logging")]
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(appvisor::LogWriter::new())];
    #[cfg(not(feature = "logging"))]
    let subscribers: Vec<Arc<dyn Subscribe>> = Vec::new();
    let scheduler = SchedulerBuilder::new(
        Arc::clone(&settings),
        Arc::clone(&state),
        Arc::new(PropsCommandFactory::new(Arc::clone(&settings))),
        Arc::new(ChildLauncher::new(temp.join("status"))),
    )
    .with_config(cfg)
    .with_subscribers(subscribers)
    .build();

    let watcher = StopWatcher::new(scheduler.clone()).with_stop_file_in(&temp).spawn();
    if let Err(e) = scheduler.schedule().await {
        watcher.abort();
        state.close().await;
        return Err(e.into());
    }

    let cause = scheduler.await_termination().await;
    watcher.abort();
    state.close().await;

    match cause {
        StopCause::Terminated => {
            tracing::info!("appvisor stopped");
            Ok(())
        }
        other => bail!("appvisor stopped: {other}"),
    }
}

fn stop(args: CommonArgs) -> Result<()> {
    let props = loader(&args).load().context("failed to load configuration")?;
    let temp = PathBuf::from(props.value_or(keys::PATH_TEMP, "temp"));
    let path = request_stop(&temp).with_context(|| format!("failed to write stop request in {}", temp.display()))?;
    tracing::info!(path = %path.display(), "stop requested");
    Ok(())
}
