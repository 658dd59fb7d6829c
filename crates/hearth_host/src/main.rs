//! Standalone host entry point.
//!
//! Provides the CLI, configuration loading and tick-loop wiring around
//! [`PluginHost`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use hearth_host::{AppConfig, PluginHost, StandalonePlatform};
use hearth_platform::TickLoop;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
struct CliArgs {
    config_path: PathBuf,
    plugin_dir: Option<PathBuf>,
    log_level: Option<String>,
    json_logs: bool,
}

fn parse_args() -> CliArgs {
    let matches = Command::new("Hearth Host")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Standalone plugin host for the Hearth runtime")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("hearth.toml"),
        )
        .arg(
            Arg::new("plugins")
                .short('p')
                .long("plugins")
                .value_name("DIR")
                .help("Plugin directory path (overrides the config file)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    CliArgs {
        config_path: matches
            .get_one::<String>("config")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("hearth.toml")),
        plugin_dir: matches.get_one::<String>("plugins").map(PathBuf::from),
        log_level: matches.get_one::<String>("log-level").cloned(),
        json_logs: matches.get_flag("json-logs"),
    }
}

fn setup_logging(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json_format {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_ansi(true)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();

    let config = AppConfig::load_or_create(&args.config_path)
        .await
        .with_context(|| format!("loading {}", args.config_path.display()))?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    setup_logging(&level, args.json_logs || config.logging.json_format);

    let mut settings = config.host_settings();
    if let Some(plugin_dir) = args.plugin_dir {
        settings.plugin_dir = plugin_dir;
    }

    let platform = Arc::new(StandalonePlatform::new());
    let host = Arc::new(PluginHost::new(platform, settings));

    let running = host.load_all().await.context("loading plugins")?;
    if running == 0 {
        warn!("host is up with no plugins loaded");
    } else {
        info!("host is up with {} plugin(s)", running);
    }

    let tick_host = host.clone();
    let tick_loop = TickLoop::new(config.tick_interval()).spawn(move |_| tick_host.tick());

    signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    let ticks = tick_loop.stop().await;
    host.shutdown().await;
    info!("host stopped after {} ticks", ticks);
    Ok(())
}
