mod config_commands;
mod memory_commands;
mod run_command;

use std::{path::PathBuf, time::Duration};

use {
    clap::{Parser, Subcommand},
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    trinity_config::TrinityConfig,
};

#[derive(Parser)]
#[command(name = "trinity", version, about = "Trinity: a multi-stage conversational chat bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "TRINITY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the console channel and the scheduler (default when no subcommand is provided).
    Run(run_command::RunArgs),
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Print stored history for a channel, or for a user with `--user`.
    History(memory_commands::HistoryArgs),
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries the bot's replies.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// The explicit `--config` file, or whatever discovery finds.
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<TrinityConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            trinity_config::load_config(path)
        },
        None => Ok(trinity_config::discover_and_load()),
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        None => run_command::run(load_config(cli.config.as_deref())?, Default::default()).await,
        Some(Commands::Run(args)) => run_command::run(load_config(cli.config.as_deref())?, args).await,
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
        Some(Commands::History(args)) => {
            memory_commands::handle_history(&load_config(cli.config.as_deref())?, args).await
        },
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "trinity starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(dispatch(cli));
    // The console reader sits in a blocking stdin read that never returns
    // on its own.
    runtime.shutdown_timeout(Duration::from_millis(250));
    result
}
