// File: redeemfx-cli/src/main.rs

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use redeemfx_core::SessionConfig;

mod effects;
mod live;
mod offline;

#[derive(Parser, Debug)]
#[command(name = "redeemfx")]
#[command(author, version, about = "Channel point rewards that drive in-game effects")]
struct Args {
    /// Setup file. Defaults to <config dir>/redeemfx/setup.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to Twitch and run the demo effects until Ctrl-C
    Run {
        /// Simulation frames per second
        #[arg(long, default_value_t = 60)]
        tick_hz: u32,
    },
    /// Print the reward catalog as Twitch currently sees it
    List,
    /// Create every declared reward that is missing on the channel
    CreateAll,
    /// Delete every reward this client created
    DeleteAll,
    /// Redeem one reward offline, as a test user
    Redeem { title: String },
    /// Redeem random rewards offline
    StressTest {
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Start every timed effect offline, then skip their timers
    SkipTimers,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("redeemfx=info".parse().unwrap_or_default());
    fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<SessionConfig> {
    let Some(path) = path.or_else(SessionConfig::default_path) else {
        info!("No config directory on this platform => using defaults");
        return Ok(SessionConfig::default());
    };
    Ok(SessionConfig::load(&path)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    let config = load_config(args.config)?;

    let result = match args.command {
        Command::Run { tick_hz } => live::run(config, tick_hz).await,
        Command::List => live::list(config).await,
        Command::CreateAll => live::create_all(config).await,
        Command::DeleteAll => live::delete_all(config).await,
        Command::Redeem { title } => offline::redeem(config, &title),
        Command::StressTest { count } => offline::stress_test(config, count),
        Command::SkipTimers => offline::skip_timers(config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
