pub mod activity;
pub mod stats;
pub mod workout;

use std::{path::PathBuf, sync::Arc};

use activity::{process_activity_command, ActivityCommand};
use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use stats::{process_stats_command, StatsCommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::level_filters::LevelFilter;
use workout::{process_plan_command, process_workout_command, PlanCommand, WorkoutCommand};

use crate::{
    config::{data_dir, SyncSettings, TrackerConfig},
    gateway::{entities::OwnerId, file_gateway::FileGateway},
    tracking::notice::Notice,
    utils::{
        clock::{Clock, DefaultClock},
        logging::{enable_logging, LogOptions},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Liftlog", version, long_about = None)]
#[command(about = "Log workouts and daily activities from the terminal", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Config file. Defaults to config.json in the application directory"
    )]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Owner whose records are used. Overrides the config")]
    owner: Option<String>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Creates the application directory, the config and the owner")]
    Init {},
    #[command(flatten)]
    Plan(PlanCommand),
    #[command(flatten)]
    Workout(WorkoutCommand),
    #[command(flatten)]
    Activity(ActivityCommand),
    #[command(about = "Month over month totals and the last 7 days")]
    Stats {
        #[command(flatten)]
        command: StatsCommand,
    },
}

/// Everything a command needs to reach the records of one owner.
pub struct Context {
    pub owner: OwnerId,
    pub gateway: Arc<FileGateway>,
    pub clock: Arc<dyn Clock>,
    pub settings: SyncSettings,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = data_dir(args.dir)?;
    enable_logging(LogOptions {
        dir: &dir,
        level: args.log.then_some(LevelFilter::TRACE),
        console: args.log,
    })?;

    let config_path = args.config.unwrap_or_else(|| dir.join("config.json"));
    let mut config = TrackerConfig::load(&config_path).await?;
    if let Some(owner) = args.owner {
        config.owner = owner;
    }

    let context = Context {
        owner: OwnerId::from(config.owner.as_str()),
        gateway: Arc::new(FileGateway::new(dir.join("records"))?),
        clock: Arc::new(DefaultClock),
        settings: config.sync_settings()?,
    };

    match args.commands {
        Commands::Init {} => {
            if !tokio::fs::try_exists(&config_path).await? {
                let contents = serde_json::to_string_pretty(&config)?;
                tokio::fs::write(&config_path, contents)
                    .await
                    .with_context(|| format!("Failed to write {}", config_path.display()))?;
            }
            context.gateway.create_owner(&context.owner).await?;
            println!("Initialized {} for {}", dir.display(), context.owner);
            Ok(())
        }
        Commands::Plan(command) => process_plan_command(&context, command).await,
        Commands::Workout(command) => process_workout_command(&context, command).await,
        Commands::Activity(command) => process_activity_command(&context, command).await,
        Commands::Stats { command } => process_stats_command(&context, command).await,
    }
}

/// Prints every background failure reported so far. Returns how many there were.
fn print_notices(notices: &mut UnboundedReceiver<Notice>) -> usize {
    let mut count = 0;
    while let Ok(notice) = notices.try_recv() {
        eprintln!("{notice}");
        count += 1;
    }
    count
}
