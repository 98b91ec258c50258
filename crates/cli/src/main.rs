//! stepwise CLI: the main entry point.
//!
//! Commands:
//! - `init`    : Write a default config file
//! - `status`  : Show storage, library, engine and runner status
//! - `macro`   : List, show, create, delete and run macros
//! - `mine`    : Find repeated action sequences in history
//! - `goal`    : Run an autonomous goal with a plan from a JSON file
//! - `session` : Inspect execution sessions
//! - `runner`  : Tick schedules once, or serve them until Ctrl-C

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stepwise_core::PermissionScope;

mod commands;

#[derive(Parser)]
#[command(
    name = "stepwise",
    about = "stepwise: record, mine, replay and schedule UI automation macros",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config directory and a default config file
    Init,

    /// Show system status
    Status,

    /// Manage and run macros
    #[command(subcommand)]
    Macro(MacroCommand),

    /// Mine repeated action sequences from history
    Mine {
        /// Most recent history entries to scan (defaults to `[mining] window`)
        #[arg(short, long)]
        window: Option<usize>,

        /// Promote the strongest pattern to a draft macro with this name
        #[arg(long)]
        promote: Option<String>,
    },

    /// Pursue a goal with a plan read from a JSON file of steps
    Goal {
        /// What the run should achieve
        goal: String,

        /// JSON array of steps the planner proposes in order
        #[arg(short, long)]
        plan: PathBuf,

        #[arg(short, long)]
        domain: Option<String>,

        /// read | write | submit | payment
        #[arg(short, long, default_value = "read")]
        scope: PermissionScope,

        /// Ask perception for OCR text as well
        #[arg(long)]
        visual: bool,

        /// Approve gated steps without prompting
        #[arg(short = 'y', long)]
        approve: bool,
    },

    /// Inspect execution sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Drive scheduled work
    #[command(subcommand)]
    Runner(RunnerCommand),
}

#[derive(Subcommand)]
enum MacroCommand {
    /// List stored macros
    List,

    /// Show one macro with its steps
    Show { id: String },

    /// Create a macro from a JSON file of steps
    Create {
        #[arg(short, long)]
        name: String,

        /// JSON array of `{ "tool": ..., "params": {...} }`
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        speed: Option<f64>,

        #[arg(long)]
        loops: Option<u32>,

        /// Keep going when a step fails
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Delete a macro
    Delete { id: String },

    /// Replay a macro and wait for it to finish
    Run {
        id: String,

        #[arg(long)]
        speed: Option<f64>,

        #[arg(long)]
        loops: Option<u32>,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// List sessions, newest first
    List,

    /// Show a session with its log
    Show { id: String },

    /// Remove finished sessions older than the given number of days
    Purge {
        #[arg(long, default_value_t = 30)]
        older_than_days: i64,
    },
}

#[derive(Subcommand)]
enum RunnerCommand {
    /// Start every due schedule once
    Tick,

    /// Run the periodic runner until Ctrl-C
    Serve {
        /// Override `[runner] interval_secs`
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// List schedules
    Schedules,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Status => commands::status::run().await?,
        Commands::Macro(cmd) => match cmd {
            MacroCommand::List => commands::macros::list().await?,
            MacroCommand::Show { id } => commands::macros::show(&id).await?,
            MacroCommand::Create {
                name,
                file,
                description,
                speed,
                loops,
                continue_on_error,
            } => {
                commands::macros::create(&name, &description, &file, speed, loops, continue_on_error)
                    .await?
            }
            MacroCommand::Delete { id } => commands::macros::delete(&id).await?,
            MacroCommand::Run { id, speed, loops } => {
                commands::macros::run(&id, speed, loops).await?
            }
        },
        Commands::Mine { window, promote } => commands::mine::run(window, promote).await?,
        Commands::Goal {
            goal,
            plan,
            domain,
            scope,
            visual,
            approve,
        } => commands::goal::run(&goal, &plan, domain.as_deref(), scope, visual, approve).await?,
        Commands::Session(cmd) => match cmd {
            SessionCommand::List => commands::session::list().await?,
            SessionCommand::Show { id } => commands::session::show(&id).await?,
            SessionCommand::Purge { older_than_days } => {
                commands::session::purge(older_than_days).await?
            }
        },
        Commands::Runner(cmd) => match cmd {
            RunnerCommand::Tick => commands::runner::tick().await?,
            RunnerCommand::Serve { interval } => commands::runner::serve(interval).await?,
            RunnerCommand::Schedules => commands::runner::schedules().await?,
        },
    }

    Ok(())
}
