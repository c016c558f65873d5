use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    layout::{self, LayoutArgs},
    plan::{self, PlanArgs},
    run::{self, RunArgs},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "qmb-send", about = "Expand a parameter sweep into batch jobs and dispatch them")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write scripts for every job and stage, then run or submit them.
    Run(RunArgs),
    /// Preview descriptors and script names without touching the filesystem.
    Plan(PlanArgs),
    /// Create the storage root and its subdirectories only.
    Layout(LayoutArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qmb_send=info,qmb_batch=info".into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run::run(&args),
        Command::Plan(args) => plan::run(&args),
        Command::Layout(args) => layout::run(&args),
    }
}
