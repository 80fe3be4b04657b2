use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

mod commands;
mod workload;

#[derive(Parser)]
#[command(name = "flexer-cmd")]
#[command(about = "Command-line utility for exercising Flexer buffers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the legal capacity chosen for each requested size in a range
    Sizes {
        /// First requested size
        #[arg(long, default_value_t = 0)]
        from: usize,

        /// Last requested size (inclusive)
        #[arg(long, default_value_t = 32)]
        to: usize,

        /// Print only sizes whose legal capacity differs from the request
        #[arg(long)]
        changed_only: bool,
    },

    /// Run a workload file against a buffer and report its state after every step
    Run {
        /// Path to the JSON workload description
        workload: String,

        /// Continue with the next step when an allocation fails
        #[arg(long)]
        keep_going: bool,

        /// Emit the step report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_log();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sizes {
            from,
            to,
            changed_only,
        } => commands::sizes::run(from, to, changed_only),
        Commands::Run {
            workload,
            keep_going,
            json,
        } => commands::run::run(workload, keep_going, json),
    }
}

fn init_log() {
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(default_log_level())
        .parse_default_env()
        .init();
}

fn default_log_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}
