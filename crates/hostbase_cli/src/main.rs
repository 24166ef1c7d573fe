//! Hostbase CLI
//!
//! Command-line tools for JSON file backends.
//!
//! # Commands
//!
//! - `replicate` - Copy a slice of one backend into another
//! - `inspect` - Display record counts and backend information

mod commands;

use clap::{Parser, Subcommand};
use commands::inspect::InspectArgs;
use commands::replicate::ReplicateArgs;
use tracing_subscriber::EnvFilter;

/// Hostbase backend tools.
#[derive(Parser)]
#[command(name = "hostbase")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy records from one backend file into another
    Replicate(ReplicateArgs),

    /// Display record counts and backend information
    Inspect(InspectArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Replicate(args) => {
            let report = commands::replicate::run(&args)?;
            print!("{}", commands::replicate::render_report(&report));
        }
        Commands::Inspect(args) => {
            let result = commands::inspect::inspect(&args.path)?;
            match args.format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&result)?),
                _ => print!("{}", commands::inspect::render_text(&result)),
            }
        }
    }

    Ok(())
}
