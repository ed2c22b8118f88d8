//! # signoff CLI Entry Point
//!
//! Assembles subcommands and dispatches to handler modules.

use clap::Parser;

/// Signoff — approval workflow tooling.
///
/// Validates workflow configuration files and previews document routing.
#[derive(Parser, Debug)]
#[command(name = "signoff", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Validate a workflow configuration file.
    Validate(signoff_cli::validate::ValidateArgs),
    /// Show the stages a document type is routed through.
    Route(signoff_cli::route::RouteArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Validate(args) => signoff_cli::validate::run(&args, &mut stdout),
        Commands::Route(args) => signoff_cli::route::run(&args, &mut stdout),
    }
}
