//! pexr - build and run Python application bundles

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pexr_cli::ops::exit_code;
use pexr_cli::{Cli, Commands, cmd};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over -v.
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Build(args) => cmd::build::build(args, cli.verbose).await,
        Commands::Run { bundle, args } => cmd::run::run(bundle, args).await,
        Commands::Info { bundle } => cmd::info::info(bundle),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(exit_code(&err));
        }
    }
}
