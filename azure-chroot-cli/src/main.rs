mod cli;
mod commands;
mod console;

use std::process;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over --debug
    let level = if cli.global.debug { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        cli::Commands::Validate(args) => commands::validate::execute(args, &cli.global).await,
        cli::Commands::Plan(args) => commands::plan::execute(args, &cli.global).await,
        cli::Commands::Lvm(args) => commands::lvm::execute(args, &cli.global).await,
        cli::Commands::Metadata(args) => commands::metadata::execute(args, &cli.global).await,
    };

    if let Err(error) = result {
        eprintln!("Error: {:#}", error);
        process::exit(1);
    }
}
