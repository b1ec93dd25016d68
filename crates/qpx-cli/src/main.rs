//! QPX CLI Entry Point
//!
//! This is the main entry point for the qpx command-line tool.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use qpx_cli::{classify, registry, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify(args) => classify::execute(args)?,
        Commands::Registry(args) => registry::execute(args)?,
        Commands::Version => {
            println!("qpx {}", env!("CARGO_PKG_VERSION"));
            println!("core version: {}", qpx_core::VERSION);
            println!("classify version: {}", qpx_classify::VERSION);
        }
    }

    Ok(())
}
