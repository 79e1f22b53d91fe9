//! kolosal-compose - Main Entry Point
//!
//! Command-line access to the operator registry, pipeline expressions and
//! search-space compilation.

use clap::Parser;
use kolosal_compose::cli::{self, Cli};
use kolosal_compose::operator::{install, OperatorRegistry};
use tracing::info;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_compose=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut registry = OperatorRegistry::builtin()?;
    if let Some(path) = &cli.operators {
        let loaded = registry.load_declarations(path)?;
        info!(path = %path.display(), operators = loaded, "Loaded operator declarations");
    }
    let registry = install(registry)?;

    cli::run(&cli, registry)
}
