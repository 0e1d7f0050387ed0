use anyhow::Result;
use clap::Parser;
use nat_translate::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nat_translate=info")),
        )
        .init();

    let cli = Cli::parse();
    cli.run()
}
