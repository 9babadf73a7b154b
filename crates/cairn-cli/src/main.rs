use anyhow::Result;
use cairn_cli::{init_tracing, run_cli, Cli};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}
