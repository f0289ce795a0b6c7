use clap::Parser;
use runbox_server::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    runbox_server::run_main(cli).await
}
