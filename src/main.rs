use clap::Parser;

use chatsync::cli::{self, Cli};
use chatsync::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cli::init_tracing();
    let cli = Cli::parse();
    cli::run(cli).await
}
