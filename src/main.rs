use clap::Parser;
use pcbmill::cli::{run, Cli};
use pcbmill::init_logging;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;
    tracing::debug!("pcbmill {} ({})", pcbmill::VERSION, pcbmill::BUILD_DATE);

    run(cli)
}
