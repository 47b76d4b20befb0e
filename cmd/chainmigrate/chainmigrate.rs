use chainmigrate::{cli::CLI, initializers::init_tracing};
use clap::Parser;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let CLI { opts, command } = CLI::parse();

    init_tracing(&opts)?;

    if let Err(error) = command.run().await {
        eprintln!("Error: {error:#}");
        std::process::exit(1);
    }
    Ok(())
}
