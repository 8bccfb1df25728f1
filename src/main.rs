//! Shepherd CLI entry point.

use clap::Parser;

use shepherd::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => commands::run::execute(&cli.config, cli.json).await,
        Commands::Check => commands::check::execute(&cli.config, cli.json).await,
        Commands::Job(args) => commands::job::execute(args, &cli.config, cli.json).await,
    };

    if let Err(err) = result {
        shepherd::cli::handle_error(err, cli.json);
    }
}
