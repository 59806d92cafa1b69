use clap::Parser;
use she_pipeline::app::{handle_fatal_error, init_logging, AppConfig};
use she_pipeline::cli::{execute_command, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = AppConfig::new(cli.verbose);
    init_logging(&config);

    if let Err(e) = execute_command(cli.command).await {
        handle_fatal_error(e, config.verbose);
    }
}
