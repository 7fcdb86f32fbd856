use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gmf_forms::error::AppError;

use crate::fill::{run_fill, FillArgs};
use crate::server;

#[derive(Parser, Debug)]
#[command(
    name = "GMF Q-063M Form Service",
    about = "Serve and exercise the Q-063M stamp request pipeline from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Fill the template offline and write the flattened PDF to disk
    Fill(FillArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the configured template PDF path
    #[arg(long)]
    pub(crate) template: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Fill(args) => run_fill(args),
    }
}
