mod cli;
mod fill;
mod infra;
mod routes;
mod server;

use gmf_forms::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
