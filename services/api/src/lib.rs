mod cli;
mod infra;
mod routes;
mod server;

use etuition::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
