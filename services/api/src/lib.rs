mod cli;
mod infra;
mod routes;
mod server;

use ficha_tlc::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
