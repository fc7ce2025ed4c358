#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use tracing::info;

mod error;
mod routes;

use chainwatch_service::config::Config;
use chainwatch_service::database::{self, Database, DatabaseImpl};
use chainwatch_service::pool::open_pool;
use error::AppError;
use logger::init_tracing;

/// Connections kept for request handlers
const POOL_SIZE: usize = 8;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config_path = std::env::var("CHAINWATCH_CONFIG").ok();
    let config = Config::load(config_path.as_ref())?;

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    let pool = open_pool(&config.database.path, POOL_SIZE).await?;
    {
        let conn = pool.get().await.map_err(anyhow::Error::from)?;
        database::initialize_database(&conn).await?;
    }
    let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));

    run_server(addr, web::Data::from(database)).await
}

async fn run_server(addr: SocketAddr, database: web::Data<dyn Database>) -> Result<(), AppError> {
    info!("Starting chainwatch query API on {}", addr);

    HttpServer::new(move || App::new().app_data(database.clone()).configure(routes::configure))
        .bind(addr)?
        .run()
        .await?;

    Ok(())
}
