mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod utils;

use std::io;
use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::mailer::{LogMailer, Mailer};

// LOG_FORMAT=json pour les logs structurés, RUST_LOG pour le niveau
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,sea_orm=warn"));
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let config = Config::from_env().map_err(io::Error::other)?;

    tracing::info!("🔌 Connecting to database...");
    let db = db::establish_connection(&config.database_url)
        .await
        .map_err(io::Error::other)?;
    tracing::info!("✅ Database connected!");

    let bind = (config.host.clone(), config.port);
    tracing::info!(env = ?config.app_env, "🚀 Starting server on http://{}:{}", bind.0, bind.1);

    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);
    let mailer = web::Data::from(mailer);
    let config = web::Data::new(config);
    let db = web::Data::new(db);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(db.clone())
            .app_data(config.clone())
            .app_data(mailer.clone())
            .configure(routes::configure_routes)
    })
        .bind(bind)?
        .run()
        .await
}
