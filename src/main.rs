#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod progress;
mod reports;
mod scope;
mod storage;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::sync::Arc;
use std::time::Duration;

use auth::{forbidden, unauthorized};
use db::sessions::clean_expired_sessions;
use env::{AppConfig, ConfigError, load_environment};
use error::AppError;
use rocket::data::{Limits, ToByteUnit};
use rocket::{Build, Rocket, tokio};
use sqlx::{Pool, Sqlite};
use storage::{FileStore, LocalFileStore};
use telemetry::{TelemetryFairing, init_tracing, shutdown_telemetry};
use thiserror::Error;
use tracing::{error, info};
use validation::{bad_request, internal_error, not_found, unprocessable};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    let env_files = load_environment()?;
    let config = AppConfig::from_env()?;
    init_tracing(&config)?;

    for file in &env_files {
        info!(file = %file, "Loaded environment file");
    }

    let pool = db::connect(&config.database_url).await?;
    db::apply_schema(&pool).await?;

    spawn_session_sweeper(pool.clone());

    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(config.storage_root.clone()));
    let result = init_rocket(pool, config, store).launch().await;

    shutdown_telemetry();
    result?;
    Ok(())
}

fn spawn_session_sweeper(pool: Pool<Sqlite>) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool).await {
                Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
                Ok(_) => {}
                Err(e) => error!("Failed to clean expired sessions: {}", e),
            }

            tokio::time::sleep(SESSION_SWEEP_INTERVAL).await;
        }
    });
}

pub fn init_rocket(pool: Pool<Sqlite>, config: AppConfig, store: Arc<dyn FileStore>) -> Rocket<Build> {
    info!("Starting tutor center");

    let limits = Limits::default()
        .limit("file", 10.mebibytes())
        .limit("data-form", 12.mebibytes());
    let figment = rocket::Config::figment().merge(("limits", limits));

    rocket::custom(figment)
        .manage(pool)
        .manage(config)
        .manage(store)
        .mount("/api", api::routes())
        .register(
            "/api",
            catchers![
                unauthorized,
                forbidden,
                bad_request,
                not_found,
                unprocessable,
                internal_error
            ],
        )
        .attach(TelemetryFairing)
}
