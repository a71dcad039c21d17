use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;

pub mod assignments;
pub mod attendance;
pub mod centers;
pub mod curriculum;
pub mod fees;
pub mod notifications;
pub mod schema;
pub mod sessions;
pub mod students;
pub mod submissions;
pub mod teachers;
pub mod users;

#[instrument]
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>, AppError> {
    info!("Connecting to database");
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    Ok(SqlitePoolOptions::new().connect_with(options).await?)
}

/// Brings the store up to the current table layout. Safe to run on every start.
#[instrument(skip(pool))]
pub async fn apply_schema(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Applying schema");
    sqlx::raw_sql(schema::CURRENT_SCHEMA).execute(pool).await?;
    Ok(())
}
