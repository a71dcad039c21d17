use rocket::State;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};

use crate::validation::{ApiResponse, ApiResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub database: bool,
    pub version: String,
}

#[get("/health")]
pub async fn health(db: &State<Pool<Sqlite>>) -> ApiResult<Health> {
    sqlx::query("SELECT 1").execute(db.inner()).await?;

    Ok(ApiResponse::ok(
        "Service is healthy",
        Health {
            database: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    ))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![health]
}
