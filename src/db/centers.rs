use serde::Deserialize;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};
use validator::Validate;

use crate::auth::Role;
use crate::db::users::ensure_role;
use crate::error::AppError;
use crate::models::Center;
use crate::scope::ScopeFilter;

const CENTER_SELECT: &str = "SELECT c.id, c.name, c.admin_id, u.name AS admin_name, c.address, c.city, c.phone, c.is_active, c.created_at
     FROM centers c
     LEFT JOIN users u ON u.id = c.admin_id";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CenterInput {
    #[validate(length(min = 1, max = 255, message = "Center name is required"))]
    pub name: String,
    pub admin_id: Option<i64>,
    pub address: Option<String>,
    #[validate(length(max = 100, message = "City must be at most 100 characters"))]
    pub city: Option<String>,
    #[validate(length(max = 20, message = "Phone must be at most 20 characters"))]
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

#[instrument(skip(pool))]
pub async fn list_centers(pool: &Pool<Sqlite>, scope: ScopeFilter) -> Result<Vec<Center>, AppError> {
    info!("Listing centers");
    let mut query = QueryBuilder::<Sqlite>::new(CENTER_SELECT);
    query.push(" WHERE 1 = 1");
    scope.push_center_predicate(&mut query, "c.id");
    query.push(" ORDER BY c.name");

    Ok(query.build_query_as::<Center>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_center(pool: &Pool<Sqlite>, id: i64) -> Result<Center, AppError> {
    sqlx::query_as::<_, Center>(&format!("{} WHERE c.id = ?", CENTER_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Center", id))
}

/// A center admin owns at most one center.
async fn ensure_admin_available(
    conn: &mut SqliteConnection,
    admin_id: i64,
    center_id: Option<i64>,
) -> Result<(), AppError> {
    ensure_role(conn, admin_id, Role::CenterAdmin, "admin_id").await?;

    let owned: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM centers WHERE admin_id = ? AND (? IS NULL OR id != ?)",
    )
    .bind(admin_id)
    .bind(center_id)
    .bind(center_id)
    .fetch_optional(&mut *conn)
    .await?;

    if owned.is_some() {
        return Err(AppError::Conflict(
            "This admin already manages another center".to_string(),
        ));
    }

    Ok(())
}

#[instrument(skip(conn, input), fields(name = %input.name))]
pub async fn create_center(conn: &mut SqliteConnection, input: &CenterInput) -> Result<i64, AppError> {
    info!("Creating center");
    if let Some(admin_id) = input.admin_id {
        ensure_admin_available(conn, admin_id, None).await?;
    }

    let result = sqlx::query(
        "INSERT INTO centers (name, admin_id, address, city, phone, is_active) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&input.name)
    .bind(input.admin_id)
    .bind(&input.address)
    .bind(&input.city)
    .bind(&input.phone)
    .bind(input.is_active.unwrap_or(true))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(conn, input))]
pub async fn update_center(
    conn: &mut SqliteConnection,
    id: i64,
    input: &CenterInput,
) -> Result<(), AppError> {
    info!("Updating center");
    if let Some(admin_id) = input.admin_id {
        ensure_admin_available(conn, admin_id, Some(id)).await?;
    }

    let result = sqlx::query(
        "UPDATE centers
         SET name = ?, admin_id = ?, address = ?, city = ?, phone = ?,
             is_active = COALESCE(?, is_active), updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&input.name)
    .bind(input.admin_id)
    .bind(&input.address)
    .bind(&input.city)
    .bind(&input.phone)
    .bind(input.is_active)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Center", id));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_center(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting center");
    let result = sqlx::query("DELETE FROM centers WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Center", id));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn center_owned_by(pool: &Pool<Sqlite>, admin_id: i64) -> Result<Option<i64>, AppError> {
    Ok(
        sqlx::query_scalar("SELECT id FROM centers WHERE admin_id = ? ORDER BY id LIMIT 1")
            .bind(admin_id)
            .fetch_optional(pool)
            .await?,
    )
}
