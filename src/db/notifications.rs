use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Notification;

#[instrument(skip(conn, message, data))]
pub async fn create_notification(
    conn: &mut SqliteConnection,
    user_id: i64,
    title: &str,
    message: &str,
    kind: &str,
    data: Option<serde_json::Value>,
) -> Result<i64, AppError> {
    info!("Creating notification");
    let data = data.map(|value| value.to_string());

    let result = sqlx::query(
        "INSERT INTO notifications (user_id, title, message, type, data) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(title)
    .bind(message)
    .bind(kind)
    .bind(data)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_notifications(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<Notification>, AppError> {
    Ok(sqlx::query_as::<_, Notification>(
        "SELECT id, user_id, title, message, type, is_read, data, created_at
         FROM notifications WHERE user_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

/// Marks one of the user's own notifications as read.
#[instrument(skip(pool))]
pub async fn mark_read(pool: &Pool<Sqlite>, id: i64, user_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Notification", id));
    }

    Ok(())
}
