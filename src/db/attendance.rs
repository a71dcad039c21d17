use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};
use validator::Validate;

use crate::error::AppError;
use crate::models::{Attendance, AttendanceStatus};
use crate::scope::ScopeFilter;

const ATTENDANCE_SELECT: &str = "SELECT at.id, at.student_id, at.center_id, at.date, at.status, at.marked_by, at.notes,
            u.name AS student_name
     FROM attendances at
     JOIN students s ON s.id = at.student_id
     JOIN users u ON u.id = s.user_id";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AttendanceLine {
    pub student_id: i64,
    pub status: AttendanceStatus,
    #[validate(length(max = 500, message = "Notes must be at most 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AttendanceSheet {
    pub date: NaiveDate,
    #[validate(length(min = 1, message = "At least one attendance entry is required"))]
    #[validate(nested)]
    pub attendance: Vec<AttendanceLine>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AttendanceCorrection {
    pub status: AttendanceStatus,
    #[validate(length(max = 500, message = "Notes must be at most 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AttendanceQuery {
    pub student_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Inserts or overwrites the (student, date) row. The center is taken from
/// the student when the row is first created.
#[instrument(skip(conn, line))]
pub async fn upsert_attendance(
    conn: &mut SqliteConnection,
    center_id: i64,
    date: NaiveDate,
    line: &AttendanceLine,
    marked_by: i64,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO attendances (student_id, center_id, date, status, marked_by, notes)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (student_id, date) DO UPDATE
         SET status = excluded.status, marked_by = excluded.marked_by, notes = excluded.notes,
             updated_at = CURRENT_TIMESTAMP",
    )
    .bind(line.student_id)
    .bind(center_id)
    .bind(date)
    .bind(line.status)
    .bind(marked_by)
    .bind(&line.notes)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_attendance(pool: &Pool<Sqlite>, id: i64) -> Result<Attendance, AppError> {
    sqlx::query_as::<_, Attendance>(&format!("{} WHERE at.id = ?", ATTENDANCE_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Attendance", id))
}

#[instrument(skip(pool, correction))]
pub async fn correct_attendance(
    pool: &Pool<Sqlite>,
    id: i64,
    correction: &AttendanceCorrection,
    marked_by: i64,
) -> Result<Attendance, AppError> {
    info!("Correcting attendance");
    sqlx::query(
        "UPDATE attendances SET status = ?, notes = COALESCE(?, notes), marked_by = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(correction.status)
    .bind(&correction.notes)
    .bind(marked_by)
    .bind(id)
    .execute(pool)
    .await?;

    get_attendance(pool, id).await
}

#[instrument(skip(pool))]
pub async fn list_attendance(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
    filter: AttendanceQuery,
) -> Result<Vec<Attendance>, AppError> {
    info!("Listing attendance");
    let mut query = QueryBuilder::<Sqlite>::new(ATTENDANCE_SELECT);
    query.push(" WHERE 1 = 1");
    scope.push_predicate(&mut query, "s", "at.center_id");

    if let Some(student_id) = filter.student_id {
        query.push(" AND at.student_id = ").push_bind(student_id);
    }
    if let Some(from) = filter.from {
        query.push(" AND at.date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND at.date <= ").push_bind(to);
    }
    query.push(" ORDER BY at.date DESC, u.name");

    Ok(query.build_query_as::<Attendance>().fetch_all(pool).await?)
}
