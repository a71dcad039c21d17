use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};
use validator::Validate;

use crate::error::AppError;
use crate::models::{Assignment, AssignmentStatus};
use crate::scope::ScopeFilter;

const ASSIGNMENT_SELECT: &str = "SELECT a.id, a.student_id, a.worksheet_id, a.teacher_id, a.assigned_date, a.due_date,
            a.status, a.notes, u.name AS student_name, w.title AS worksheet_title, a.created_at
     FROM assignments a
     JOIN students s ON s.id = a.student_id
     JOIN users u ON u.id = s.user_id
     JOIN worksheets w ON w.id = a.worksheet_id";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BulkAssignment {
    pub worksheet_id: i64,
    #[validate(length(min = 1, message = "Select at least one student"))]
    pub student_ids: Vec<i64>,
    pub due_date: Option<NaiveDate>,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Validate)]
pub struct AssignmentChanges {
    pub due_date: Option<NaiveDate>,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
    pub status: Option<AssignmentStatus>,
}

#[instrument(skip(pool))]
pub async fn list_assignments(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
    status: Option<AssignmentStatus>,
    student_id: Option<i64>,
) -> Result<Vec<Assignment>, AppError> {
    info!("Listing assignments");
    let mut query = QueryBuilder::<Sqlite>::new(ASSIGNMENT_SELECT);
    query.push(" WHERE 1 = 1");
    scope.push_student_predicate(&mut query, "s");

    if let Some(status) = status {
        query.push(" AND a.status = ").push_bind(status);
    }
    if let Some(student_id) = student_id {
        query.push(" AND a.student_id = ").push_bind(student_id);
    }
    query.push(" ORDER BY a.assigned_date DESC, a.id DESC");

    Ok(query.build_query_as::<Assignment>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_assignment(pool: &Pool<Sqlite>, id: i64) -> Result<Assignment, AppError> {
    sqlx::query_as::<_, Assignment>(&format!("{} WHERE a.id = ?", ASSIGNMENT_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Assignment", id))
}

/// Assigns one worksheet to several students. Nothing is written when any
/// student already has an open assignment for the worksheet.
#[instrument(skip(conn, request), fields(worksheet_id = request.worksheet_id))]
pub async fn create_assignments(
    conn: &mut SqliteConnection,
    request: &BulkAssignment,
    teacher_id: i64,
    assigned_date: NaiveDate,
) -> Result<Vec<i64>, AppError> {
    info!(count = request.student_ids.len(), "Creating assignments");

    let worksheet: Option<i64> = sqlx::query_scalar("SELECT id FROM worksheets WHERE id = ?")
        .bind(request.worksheet_id)
        .fetch_optional(&mut *conn)
        .await?;
    if worksheet.is_none() {
        return Err(AppError::invalid("worksheet_id", "Worksheet does not exist"));
    }

    let mut ids = Vec::with_capacity(request.student_ids.len());
    for student_id in &request.student_ids {
        let open: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM assignments
             WHERE student_id = ? AND worksheet_id = ? AND status IN ('assigned', 'submitted')",
        )
        .bind(student_id)
        .bind(request.worksheet_id)
        .fetch_optional(&mut *conn)
        .await?;

        if open.is_some() {
            return Err(AppError::Conflict(format!(
                "Student {} already has this worksheet open",
                student_id
            )));
        }

        let result = sqlx::query(
            "INSERT INTO assignments (student_id, worksheet_id, teacher_id, assigned_date, due_date, status, notes)
             VALUES (?, ?, ?, ?, ?, 'assigned', ?)",
        )
        .bind(student_id)
        .bind(request.worksheet_id)
        .bind(teacher_id)
        .bind(assigned_date)
        .bind(request.due_date)
        .bind(&request.notes)
        .execute(&mut *conn)
        .await?;

        ids.push(result.last_insert_rowid());
    }

    Ok(ids)
}

#[instrument(skip(pool, changes))]
pub async fn update_assignment(
    pool: &Pool<Sqlite>,
    assignment: &Assignment,
    changes: &AssignmentChanges,
) -> Result<Assignment, AppError> {
    info!("Updating assignment");
    if let Some(next) = changes.status {
        if !assignment.status.can_be_set_to(next) {
            return Err(AppError::Conflict(format!(
                "Assignment cannot move from {:?} to {:?}",
                assignment.status, next
            )));
        }
    }

    sqlx::query(
        "UPDATE assignments
         SET due_date = COALESCE(?, due_date), notes = COALESCE(?, notes),
             status = COALESCE(?, status), updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(changes.due_date)
    .bind(&changes.notes)
    .bind(changes.status)
    .bind(assignment.id)
    .execute(pool)
    .await?;

    get_assignment(pool, assignment.id).await
}

/// Moves an assignment forward to `status`. An assignment already past it
/// keeps its status.
pub async fn advance_assignment_status(
    conn: &mut SqliteConnection,
    assignment_id: i64,
    status: AssignmentStatus,
) -> Result<(), AppError> {
    let current: AssignmentStatus =
        sqlx::query_scalar("SELECT status FROM assignments WHERE id = ?")
            .bind(assignment_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::not_found("Assignment", assignment_id))?;
    if !current.can_move_to(status) {
        return Ok(());
    }

    sqlx::query("UPDATE assignments SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(status)
        .bind(assignment_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Cancels an assignment. Only allowed while nothing has been handed in.
#[instrument(skip(pool))]
pub async fn cancel_assignment(pool: &Pool<Sqlite>, assignment: &Assignment) -> Result<(), AppError> {
    info!("Cancelling assignment");
    if assignment.status != AssignmentStatus::Assigned {
        return Err(AppError::Conflict(
            "Only assignments that have not been submitted can be cancelled".to_string(),
        ));
    }

    sqlx::query("DELETE FROM assignments WHERE id = ? AND status = 'assigned'")
        .bind(assignment.id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn recent_assignments(
    pool: &Pool<Sqlite>,
    student_id: i64,
    limit: i64,
) -> Result<Vec<Assignment>, AppError> {
    Ok(sqlx::query_as::<_, Assignment>(&format!(
        "{} WHERE a.student_id = ? ORDER BY a.assigned_date DESC, a.id DESC LIMIT ?",
        ASSIGNMENT_SELECT
    ))
    .bind(student_id)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}
