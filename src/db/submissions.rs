use chrono::NaiveDateTime;
use serde::Deserialize;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};
use validator::Validate;

use crate::db::assignments::advance_assignment_status;
use crate::error::AppError;
use crate::models::{Assignment, AssignmentStatus, Submission, SubmissionStatus};
use crate::scope::ScopeFilter;

const SUBMISSION_SELECT: &str = "SELECT sub.id, sub.assignment_id, sub.student_id, sub.submitted_file, sub.submitted_at,
            sub.score, sub.time_taken_min, sub.error_count, sub.teacher_feedback, sub.graded_by,
            sub.graded_at, sub.status, u.name AS student_name, w.title AS worksheet_title
     FROM submissions sub
     JOIN students s ON s.id = sub.student_id
     JOIN users u ON u.id = s.user_id
     JOIN assignments a ON a.id = sub.assignment_id
     JOIN worksheets w ON w.id = a.worksheet_id";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Grade {
    #[validate(range(min = 0.0, max = 100.0, message = "Score must be between 0 and 100"))]
    pub score: f64,
    #[validate(range(min = 0, message = "Error count cannot be negative"))]
    #[serde(default)]
    pub error_count: i64,
    #[validate(length(max = 2000, message = "Feedback must be at most 2000 characters"))]
    pub teacher_feedback: Option<String>,
}

#[instrument(skip(pool))]
pub async fn list_submissions(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
    status: Option<SubmissionStatus>,
) -> Result<Vec<Submission>, AppError> {
    info!("Listing submissions");
    let mut query = QueryBuilder::<Sqlite>::new(SUBMISSION_SELECT);
    query.push(" WHERE 1 = 1");
    scope.push_student_predicate(&mut query, "s");

    if let Some(status) = status {
        query.push(" AND sub.status = ").push_bind(status);
    }
    query.push(" ORDER BY sub.submitted_at DESC, sub.id DESC");

    Ok(query.build_query_as::<Submission>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_submission(pool: &Pool<Sqlite>, id: i64) -> Result<Submission, AppError> {
    sqlx::query_as::<_, Submission>(&format!("{} WHERE sub.id = ?", SUBMISSION_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Submission", id))
}

#[instrument(skip(pool))]
pub async fn get_submission_for_assignment(
    pool: &Pool<Sqlite>,
    assignment_id: i64,
) -> Result<Option<Submission>, AppError> {
    Ok(
        sqlx::query_as::<_, Submission>(&format!("{} WHERE sub.assignment_id = ?", SUBMISSION_SELECT))
            .bind(assignment_id)
            .fetch_optional(pool)
            .await?,
    )
}

/// Records a hand-in and moves the assignment to `submitted`. One submission
/// per assignment.
#[instrument(skip(conn, submitted_file))]
pub async fn create_submission(
    conn: &mut SqliteConnection,
    assignment: &Assignment,
    submitted_file: Option<&str>,
    time_taken_min: Option<i64>,
    now: NaiveDateTime,
) -> Result<i64, AppError> {
    info!(assignment_id = assignment.id, "Creating submission");
    if assignment.status != AssignmentStatus::Assigned {
        return Err(AppError::Conflict(
            "This assignment has already been submitted".to_string(),
        ));
    }

    let result = sqlx::query(
        "INSERT INTO submissions (assignment_id, student_id, submitted_file, submitted_at, time_taken_min, status)
         VALUES (?, ?, ?, ?, ?, 'pending')",
    )
    .bind(assignment.id)
    .bind(assignment.student_id)
    .bind(submitted_file)
    .bind(now)
    .bind(time_taken_min)
    .execute(&mut *conn)
    .await
    .map_err(|err| {
        AppError::on_unique_violation(err, "This assignment has already been submitted")
    })?;

    advance_assignment_status(conn, assignment.id, AssignmentStatus::Submitted).await?;

    Ok(result.last_insert_rowid())
}

/// Writes the grade onto the submission and its assignment. Progress and
/// notification side effects are the caller's.
#[instrument(skip(conn, grade))]
pub async fn record_grade(
    conn: &mut SqliteConnection,
    submission: &Submission,
    grade: &Grade,
    graded_by: i64,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    info!("Recording grade");
    sqlx::query(
        "UPDATE submissions
         SET score = ?, error_count = ?, teacher_feedback = ?, graded_by = ?, graded_at = ?,
             status = 'graded', updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(grade.score)
    .bind(grade.error_count)
    .bind(&grade.teacher_feedback)
    .bind(graded_by)
    .bind(now)
    .bind(submission.id)
    .execute(&mut *conn)
    .await?;

    advance_assignment_status(conn, submission.assignment_id, AssignmentStatus::Graded).await?;

    Ok(())
}

/// The student's latest graded submissions, newest grade first.
#[instrument(skip(pool))]
pub async fn recent_graded(
    pool: &Pool<Sqlite>,
    student_id: i64,
    limit: i64,
) -> Result<Vec<Submission>, AppError> {
    Ok(sqlx::query_as::<_, Submission>(&format!(
        "{} WHERE sub.student_id = ? AND sub.status = 'graded' ORDER BY sub.graded_at DESC, sub.id DESC LIMIT ?",
        SUBMISSION_SELECT
    ))
    .bind(student_id)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}
