//! Per-student rollup of graded work, keyed by (student, subject, level).

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::db::notifications::create_notification;
use crate::db::submissions::{Grade, get_submission, record_grade};
use crate::error::AppError;
use crate::models::{StudentProgress, Submission};

const PROGRESS_SELECT: &str = "SELECT p.id, p.student_id, p.subject_id, p.level_id, sub.name AS subject_name, l.name AS level_name,
            p.worksheets_completed, p.average_score, p.average_time, p.level_started_at,
            p.level_completed_at, p.is_level_complete
     FROM student_progress p
     JOIN subjects sub ON sub.id = p.subject_id
     JOIN levels l ON l.id = p.level_id";

/// Recomputes the progress row touched by a graded submission from every
/// graded submission of that student at the same subject and level.
///
/// The row is created on first use with `level_started_at = today`; later
/// runs never move that date and never touch the completion flags.
#[instrument(skip(conn))]
pub async fn on_submission_graded(
    conn: &mut SqliteConnection,
    submission_id: i64,
    today: NaiveDate,
) -> Result<(), AppError> {
    let key: Option<(i64, i64, i64)> = sqlx::query_as(
        "SELECT sub.student_id, w.subject_id, w.level_id
         FROM submissions sub
         JOIN assignments a ON a.id = sub.assignment_id
         JOIN worksheets w ON w.id = a.worksheet_id
         WHERE sub.id = ?",
    )
    .bind(submission_id)
    .fetch_optional(&mut *conn)
    .await?;

    let (student_id, subject_id, level_id) =
        key.ok_or_else(|| AppError::not_found("Submission", submission_id))?;

    sqlx::query(
        "INSERT INTO student_progress (student_id, subject_id, level_id, worksheets_completed,
                                       average_score, average_time, level_started_at)
         VALUES (?, ?, ?, 0, 0, 0, ?)
         ON CONFLICT (student_id, subject_id, level_id) DO NOTHING",
    )
    .bind(student_id)
    .bind(subject_id)
    .bind(level_id)
    .bind(today)
    .execute(&mut *conn)
    .await?;

    let (completed, average_score, average_time): (i64, f64, f64) = sqlx::query_as(
        "SELECT COUNT(*),
                CAST(COALESCE(AVG(sub.score), 0) AS REAL),
                CAST(COALESCE(AVG(sub.time_taken_min), 0) AS REAL)
         FROM submissions sub
         JOIN assignments a ON a.id = sub.assignment_id
         JOIN worksheets w ON w.id = a.worksheet_id
         WHERE sub.student_id = ? AND sub.status = 'graded' AND w.subject_id = ? AND w.level_id = ?",
    )
    .bind(student_id)
    .bind(subject_id)
    .bind(level_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE student_progress
         SET worksheets_completed = ?, average_score = ?, average_time = ?, updated_at = CURRENT_TIMESTAMP
         WHERE student_id = ? AND subject_id = ? AND level_id = ?",
    )
    .bind(completed)
    .bind(average_score)
    .bind(average_time)
    .bind(student_id)
    .bind(subject_id)
    .bind(level_id)
    .execute(&mut *conn)
    .await?;

    info!(
        student_id,
        subject_id,
        level_id,
        completed,
        "Progress recomputed"
    );
    Ok(())
}

/// Grades a submission in one transaction: the grade itself, the assignment
/// status, the progress rollup and a notification to the student.
#[instrument(skip(pool, submission, grade), fields(submission_id = submission.id))]
pub async fn grade_submission(
    pool: &Pool<Sqlite>,
    submission: &Submission,
    grade: &Grade,
    graded_by: i64,
    now: NaiveDateTime,
) -> Result<Submission, AppError> {
    let mut tx = pool.begin().await?;

    record_grade(&mut tx, submission, grade, graded_by, now).await?;
    on_submission_graded(&mut tx, submission.id, now.date()).await?;

    let student_user_id: i64 = sqlx::query_scalar("SELECT user_id FROM students WHERE id = ?")
        .bind(submission.student_id)
        .fetch_one(&mut *tx)
        .await?;

    create_notification(
        &mut tx,
        student_user_id,
        "Worksheet graded",
        &format!(
            "Your worksheet \"{}\" has been graded: {}",
            submission.worksheet_title, grade.score
        ),
        "grade",
        Some(json!({
            "submission_id": submission.id,
            "assignment_id": submission.assignment_id,
            "score": grade.score,
        })),
    )
    .await?;

    tx.commit().await?;
    info!("Submission graded");

    get_submission(pool, submission.id).await
}

#[instrument(skip(pool))]
pub async fn list_progress(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<Vec<StudentProgress>, AppError> {
    Ok(sqlx::query_as::<_, StudentProgress>(&format!(
        "{} WHERE p.student_id = ? ORDER BY sub.name, l.order_index",
        PROGRESS_SELECT
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await?)
}
