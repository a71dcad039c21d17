use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use super::rates::attendance_rate;
use crate::db::assignments::recent_assignments;
use crate::db::students::get_student;
use crate::db::submissions::recent_graded;
use crate::error::AppError;
use crate::models::{Assignment, Student, StudentProgress, Submission};
use crate::progress::list_progress;

const RECENT_GRADED_LIMIT: i64 = 10;
const RECENT_ASSIGNMENT_LIMIT: i64 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub total: i64,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentCounts {
    pub total: i64,
    pub assigned: i64,
    pub submitted: i64,
    pub graded: i64,
    pub returned: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentDetailedReport {
    pub student: Student,
    pub attendance: AttendanceStats,
    pub assignments: AssignmentCounts,
    pub progress: Vec<StudentProgress>,
    pub recent_submissions: Vec<Submission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentDashboard {
    pub assignments: AssignmentCounts,
    pub recent_assignments: Vec<Assignment>,
    pub progress: Vec<StudentProgress>,
}

pub async fn attendance_stats(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<AttendanceStats, AppError> {
    let (total, present, absent, late): (i64, i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'present'), 0),
                COALESCE(SUM(status = 'absent'), 0),
                COALESCE(SUM(status = 'late'), 0)
         FROM attendances WHERE student_id = ?",
    )
    .bind(student_id)
    .fetch_one(pool)
    .await?;

    Ok(AttendanceStats {
        total,
        present,
        absent,
        late,
        attendance_rate: attendance_rate(present, total),
    })
}

pub async fn assignment_counts(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<AssignmentCounts, AppError> {
    let (total, assigned, submitted, graded, returned): (i64, i64, i64, i64, i64) =
        sqlx::query_as(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'assigned'), 0),
                    COALESCE(SUM(status = 'submitted'), 0),
                    COALESCE(SUM(status = 'graded'), 0),
                    COALESCE(SUM(status = 'returned'), 0)
             FROM assignments WHERE student_id = ?",
        )
        .bind(student_id)
        .fetch_one(pool)
        .await?;

    Ok(AssignmentCounts {
        total,
        assigned,
        submitted,
        graded,
        returned,
    })
}

/// Everything known about one student. Callers check scope first.
#[instrument(skip(pool))]
pub async fn student_detailed_report(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<StudentDetailedReport, AppError> {
    info!("Building student report");
    let student = get_student(pool, student_id).await?;

    Ok(StudentDetailedReport {
        attendance: attendance_stats(pool, student.id).await?,
        assignments: assignment_counts(pool, student.id).await?,
        progress: list_progress(pool, student.id).await?,
        recent_submissions: recent_graded(pool, student.id, RECENT_GRADED_LIMIT).await?,
        student,
    })
}

#[instrument(skip(pool))]
pub async fn student_dashboard(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<StudentDashboard, AppError> {
    Ok(StudentDashboard {
        assignments: assignment_counts(pool, student_id).await?,
        recent_assignments: recent_assignments(pool, student_id, RECENT_ASSIGNMENT_LIMIT).await?,
        progress: list_progress(pool, student_id).await?,
    })
}
