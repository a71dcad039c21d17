use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::instrument;

use super::rates::round2;
use crate::auth::{Permission, Principal};
use crate::error::AppError;
use crate::scope::{ScopeFilter, authorize};
use crate::validation::month_of;

/// Dashboard figures. Each role gets its own fixed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "stats", rename_all = "snake_case")]
pub enum DashboardKpis {
    SuperAdmin {
        total_centers: i64,
        total_active_students: i64,
        total_teachers: i64,
        revenue_this_month: f64,
    },
    CenterAdmin {
        total_students: i64,
        total_teachers: i64,
        unpaid_fees: i64,
        today_attendance: i64,
    },
    Teacher {
        my_students: i64,
        pending_grades: i64,
        avg_student_score: f64,
    },
    Parent {
        children_count: i64,
        pending_fees: i64,
        avg_progress: f64,
    },
    Student {
        assignments_pending: i64,
        current_level: Option<String>,
        last_score: f64,
    },
}

async fn count(pool: &Pool<Sqlite>, sql: &str, id: Option<i64>) -> Result<i64, AppError> {
    let mut query = sqlx::query_scalar::<_, i64>(sql);
    if let Some(id) = id {
        query = query.bind(id);
    }
    Ok(query.fetch_one(pool).await?)
}

#[instrument(skip(pool, principal), fields(user_id = principal.id, role = %principal.role))]
pub async fn dashboard_kpis(
    pool: &Pool<Sqlite>,
    principal: &Principal,
    today: NaiveDate,
) -> Result<DashboardKpis, AppError> {
    match authorize(principal, Permission::ViewDashboard)? {
        ScopeFilter::Unrestricted { .. } => super_admin_kpis(pool, today).await,
        ScopeFilter::Center(center_id) => center_admin_kpis(pool, center_id, today).await,
        ScopeFilter::TeacherStudents(user_id) => teacher_kpis(pool, user_id).await,
        ScopeFilter::ParentChildren(user_id) => parent_kpis(pool, user_id).await,
        ScopeFilter::OwnStudent(student_id) => student_kpis(pool, student_id).await,
    }
}

async fn super_admin_kpis(pool: &Pool<Sqlite>, today: NaiveDate) -> Result<DashboardKpis, AppError> {
    let revenue_this_month: f64 = sqlx::query_scalar(
        "SELECT CAST(COALESCE(SUM(amount), 0) AS REAL) FROM fees WHERE status = 'paid' AND month = ?",
    )
    .bind(month_of(today))
    .fetch_one(pool)
    .await?;

    Ok(DashboardKpis::SuperAdmin {
        total_centers: count(pool, "SELECT COUNT(*) FROM centers", None).await?,
        total_active_students: count(
            pool,
            "SELECT COUNT(*) FROM students WHERE status = 'active'",
            None,
        )
        .await?,
        total_teachers: count(pool, "SELECT COUNT(*) FROM teachers", None).await?,
        revenue_this_month,
    })
}

async fn center_admin_kpis(
    pool: &Pool<Sqlite>,
    center_id: i64,
    today: NaiveDate,
) -> Result<DashboardKpis, AppError> {
    let today_attendance: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM attendances WHERE center_id = ? AND date = ? AND status = 'present'",
    )
    .bind(center_id)
    .bind(today)
    .fetch_one(pool)
    .await?;

    Ok(DashboardKpis::CenterAdmin {
        total_students: count(
            pool,
            "SELECT COUNT(*) FROM students WHERE center_id = ? AND status = 'active'",
            Some(center_id),
        )
        .await?,
        total_teachers: count(
            pool,
            "SELECT COUNT(*) FROM teachers WHERE center_id = ?",
            Some(center_id),
        )
        .await?,
        unpaid_fees: count(
            pool,
            "SELECT COUNT(*) FROM fees WHERE center_id = ? AND status IN ('unpaid', 'overdue')",
            Some(center_id),
        )
        .await?,
        today_attendance,
    })
}

async fn teacher_kpis(pool: &Pool<Sqlite>, user_id: i64) -> Result<DashboardKpis, AppError> {
    let avg_student_score: f64 = sqlx::query_scalar(
        "SELECT CAST(COALESCE(AVG(sub.score), 0) AS REAL)
         FROM submissions sub
         JOIN assignments a ON a.id = sub.assignment_id
         WHERE a.teacher_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(DashboardKpis::Teacher {
        my_students: count(
            pool,
            "SELECT COUNT(*) FROM students WHERE teacher_id = ?",
            Some(user_id),
        )
        .await?,
        pending_grades: count(
            pool,
            "SELECT COUNT(*)
             FROM submissions sub
             JOIN assignments a ON a.id = sub.assignment_id
             WHERE a.teacher_id = ? AND sub.status = 'pending'",
            Some(user_id),
        )
        .await?,
        avg_student_score: round2(avg_student_score),
    })
}

async fn parent_kpis(pool: &Pool<Sqlite>, user_id: i64) -> Result<DashboardKpis, AppError> {
    let avg_progress: f64 = sqlx::query_scalar(
        "SELECT CAST(COALESCE(AVG(p.average_score), 0) AS REAL)
         FROM student_progress p
         JOIN students s ON s.id = p.student_id
         WHERE s.parent_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(DashboardKpis::Parent {
        children_count: count(
            pool,
            "SELECT COUNT(*) FROM students WHERE parent_id = ?",
            Some(user_id),
        )
        .await?,
        pending_fees: count(
            pool,
            "SELECT COUNT(*)
             FROM fees f
             JOIN students s ON s.id = f.student_id
             WHERE s.parent_id = ? AND f.status IN ('unpaid', 'overdue')",
            Some(user_id),
        )
        .await?,
        avg_progress: round2(avg_progress),
    })
}

async fn student_kpis(pool: &Pool<Sqlite>, student_id: i64) -> Result<DashboardKpis, AppError> {
    let current_level: Option<String> =
        sqlx::query_scalar("SELECT current_level FROM students WHERE id = ?")
            .bind(student_id)
            .fetch_optional(pool)
            .await?
            .flatten();

    let last_score: Option<f64> = sqlx::query_scalar(
        "SELECT score FROM submissions
         WHERE student_id = ? AND status = 'graded'
         ORDER BY graded_at DESC, id DESC
         LIMIT 1",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?
    .flatten();

    Ok(DashboardKpis::Student {
        assignments_pending: count(
            pool,
            "SELECT COUNT(*) FROM assignments WHERE student_id = ? AND status = 'assigned'",
            Some(student_id),
        )
        .await?,
        current_level,
        last_score: last_score.unwrap_or(0.0),
    })
}
