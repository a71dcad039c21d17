//! Read-only management summaries. Every query narrows through the caller's
//! [`ScopeFilter`]; empty sets produce zeros, never errors.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::{info, instrument};

use super::rates::{attendance_rate, fee_collection_rate, round2, submission_rate};
use crate::error::AppError;
use crate::models::FeeStatus;
use crate::scope::ScopeFilter;
use crate::validation::month_bounds;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenterStats {
    pub total_centers: i64,
    pub total_students: i64,
    pub total_teachers: i64,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenterPerformance {
    pub total_students: i64,
    pub active_students: i64,
    pub fee_collection_rate: f64,
    pub submission_rate: f64,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeacherPerformance {
    pub teacher_id: i64,
    pub user_id: i64,
    pub name: String,
    pub graded_count: i64,
    pub student_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCollection {
    pub month: String,
    pub total_expected: f64,
    pub total_collected: f64,
    pub total_records: i64,
    pub collection_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeeStatusTotal {
    pub status: FeeStatus,
    pub count: i64,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub month: String,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub total: i64,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LevelProgression {
    pub subject_id: i64,
    pub subject_name: String,
    pub level_id: i64,
    pub level_name: String,
    pub student_count: i64,
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonthlyRevenue {
    pub month: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CenterHeadcount {
    pub center_id: i64,
    pub name: String,
    pub student_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDashboard {
    pub total_centers: i64,
    pub total_center_admins: i64,
    pub total_teachers: i64,
    pub total_students: i64,
    pub total_parents: i64,
    pub total_subjects: i64,
    pub total_levels: i64,
    pub active_users: i64,
    pub inactive_users: i64,
    pub revenue_chart: Vec<MonthlyRevenue>,
    pub students_per_center: Vec<CenterHeadcount>,
}

async fn scalar_i64(pool: &Pool<Sqlite>, mut query: QueryBuilder<'_, Sqlite>) -> Result<i64, AppError> {
    Ok(query.build_query_scalar::<i64>().fetch_one(pool).await?)
}

async fn scalar_f64(pool: &Pool<Sqlite>, mut query: QueryBuilder<'_, Sqlite>) -> Result<f64, AppError> {
    Ok(query.build_query_scalar::<f64>().fetch_one(pool).await?)
}

#[instrument(skip(pool))]
pub async fn center_stats(pool: &Pool<Sqlite>, scope: ScopeFilter) -> Result<CenterStats, AppError> {
    info!("Computing center stats");

    let mut centers = QueryBuilder::new("SELECT COUNT(*) FROM centers WHERE 1 = 1");
    scope.push_center_predicate(&mut centers, "id");

    let mut students = QueryBuilder::new("SELECT COUNT(*) FROM students WHERE 1 = 1");
    scope.push_center_predicate(&mut students, "center_id");

    let mut teachers = QueryBuilder::new("SELECT COUNT(*) FROM teachers WHERE 1 = 1");
    scope.push_center_predicate(&mut teachers, "center_id");

    let mut revenue = QueryBuilder::new(
        "SELECT CAST(COALESCE(SUM(amount), 0) AS REAL) FROM fees WHERE status = 'paid'",
    );
    scope.push_center_predicate(&mut revenue, "center_id");

    Ok(CenterStats {
        total_centers: scalar_i64(pool, centers).await?,
        total_students: scalar_i64(pool, students).await?,
        total_teachers: scalar_i64(pool, teachers).await?,
        total_revenue: scalar_f64(pool, revenue).await?,
    })
}

#[instrument(skip(pool))]
pub async fn center_performance(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
) -> Result<CenterPerformance, AppError> {
    info!("Computing center performance");

    let mut total_students = QueryBuilder::new("SELECT COUNT(*) FROM students WHERE 1 = 1");
    scope.push_center_predicate(&mut total_students, "center_id");

    let mut active_students =
        QueryBuilder::new("SELECT COUNT(*) FROM students WHERE status = 'active'");
    scope.push_center_predicate(&mut active_students, "center_id");

    let mut fee_total =
        QueryBuilder::new("SELECT CAST(COALESCE(SUM(amount), 0) AS REAL) FROM fees WHERE 1 = 1");
    scope.push_center_predicate(&mut fee_total, "center_id");

    let mut fee_paid = QueryBuilder::new(
        "SELECT CAST(COALESCE(SUM(amount), 0) AS REAL) FROM fees WHERE status = 'paid'",
    );
    scope.push_center_predicate(&mut fee_paid, "center_id");

    let mut assignments = QueryBuilder::new(
        "SELECT COUNT(*) FROM assignments a JOIN students s ON s.id = a.student_id WHERE 1 = 1",
    );
    scope.push_center_predicate(&mut assignments, "s.center_id");

    let mut submissions = QueryBuilder::new(
        "SELECT COUNT(*) FROM submissions sub JOIN students s ON s.id = sub.student_id WHERE 1 = 1",
    );
    scope.push_center_predicate(&mut submissions, "s.center_id");

    let mut attendance_rows = QueryBuilder::new("SELECT COUNT(*) FROM attendances WHERE 1 = 1");
    scope.push_center_predicate(&mut attendance_rows, "center_id");

    let mut present_rows =
        QueryBuilder::new("SELECT COUNT(*) FROM attendances WHERE status = 'present'");
    scope.push_center_predicate(&mut present_rows, "center_id");

    let fee_total = scalar_f64(pool, fee_total).await?;
    let fee_paid = scalar_f64(pool, fee_paid).await?;
    let assignments = scalar_i64(pool, assignments).await?;
    let submissions = scalar_i64(pool, submissions).await?;
    let attendance_rows = scalar_i64(pool, attendance_rows).await?;
    let present_rows = scalar_i64(pool, present_rows).await?;

    Ok(CenterPerformance {
        total_students: scalar_i64(pool, total_students).await?,
        active_students: scalar_i64(pool, active_students).await?,
        fee_collection_rate: fee_collection_rate(fee_paid, fee_total),
        submission_rate: submission_rate(submissions, assignments),
        attendance_rate: attendance_rate(present_rows, attendance_rows),
    })
}

#[instrument(skip(pool))]
pub async fn teacher_performance(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
) -> Result<Vec<TeacherPerformance>, AppError> {
    info!("Computing teacher performance");
    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT t.id AS teacher_id, t.user_id, u.name,
                (SELECT COUNT(*) FROM submissions sub
                 WHERE sub.graded_by = t.user_id AND sub.status = 'graded') AS graded_count,
                (SELECT COUNT(*) FROM students s WHERE s.teacher_id = t.user_id) AS student_count
         FROM teachers t
         JOIN users u ON u.id = t.user_id
         WHERE 1 = 1",
    );
    scope.push_center_predicate(&mut query, "t.center_id");
    query.push(" ORDER BY u.name");

    Ok(query
        .build_query_as::<TeacherPerformance>()
        .fetch_all(pool)
        .await?)
}

#[instrument(skip(pool))]
pub async fn fee_collection_by_month(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
) -> Result<Vec<MonthlyCollection>, AppError> {
    info!("Computing fee collection report");
    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT f.month,
                CAST(COALESCE(SUM(f.amount), 0) AS REAL),
                CAST(COALESCE(SUM(CASE WHEN f.status = 'paid' THEN f.amount END), 0) AS REAL),
                COUNT(*)
         FROM fees f
         JOIN students s ON s.id = f.student_id
         WHERE 1 = 1",
    );
    scope.push_predicate(&mut query, "s", "f.center_id");
    query.push(" GROUP BY f.month ORDER BY f.month DESC");

    let rows: Vec<(String, f64, f64, i64)> = query.build_query_as().fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(
            |(month, total_expected, total_collected, total_records)| MonthlyCollection {
                month,
                total_expected,
                total_collected,
                total_records,
                collection_rate: fee_collection_rate(total_collected, total_expected),
            },
        )
        .collect())
}

#[instrument(skip(pool))]
pub async fn fee_status_report(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
) -> Result<Vec<FeeStatusTotal>, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT f.status, COUNT(*) AS count, CAST(COALESCE(SUM(f.amount), 0) AS REAL) AS total_amount
         FROM fees f
         JOIN students s ON s.id = f.student_id
         WHERE 1 = 1",
    );
    scope.push_predicate(&mut query, "s", "f.center_id");
    query.push(" GROUP BY f.status ORDER BY f.status");

    Ok(query.build_query_as::<FeeStatusTotal>().fetch_all(pool).await?)
}

/// Per-status attendance counts for a `YYYY-MM` month.
#[instrument(skip(pool))]
pub async fn attendance_summary(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
    month: &str,
) -> Result<AttendanceSummary, AppError> {
    info!("Computing attendance summary");
    let (first, last) = month_bounds(month)?;

    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT COALESCE(SUM(at.status = 'present'), 0),
                COALESCE(SUM(at.status = 'absent'), 0),
                COALESCE(SUM(at.status = 'late'), 0),
                COUNT(*)
         FROM attendances at
         JOIN students s ON s.id = at.student_id
         WHERE at.date BETWEEN ",
    );
    query.push_bind(first).push(" AND ").push_bind(last);
    scope.push_predicate(&mut query, "s", "at.center_id");

    let (present, absent, late, total): (i64, i64, i64, i64) =
        query.build_query_as().fetch_one(pool).await?;

    Ok(AttendanceSummary {
        month: month.to_string(),
        present,
        absent,
        late,
        total,
        attendance_rate: attendance_rate(present, total),
    })
}

#[instrument(skip(pool))]
pub async fn level_progression(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
) -> Result<Vec<LevelProgression>, AppError> {
    info!("Computing level progression");
    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT p.subject_id, sub.name AS subject_name, p.level_id, l.name AS level_name,
                COUNT(DISTINCT p.student_id) AS student_count,
                CAST(COALESCE(AVG(p.average_score), 0) AS REAL) AS avg_score
         FROM student_progress p
         JOIN students s ON s.id = p.student_id
         JOIN subjects sub ON sub.id = p.subject_id
         JOIN levels l ON l.id = p.level_id
         WHERE 1 = 1",
    );
    scope.push_student_predicate(&mut query, "s");
    query.push(" GROUP BY p.subject_id, p.level_id ORDER BY sub.name, l.order_index");

    let mut rows = query
        .build_query_as::<LevelProgression>()
        .fetch_all(pool)
        .await?;
    for row in &mut rows {
        row.avg_score = round2(row.avg_score);
    }
    Ok(rows)
}

/// System-wide figures for the super admin landing page. The revenue chart
/// covers the six calendar months ending with `today`'s month.
#[instrument(skip(pool))]
pub async fn system_dashboard(
    pool: &Pool<Sqlite>,
    today: NaiveDate,
) -> Result<SystemDashboard, AppError> {
    info!("Computing system dashboard");

    async fn count(pool: &Pool<Sqlite>, sql: &str) -> Result<i64, AppError> {
        Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await?)
    }

    let month_start = today.with_day(1).unwrap_or(today);
    let chart_start = month_start
        .checked_sub_months(Months::new(5))
        .unwrap_or(month_start);

    let revenue_chart = sqlx::query_as::<_, MonthlyRevenue>(
        "SELECT strftime('%Y-%m', paid_date) AS month,
                CAST(SUM(amount) AS REAL) AS revenue
         FROM fees
         WHERE status = 'paid' AND paid_date IS NOT NULL AND paid_date >= ?
         GROUP BY month
         ORDER BY month",
    )
    .bind(chart_start)
    .fetch_all(pool)
    .await?;

    let students_per_center = sqlx::query_as::<_, CenterHeadcount>(
        "SELECT c.id AS center_id, c.name,
                (SELECT COUNT(*) FROM students s WHERE s.center_id = c.id) AS student_count
         FROM centers c
         ORDER BY c.name",
    )
    .fetch_all(pool)
    .await?;

    Ok(SystemDashboard {
        total_centers: count(pool, "SELECT COUNT(*) FROM centers").await?,
        total_center_admins: count(pool, "SELECT COUNT(*) FROM users WHERE role = 'center_admin'")
            .await?,
        total_teachers: count(pool, "SELECT COUNT(*) FROM teachers").await?,
        total_students: count(pool, "SELECT COUNT(*) FROM students").await?,
        total_parents: count(pool, "SELECT COUNT(*) FROM users WHERE role = 'parent'").await?,
        total_subjects: count(pool, "SELECT COUNT(*) FROM subjects").await?,
        total_levels: count(pool, "SELECT COUNT(*) FROM levels").await?,
        active_users: count(pool, "SELECT COUNT(*) FROM users WHERE is_active = TRUE").await?,
        inactive_users: count(pool, "SELECT COUNT(*) FROM users WHERE is_active = FALSE").await?,
        revenue_chart,
        students_per_center,
    })
}
