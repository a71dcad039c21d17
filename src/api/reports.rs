use rocket::State;
use sqlx::{Pool, Sqlite};

use super::{student_scope, today};
use crate::auth::{Permission, Principal};
use crate::error::AppError;
use crate::reports::{
    AttendanceSummary, CenterPerformance, DashboardKpis, LevelProgression, MonthlyCollection,
    StudentDetailedReport, TeacherPerformance, attendance_summary, center_performance,
    dashboard_kpis, fee_collection_by_month, level_progression, student_detailed_report,
    teacher_performance,
};
use crate::scope::{ScopeFilter, authorize};
use crate::validation::{ApiResponse, ApiResult, month_of};

fn management_scope(
    principal: &Principal,
    center_id: Option<i64>,
) -> Result<ScopeFilter, AppError> {
    Ok(authorize(principal, Permission::ViewManagementReports)?.with_center_hint(center_id))
}

#[get("/dashboard/kpis")]
pub async fn kpis(principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<DashboardKpis> {
    Ok(ApiResponse::ok(
        "Dashboard statistics retrieved successfully",
        dashboard_kpis(db, &principal, today()).await?,
    ))
}

#[get("/reports/center-performance?<center_id>")]
pub async fn center(
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<CenterPerformance> {
    let scope = management_scope(&principal, center_id)?;

    Ok(ApiResponse::ok(
        "Center performance retrieved successfully",
        center_performance(db, scope).await?,
    ))
}

#[get("/reports/teacher-performance?<center_id>")]
pub async fn teachers(
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<TeacherPerformance>> {
    let scope = management_scope(&principal, center_id)?;

    Ok(ApiResponse::ok(
        "Teacher performance retrieved successfully",
        teacher_performance(db, scope).await?,
    ))
}

#[get("/reports/student-detailed/<id>")]
pub async fn student_detailed(
    id: i64,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<StudentDetailedReport> {
    student_scope(db, &principal, Permission::ViewProgress, id).await?;

    Ok(ApiResponse::ok(
        "Student report retrieved successfully",
        student_detailed_report(db, id).await?,
    ))
}

#[get("/reports/fee-collection?<center_id>")]
pub async fn fee_collection(
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<MonthlyCollection>> {
    let scope = management_scope(&principal, center_id)?;

    Ok(ApiResponse::ok(
        "Fee collection report retrieved successfully",
        fee_collection_by_month(db, scope).await?,
    ))
}

#[get("/reports/attendance?<month>&<center_id>")]
pub async fn attendance(
    month: Option<String>,
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AttendanceSummary> {
    let scope = management_scope(&principal, center_id)?;
    let month = month.unwrap_or_else(|| month_of(today()));

    Ok(ApiResponse::ok(
        "Attendance report retrieved successfully",
        attendance_summary(db, scope, &month).await?,
    ))
}

#[get("/reports/level-progression?<center_id>")]
pub async fn levels(
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<LevelProgression>> {
    let scope = management_scope(&principal, center_id)?;

    Ok(ApiResponse::ok(
        "Level progression retrieved successfully",
        level_progression(db, scope).await?,
    ))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        kpis,
        center,
        teachers,
        student_detailed,
        fee_collection,
        attendance,
        levels
    ]
}
