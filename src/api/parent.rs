use rocket::State;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, Principal};
use crate::db::assignments::list_assignments;
use crate::db::attendance::{AttendanceQuery, list_attendance};
use crate::db::fees::{FeeQuery, list_fees};
use crate::db::students::{StudentQuery, list_students};
use crate::models::{Assignment, Attendance, Fee};
use crate::reports::{StudentDetailedReport, student_detailed_report};
use crate::scope::authorize;
use crate::validation::{ApiResponse, ApiResult};

#[get("/parent/children-reports")]
pub async fn children_reports(
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<StudentDetailedReport>> {
    let scope = authorize(&principal, Permission::ParentPortal)?;

    let children = list_students(db, scope, StudentQuery::default()).await?;
    let mut reports = Vec::with_capacity(children.len());
    for child in children {
        reports.push(student_detailed_report(db, child.id).await?);
    }

    Ok(ApiResponse::ok("Children reports retrieved successfully", reports))
}

#[get("/parent/children-fees")]
pub async fn children_fees(principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Vec<Fee>> {
    let scope = authorize(&principal, Permission::ParentPortal)?;

    Ok(ApiResponse::ok(
        "Children fees retrieved successfully",
        list_fees(db, scope, &FeeQuery::default()).await?,
    ))
}

#[get("/parent/children-assignments")]
pub async fn children_assignments(
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Assignment>> {
    let scope = authorize(&principal, Permission::ParentPortal)?;

    Ok(ApiResponse::ok(
        "Children assignments retrieved successfully",
        list_assignments(db, scope, None, None).await?,
    ))
}

#[get("/parent/children-attendance")]
pub async fn children_attendance(
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Attendance>> {
    let scope = authorize(&principal, Permission::ParentPortal)?;

    Ok(ApiResponse::ok(
        "Children attendance retrieved successfully",
        list_attendance(db, scope, AttendanceQuery::default()).await?,
    ))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        children_reports,
        children_fees,
        children_assignments,
        children_attendance
    ]
}
