use rocket::State;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};

use super::{student_scope, today};
use crate::auth::{Permission, Principal};
use crate::db::attendance::{
    AttendanceCorrection, AttendanceQuery, AttendanceSheet, correct_attendance, get_attendance,
    list_attendance, upsert_attendance,
};
use crate::db::students::ownership;
use crate::models::Attendance;
use crate::reports::{AttendanceSummary, attendance_summary};
use crate::scope::authorize;
use crate::validation::{ApiResponse, ApiResult, JsonValidateExt, month_bounds, month_of};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarkedCount {
    pub marked: usize,
}

/// Marks a whole sheet in one transaction. Every student on the sheet is
/// checked against the caller's scope before the first row is written.
#[post("/attendance/bulk", data = "<sheet>")]
pub async fn bulk(
    principal: Principal,
    sheet: Json<AttendanceSheet>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<MarkedCount> {
    let scope = authorize(&principal, Permission::MarkAttendance)?;
    let sheet = sheet.validate_custom()?;

    let mut owners = Vec::with_capacity(sheet.attendance.len());
    for line in &sheet.attendance {
        let owner = ownership(db, line.student_id).await?;
        scope.ensure(&owner)?;
        owners.push(owner);
    }

    let mut tx = db.begin().await?;
    for (line, owner) in sheet.attendance.iter().zip(&owners) {
        upsert_attendance(&mut tx, owner.center_id, sheet.date, line, principal.id).await?;
    }
    tx.commit().await?;

    tracing::info!(date = %sheet.date, count = owners.len(), "Attendance marked");
    Ok(ApiResponse::ok(
        "Attendance marked successfully",
        MarkedCount {
            marked: owners.len(),
        },
    ))
}

#[put("/attendance/<id>", data = "<correction>")]
pub async fn update(
    id: i64,
    principal: Principal,
    correction: Json<AttendanceCorrection>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Attendance> {
    let attendance = get_attendance(db, id).await?;
    student_scope(db, &principal, Permission::MarkAttendance, attendance.student_id).await?;
    let correction = correction.validate_custom()?;

    Ok(ApiResponse::ok(
        "Attendance updated successfully",
        correct_attendance(db, id, &correction, principal.id).await?,
    ))
}

#[get("/attendance?<student_id>&<month>")]
pub async fn index(
    student_id: Option<i64>,
    month: Option<&str>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Attendance>> {
    let scope = authorize(&principal, Permission::ViewAttendance)?;
    if let Some(student_id) = student_id {
        scope.ensure(&ownership(db, student_id).await?)?;
    }

    let mut filter = AttendanceQuery {
        student_id,
        ..AttendanceQuery::default()
    };
    if let Some(month) = month {
        let (from, to) = month_bounds(month)?;
        filter.from = Some(from);
        filter.to = Some(to);
    }

    Ok(ApiResponse::ok(
        "Attendance retrieved successfully",
        list_attendance(db, scope, filter).await?,
    ))
}

#[get("/attendance/today?<center_id>")]
pub async fn today_sheet(
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Attendance>> {
    let scope = authorize(&principal, Permission::MarkAttendance)?.with_center_hint(center_id);
    let today = today();

    Ok(ApiResponse::ok(
        "Today's attendance retrieved successfully",
        list_attendance(
            db,
            scope,
            AttendanceQuery {
                student_id: None,
                from: Some(today),
                to: Some(today),
            },
        )
        .await?,
    ))
}

#[get("/attendance/summary?<center_id>&<month>")]
pub async fn summary(
    center_id: Option<i64>,
    month: Option<String>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AttendanceSummary> {
    let scope = authorize(&principal, Permission::AttendanceSummary)?.with_center_hint(center_id);
    let month = month.unwrap_or_else(|| month_of(today()));

    Ok(ApiResponse::ok(
        "Attendance summary retrieved successfully",
        attendance_summary(db, scope, &month).await?,
    ))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![bulk, update, index, today_sheet, summary]
}
