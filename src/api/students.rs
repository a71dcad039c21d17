use rocket::State;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use super::{student_scope, target_center};
use crate::auth::{Permission, Principal};
use crate::db::assignments::list_assignments;
use crate::db::attendance::{AttendanceQuery, list_attendance};
use crate::db::fees::{FeeQuery, list_fees};
use crate::db::students::{
    NewStudent, StudentChanges, StudentQuery, create_student, get_student, list_students,
    update_student,
};
use crate::db::users::delete_user;
use crate::error::AppError;
use crate::models::{Assignment, Attendance, Fee, Student, StudentProgress};
use crate::progress::list_progress;
use crate::reports::{StudentDashboard, StudentDetailedReport, student_dashboard, student_detailed_report};
use crate::scope::{DenyReason, ScopeFilter, authorize};
use crate::validation::{ApiResponse, ApiResult, JsonValidateExt, parse_optional_choice};

#[get("/student?<status>&<teacher_id>&<center_id>")]
pub async fn index(
    status: Option<&str>,
    teacher_id: Option<i64>,
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Student>> {
    let scope = authorize(&principal, Permission::ListStudents)?.with_center_hint(center_id);
    let filter = StudentQuery {
        status: parse_optional_choice("status", status)?,
        teacher_id,
    };

    Ok(ApiResponse::ok(
        "Students retrieved successfully",
        list_students(db, scope, filter).await?,
    ))
}

#[post("/student", data = "<input>")]
pub async fn store(
    principal: Principal,
    input: Json<NewStudent>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Student> {
    let scope = authorize(&principal, Permission::ManageStudents)?;
    let input = input.validate_custom()?;
    let center_id = target_center(scope, input.center_id)?;

    let mut tx = db.begin().await?;
    let id = create_student(&mut tx, center_id, &input).await?;
    tx.commit().await?;

    Ok(ApiResponse::created(
        "Student created successfully",
        get_student(db, id).await?,
    ))
}

#[get("/student/<id>")]
pub async fn show(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Student> {
    student_scope(db, &principal, Permission::ViewStudents, id).await?;

    Ok(ApiResponse::ok(
        "Student retrieved successfully",
        get_student(db, id).await?,
    ))
}

#[put("/student/<id>", data = "<changes>")]
pub async fn update(
    id: i64,
    principal: Principal,
    changes: Json<StudentChanges>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Student> {
    student_scope(db, &principal, Permission::EditStudents, id).await?;
    let changes = changes.validate_custom()?;
    let student = get_student(db, id).await?;

    let mut tx = db.begin().await?;
    update_student(&mut tx, &student, &changes).await?;
    tx.commit().await?;

    Ok(ApiResponse::ok(
        "Student updated successfully",
        get_student(db, id).await?,
    ))
}

/// Deletes the student's user account and, through it, everything hanging
/// off the student.
#[delete("/student/<id>")]
pub async fn destroy(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<()> {
    student_scope(db, &principal, Permission::ManageStudents, id).await?;
    let student = get_student(db, id).await?;

    let mut tx = db.begin().await?;
    delete_user(&mut tx, student.user_id).await?;
    tx.commit().await?;

    Ok(ApiResponse::ok("Student deleted successfully", ()))
}

#[get("/student/<id>/progress")]
pub async fn progress(
    id: i64,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<StudentProgress>> {
    student_scope(db, &principal, Permission::ViewProgress, id).await?;

    Ok(ApiResponse::ok(
        "Progress retrieved successfully",
        list_progress(db, id).await?,
    ))
}

#[get("/student/<id>/assignments")]
pub async fn assignments(
    id: i64,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Assignment>> {
    let scope = student_scope(db, &principal, Permission::ViewStudents, id).await?;

    Ok(ApiResponse::ok(
        "Assignments retrieved successfully",
        list_assignments(db, scope, None, Some(id)).await?,
    ))
}

#[get("/student/<id>/attendance")]
pub async fn attendance(
    id: i64,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Attendance>> {
    let scope = student_scope(db, &principal, Permission::ViewAttendance, id).await?;
    let filter = AttendanceQuery {
        student_id: Some(id),
        ..Default::default()
    };

    Ok(ApiResponse::ok(
        "Attendance retrieved successfully",
        list_attendance(db, scope, filter).await?,
    ))
}

#[get("/student/<id>/fees")]
pub async fn fees(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Vec<Fee>> {
    let scope = student_scope(db, &principal, Permission::ViewStudentFees, id).await?;
    let filter = FeeQuery {
        student_id: Some(id),
        ..Default::default()
    };

    Ok(ApiResponse::ok(
        "Fees retrieved successfully",
        list_fees(db, scope, &filter).await?,
    ))
}

#[get("/student/<id>/report")]
pub async fn report(
    id: i64,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<StudentDetailedReport> {
    student_scope(db, &principal, Permission::ViewStudents, id).await?;

    Ok(ApiResponse::ok(
        "Student report generated successfully",
        student_detailed_report(db, id).await?,
    ))
}

fn own_student(principal: &Principal) -> Result<(ScopeFilter, i64), AppError> {
    match authorize(principal, Permission::StudentPortal)? {
        ScopeFilter::OwnStudent(student_id) => Ok((ScopeFilter::OwnStudent(student_id), student_id)),
        _ => Err(AppError::Forbidden(DenyReason::RoleNotPermitted.to_string())),
    }
}

#[get("/student/my-assignments?<status>")]
pub async fn my_assignments(
    status: Option<&str>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Assignment>> {
    let (scope, _) = own_student(&principal)?;
    let status = parse_optional_choice("status", status)?;

    Ok(ApiResponse::ok(
        "Assignments retrieved successfully",
        list_assignments(db, scope, status, None).await?,
    ))
}

#[get("/student/dashboard")]
pub async fn dashboard(
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<StudentDashboard> {
    let (_, student_id) = own_student(&principal)?;

    Ok(ApiResponse::ok(
        "Dashboard retrieved successfully",
        student_dashboard(db, student_id).await?,
    ))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        index,
        store,
        show,
        update,
        destroy,
        progress,
        assignments,
        attendance,
        fees,
        report,
        my_assignments,
        dashboard
    ]
}
