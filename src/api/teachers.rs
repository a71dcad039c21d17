use rocket::State;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::target_center;
use crate::auth::{Permission, Principal};
use crate::db::students::{StudentQuery, list_students};
use crate::db::teachers::{
    NewTeacher, TeacherChanges, assign_students, create_teacher, get_teacher, get_teacher_by_user,
    list_teachers, unassign_students, update_teacher,
};
use crate::db::users::delete_user;
use crate::error::AppError;
use crate::models::{Student, Teacher};
use crate::scope::{DenyReason, ScopeFilter, authorize};
use crate::validation::{ApiResponse, ApiResult, JsonValidateExt};

#[derive(Debug, Deserialize, Validate)]
pub struct StudentAssignment {
    pub teacher_id: i64,
    #[validate(length(min = 1, message = "Select at least one student"))]
    pub student_ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignmentCount {
    pub updated: u64,
}

#[get("/teacher?<center_id>")]
pub async fn index(
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Teacher>> {
    let scope = authorize(&principal, Permission::ManageTeachers)?.with_center_hint(center_id);

    Ok(ApiResponse::ok(
        "Teachers retrieved successfully",
        list_teachers(db, scope).await?,
    ))
}

#[post("/teacher", data = "<input>")]
pub async fn store(
    principal: Principal,
    input: Json<NewTeacher>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Teacher> {
    let scope = authorize(&principal, Permission::ManageTeachers)?;
    let input = input.validate_custom()?;
    let center_id = target_center(scope, input.center_id)?;

    let mut tx = db.begin().await?;
    let id = create_teacher(&mut tx, center_id, &input).await?;
    tx.commit().await?;

    Ok(ApiResponse::created(
        "Teacher created successfully",
        get_teacher(db, id).await?,
    ))
}

async fn teacher_in_scope(
    db: &Pool<Sqlite>,
    principal: &Principal,
    id: i64,
) -> Result<Teacher, AppError> {
    let scope = authorize(principal, Permission::ManageTeachers)?;
    let teacher = get_teacher(db, id).await?;
    scope.ensure_center(teacher.center_id)?;
    Ok(teacher)
}

#[get("/teacher/<id>")]
pub async fn show(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Teacher> {
    Ok(ApiResponse::ok(
        "Teacher retrieved successfully",
        teacher_in_scope(db, &principal, id).await?,
    ))
}

#[put("/teacher/<id>", data = "<changes>")]
pub async fn update(
    id: i64,
    principal: Principal,
    changes: Json<TeacherChanges>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Teacher> {
    let teacher = teacher_in_scope(db, &principal, id).await?;
    let changes = changes.validate_custom()?;

    let mut tx = db.begin().await?;
    update_teacher(&mut tx, &teacher, &changes).await?;
    tx.commit().await?;

    Ok(ApiResponse::ok(
        "Teacher updated successfully",
        get_teacher(db, id).await?,
    ))
}

/// Removes the teacher's user account; the profile row follows it and their
/// students lose the teacher link.
#[delete("/teacher/<id>")]
pub async fn destroy(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<()> {
    let teacher = teacher_in_scope(db, &principal, id).await?;

    let mut tx = db.begin().await?;
    delete_user(&mut tx, teacher.user_id).await?;
    tx.commit().await?;

    Ok(ApiResponse::ok("Teacher deleted successfully", ()))
}

#[post("/teacher/assign-students", data = "<request>")]
pub async fn assign(
    principal: Principal,
    request: Json<StudentAssignment>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AssignmentCount> {
    let request = request.validate_custom()?;
    let teacher = teacher_in_scope(db, &principal, request.teacher_id).await?;

    let mut tx = db.begin().await?;
    let updated = assign_students(&mut tx, &teacher, &request.student_ids).await?;
    tx.commit().await?;

    Ok(ApiResponse::ok(
        "Students assigned successfully",
        AssignmentCount { updated },
    ))
}

#[post("/teacher/unassign-students", data = "<request>")]
pub async fn unassign(
    principal: Principal,
    request: Json<StudentAssignment>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AssignmentCount> {
    let request = request.validate_custom()?;
    let teacher = teacher_in_scope(db, &principal, request.teacher_id).await?;

    let mut tx = db.begin().await?;
    let updated = unassign_students(&mut tx, &teacher, &request.student_ids).await?;
    tx.commit().await?;

    Ok(ApiResponse::ok(
        "Students unassigned successfully",
        AssignmentCount { updated },
    ))
}

/// Students of the teacher with this user id. A teacher may only ask for their own.
#[get("/teacher/<user_id>/students")]
pub async fn students(
    user_id: i64,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Student>> {
    let scope = authorize(&principal, Permission::ViewTeacherStudents)?;
    let teacher = get_teacher_by_user(db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Teacher not found".to_string()))?;

    match scope {
        ScopeFilter::TeacherStudents(own) if own == user_id => {}
        ScopeFilter::TeacherStudents(_) => {
            return Err(AppError::Forbidden(DenyReason::OutOfScope.to_string()));
        }
        other => other.ensure_center(teacher.center_id)?,
    }

    let filter = StudentQuery {
        teacher_id: Some(user_id),
        ..Default::default()
    };

    Ok(ApiResponse::ok(
        "Students retrieved successfully",
        list_students(db, scope, filter).await?,
    ))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![index, store, show, update, destroy, assign, unassign, students]
}
