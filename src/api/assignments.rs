use rocket::State;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use super::{student_scope, today};
use crate::auth::{Permission, Principal};
use crate::db::assignments::{
    AssignmentChanges, BulkAssignment, cancel_assignment, create_assignments, get_assignment,
    list_assignments, update_assignment,
};
use crate::db::students::ownership;
use crate::models::Assignment;
use crate::scope::authorize;
use crate::validation::{ApiResponse, ApiResult, JsonValidateExt, parse_optional_choice};

#[get("/assignment?<status>&<center_id>")]
pub async fn index(
    status: Option<&str>,
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Assignment>> {
    let scope = authorize(&principal, Permission::ViewAssignments)?.with_center_hint(center_id);
    let status = parse_optional_choice("status", status)?;

    Ok(ApiResponse::ok(
        "Assignments retrieved successfully",
        list_assignments(db, scope, status, None).await?,
    ))
}

/// Assigns a worksheet to several students at once. Every student must be in
/// scope before anything is written.
#[post("/assignment", data = "<request>")]
pub async fn store(
    principal: Principal,
    request: Json<BulkAssignment>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Assignment>> {
    let scope = authorize(&principal, Permission::AssignWorksheets)?;
    let request = request.validate_custom()?;

    for student_id in &request.student_ids {
        scope.ensure(&ownership(db, *student_id).await?)?;
    }

    let mut tx = db.begin().await?;
    let ids = create_assignments(&mut tx, &request, principal.id, today()).await?;
    tx.commit().await?;

    let mut assignments = Vec::with_capacity(ids.len());
    for id in ids {
        assignments.push(get_assignment(db, id).await?);
    }

    Ok(ApiResponse::created(
        "Worksheet assigned successfully",
        assignments,
    ))
}

#[get("/assignment/<id>")]
pub async fn show(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Assignment> {
    let assignment = get_assignment(db, id).await?;
    student_scope(db, &principal, Permission::ViewAssignments, assignment.student_id).await?;

    Ok(ApiResponse::ok("Assignment retrieved successfully", assignment))
}

#[put("/assignment/<id>", data = "<changes>")]
pub async fn update(
    id: i64,
    principal: Principal,
    changes: Json<AssignmentChanges>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Assignment> {
    let assignment = get_assignment(db, id).await?;
    student_scope(db, &principal, Permission::AssignWorksheets, assignment.student_id).await?;
    let changes = changes.validate_custom()?;

    Ok(ApiResponse::ok(
        "Assignment updated successfully",
        update_assignment(db, &assignment, &changes).await?,
    ))
}

#[delete("/assignment/<id>")]
pub async fn destroy(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<()> {
    let assignment = get_assignment(db, id).await?;
    student_scope(db, &principal, Permission::CancelAssignments, assignment.student_id).await?;

    cancel_assignment(db, &assignment).await?;
    Ok(ApiResponse::ok("Assignment cancelled successfully", ()))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![index, store, show, update, destroy]
}
