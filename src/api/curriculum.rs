use rocket::State;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, Principal};
use crate::db::curriculum::{
    LevelInput, SubjectInput, create_level, create_subject, delete_level, get_subject,
    list_levels, list_subjects, toggle_subject, update_level, update_subject,
};
use crate::models::{Level, Subject};
use crate::validation::{ApiResponse, ApiResult, JsonValidateExt};

#[get("/subject")]
pub async fn subjects(principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Vec<Subject>> {
    principal.require_permission(Permission::ViewCurriculum)?;

    Ok(ApiResponse::ok(
        "Subjects retrieved successfully",
        list_subjects(db, false).await?,
    ))
}

#[get("/subject/all")]
pub async fn all_subjects(
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Subject>> {
    principal.require_permission(Permission::ManageCurriculum)?;

    Ok(ApiResponse::ok(
        "Subjects retrieved successfully",
        list_subjects(db, true).await?,
    ))
}

#[post("/subject", data = "<input>")]
pub async fn store_subject(
    principal: Principal,
    input: Json<SubjectInput>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Subject> {
    principal.require_permission(Permission::ManageCurriculum)?;
    let input = input.validate_custom()?;

    Ok(ApiResponse::created(
        "Subject created successfully",
        create_subject(db, &input).await?,
    ))
}

#[get("/subject/<id>")]
pub async fn show_subject(
    id: i64,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Subject> {
    principal.require_permission(Permission::ViewCurriculum)?;

    Ok(ApiResponse::ok(
        "Subject retrieved successfully",
        get_subject(db, id).await?,
    ))
}

#[put("/subject/<id>", data = "<input>")]
pub async fn update_subject_details(
    id: i64,
    principal: Principal,
    input: Json<SubjectInput>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Subject> {
    principal.require_permission(Permission::ManageCurriculum)?;
    let input = input.validate_custom()?;

    Ok(ApiResponse::ok(
        "Subject updated successfully",
        update_subject(db, id, &input).await?,
    ))
}

#[patch("/subject/<id>/toggle-status")]
pub async fn toggle_subject_status(
    id: i64,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Subject> {
    principal.require_permission(Permission::ManageCurriculum)?;

    Ok(ApiResponse::ok(
        "Subject status updated successfully",
        toggle_subject(db, id).await?,
    ))
}

#[get("/level?<subject_id>")]
pub async fn levels(
    subject_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Level>> {
    principal.require_permission(Permission::ViewCurriculum)?;

    Ok(ApiResponse::ok(
        "Levels retrieved successfully",
        list_levels(db, subject_id).await?,
    ))
}

#[post("/level", data = "<input>")]
pub async fn store_level(
    principal: Principal,
    input: Json<LevelInput>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Level> {
    principal.require_permission(Permission::ManageCurriculum)?;
    let input = input.validate_custom()?;

    Ok(ApiResponse::created(
        "Level created successfully",
        create_level(db, &input).await?,
    ))
}

#[put("/level/<id>", data = "<input>")]
pub async fn update_level_details(
    id: i64,
    principal: Principal,
    input: Json<LevelInput>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Level> {
    principal.require_permission(Permission::ManageCurriculum)?;
    let input = input.validate_custom()?;

    Ok(ApiResponse::ok(
        "Level updated successfully",
        update_level(db, id, &input).await?,
    ))
}

#[delete("/level/<id>")]
pub async fn destroy_level(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<()> {
    principal.require_permission(Permission::ManageCurriculum)?;
    delete_level(db, id).await?;

    Ok(ApiResponse::ok("Level deleted successfully", ()))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        subjects,
        all_subjects,
        store_subject,
        show_subject,
        update_subject_details,
        toggle_subject_status,
        levels,
        store_level,
        update_level_details,
        destroy_level
    ]
}
