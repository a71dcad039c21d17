use rocket::State;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, Principal};
use crate::db::centers::{CenterInput, create_center, delete_center, get_center, list_centers, update_center};
use crate::models::Center;
use crate::reports::{CenterStats, center_stats};
use crate::scope::authorize;
use crate::validation::{ApiResponse, ApiResult, JsonValidateExt};

#[get("/center")]
pub async fn index(principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Vec<Center>> {
    let scope = authorize(&principal, Permission::ViewCenter)?;

    Ok(ApiResponse::ok(
        "Centers retrieved successfully",
        list_centers(db, scope).await?,
    ))
}

#[post("/center", data = "<input>")]
pub async fn store(
    principal: Principal,
    input: Json<CenterInput>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Center> {
    authorize(&principal, Permission::ManageCenters)?;
    let input = input.validate_custom()?;

    let mut tx = db.begin().await?;
    let id = create_center(&mut tx, &input).await?;
    tx.commit().await?;

    Ok(ApiResponse::created(
        "Center created successfully",
        get_center(db, id).await?,
    ))
}

#[get("/center/<id>")]
pub async fn show(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Center> {
    let scope = authorize(&principal, Permission::ViewCenter)?;
    scope.ensure_center(id)?;

    Ok(ApiResponse::ok(
        "Center retrieved successfully",
        get_center(db, id).await?,
    ))
}

#[put("/center/<id>", data = "<input>")]
pub async fn update(
    id: i64,
    principal: Principal,
    input: Json<CenterInput>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Center> {
    authorize(&principal, Permission::ManageCenters)?;
    let input = input.validate_custom()?;

    let mut tx = db.begin().await?;
    update_center(&mut tx, id, &input).await?;
    tx.commit().await?;

    Ok(ApiResponse::ok(
        "Center updated successfully",
        get_center(db, id).await?,
    ))
}

#[delete("/center/<id>")]
pub async fn destroy(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<()> {
    authorize(&principal, Permission::ManageCenters)?;
    delete_center(db, id).await?;

    Ok(ApiResponse::ok("Center deleted successfully", ()))
}

#[get("/center/stats?<center_id>")]
pub async fn stats(
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<CenterStats> {
    let scope = authorize(&principal, Permission::ViewManagementReports)?.with_center_hint(center_id);

    Ok(ApiResponse::ok(
        "Center statistics retrieved successfully",
        center_stats(db, scope).await?,
    ))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![index, store, show, update, destroy, stats]
}
