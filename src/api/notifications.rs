use rocket::State;
use sqlx::{Pool, Sqlite};

use crate::auth::Principal;
use crate::db::notifications::{list_notifications, mark_read};
use crate::models::Notification;
use crate::validation::{ApiResponse, ApiResult};

#[get("/notifications")]
pub async fn index(principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Vec<Notification>> {
    Ok(ApiResponse::ok(
        "Notifications retrieved successfully",
        list_notifications(db, principal.id).await?,
    ))
}

#[patch("/notifications/<id>/read")]
pub async fn read(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<()> {
    mark_read(db, id, principal.id).await?;
    Ok(ApiResponse::ok("Notification marked as read", ()))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![index, read]
}
