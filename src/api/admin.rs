use rocket::State;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};

use super::today;
use crate::auth::{Permission, Principal, Role, User};
use crate::db::centers::center_owned_by;
use crate::db::users::{delete_user, get_user, list_parents, list_users_by_role, set_user_active};
use crate::error::AppError;
use crate::reports::{SystemDashboard, system_dashboard};
use crate::scope::authorize;
use crate::validation::{ApiResponse, ApiResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserStatus {
    pub id: i64,
    pub is_active: bool,
}

#[get("/super-admin/dashboard")]
pub async fn dashboard(principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<SystemDashboard> {
    authorize(&principal, Permission::AdministerUsers)?;

    Ok(ApiResponse::ok(
        "Dashboard retrieved successfully",
        system_dashboard(db, today()).await?,
    ))
}

/// Flips a user's active flag. Deactivating ends every session of that user.
#[patch("/users/<id>/toggle-status")]
pub async fn toggle_status(
    id: i64,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<UserStatus> {
    authorize(&principal, Permission::AdministerUsers)?;

    if id == principal.id {
        return Err(AppError::invalid(
            "id",
            "You cannot deactivate your own account",
        ));
    }

    let user = get_user(db, id).await?;
    let is_active = !user.is_active;
    set_user_active(db, id, is_active).await?;

    tracing::info!(user_id = id, is_active, "User status toggled");
    Ok(ApiResponse::ok(
        if is_active {
            "User activated successfully"
        } else {
            "User deactivated successfully"
        },
        UserStatus { id, is_active },
    ))
}

#[get("/center-admins")]
pub async fn center_admins(principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Vec<User>> {
    authorize(&principal, Permission::AdministerUsers)?;

    Ok(ApiResponse::ok(
        "Center admins retrieved successfully",
        list_users_by_role(db, Role::CenterAdmin).await?,
    ))
}

#[delete("/center-admins/<id>")]
pub async fn destroy_center_admin(
    id: i64,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<()> {
    authorize(&principal, Permission::AdministerUsers)?;

    let user = get_user(db, id).await?;
    if user.role != Role::CenterAdmin {
        return Err(AppError::not_found("Center admin", id));
    }
    if let Some(center_id) = center_owned_by(db, id).await? {
        return Err(AppError::Conflict(format!(
            "Center admin still administers center {}",
            center_id
        )));
    }

    let mut tx = db.begin().await?;
    delete_user(&mut tx, id).await?;
    tx.commit().await?;

    Ok(ApiResponse::ok("Center admin deleted successfully", ()))
}

#[get("/parents")]
pub async fn parents(principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Vec<User>> {
    let scope = authorize(&principal, Permission::ListParents)?;

    Ok(ApiResponse::ok(
        "Parents retrieved successfully",
        list_parents(db, scope).await?,
    ))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        dashboard,
        toggle_status,
        center_admins,
        destroy_center_admin,
        parents
    ]
}
