//! HTTP handlers, all mounted under `/api`. Handlers resolve scope, load and
//! check rows, then call into `db`, `progress` and `reports`.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rocket::Route;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, Principal};
use crate::db::students::ownership;
use crate::error::AppError;
use crate::scope::{DenyReason, ScopeFilter, authorize};
use crate::storage::FileStore;

pub mod admin;
pub mod assignments;
pub mod attendance;
pub mod auth;
pub mod centers;
pub mod curriculum;
pub mod fees;
pub mod health;
pub mod notifications;
pub mod parent;
pub mod reports;
pub mod students;
pub mod submissions;
pub mod teachers;
pub mod worksheets;

/// The file store as it sits in Rocket's managed state.
pub type Store = Arc<dyn FileStore>;

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Resolves the principal's scope for `permission` and checks that the
/// student falls inside it.
pub async fn student_scope(
    db: &Pool<Sqlite>,
    principal: &Principal,
    permission: Permission,
    student_id: i64,
) -> Result<ScopeFilter, AppError> {
    let scope = authorize(principal, permission)?;
    scope.ensure(&ownership(db, student_id).await?)?;
    Ok(scope)
}

/// The center a new center-bound row goes into. A super admin names it; a
/// center admin always writes into their own.
pub fn target_center(scope: ScopeFilter, requested: Option<i64>) -> Result<i64, AppError> {
    match scope {
        ScopeFilter::Unrestricted { .. } => {
            requested.ok_or_else(|| AppError::invalid("center_id", "Center is required"))
        }
        ScopeFilter::Center(center_id) => Ok(center_id),
        _ => Err(AppError::Forbidden(DenyReason::RoleNotPermitted.to_string())),
    }
}

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(health::routes());
    routes.extend(centers::routes());
    routes.extend(teachers::routes());
    routes.extend(students::routes());
    routes.extend(parent::routes());
    routes.extend(curriculum::routes());
    routes.extend(worksheets::routes());
    routes.extend(assignments::routes());
    routes.extend(submissions::routes());
    routes.extend(attendance::routes());
    routes.extend(fees::routes());
    routes.extend(reports::routes());
    routes.extend(admin::routes());
    routes.extend(notifications::routes());
    routes
}
