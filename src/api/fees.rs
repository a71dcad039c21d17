use rocket::State;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};

use super::{student_scope, today};
use crate::auth::{Permission, Principal};
use crate::db::fees::{
    FeeGeneration, FeeQuery, GenerationOutcome, Payment, generate_monthly_fees, get_fee,
    list_fees, list_unpaid_or_overdue, mark_overdue, mark_paid,
};
use crate::db::students::ownership;
use crate::models::Fee;
use crate::reports::{FeeStatusTotal, fee_status_report};
use crate::scope::authorize;
use crate::validation::{
    ApiResponse, ApiResult, JsonValidateExt, month_bounds, parse_optional_choice,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdatedCount {
    pub updated: u64,
}

#[get("/fees?<student_id>&<month>&<status>")]
pub async fn index(
    student_id: Option<i64>,
    month: Option<String>,
    status: Option<&str>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Fee>> {
    let scope = authorize(&principal, Permission::ViewFees)?;
    if let Some(student_id) = student_id {
        scope.ensure(&ownership(db, student_id).await?)?;
    }
    if let Some(month) = &month {
        month_bounds(month)?;
    }

    let filter = FeeQuery {
        student_id,
        month,
        status: parse_optional_choice("status", status)?,
    };

    Ok(ApiResponse::ok(
        "Fees retrieved successfully",
        list_fees(db, scope, &filter).await?,
    ))
}

#[post("/fees/generate", data = "<request>")]
pub async fn generate(
    principal: Principal,
    request: Json<FeeGeneration>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<GenerationOutcome> {
    let request = request.validate_custom()?;
    let scope = authorize(&principal, Permission::ManageFees)?.with_center_hint(request.center_id);

    let mut tx = db.begin().await?;
    let outcome = generate_monthly_fees(&mut tx, scope, &request).await?;
    tx.commit().await?;

    Ok(ApiResponse::created(
        format!(
            "Generated {} fees for {} ({} already existed)",
            outcome.created, request.month, outcome.skipped
        ),
        outcome,
    ))
}

#[get("/fees/report?<center_id>")]
pub async fn report(
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<FeeStatusTotal>> {
    let scope = authorize(&principal, Permission::ManageFees)?.with_center_hint(center_id);

    Ok(ApiResponse::ok(
        "Fee report retrieved successfully",
        fee_status_report(db, scope).await?,
    ))
}

#[get("/fees/unpaid-overdue?<center_id>")]
pub async fn unpaid_overdue(
    center_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Fee>> {
    let scope = authorize(&principal, Permission::ManageFees)?.with_center_hint(center_id);

    Ok(ApiResponse::ok(
        "Unpaid fees retrieved successfully",
        list_unpaid_or_overdue(db, scope).await?,
    ))
}

#[post("/fees/mark-overdue")]
pub async fn overdue(principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<UpdatedCount> {
    let scope = authorize(&principal, Permission::ManageFees)?;
    let updated = mark_overdue(db, scope, today()).await?;

    tracing::info!(updated, "Overdue fees flagged");
    Ok(ApiResponse::ok(
        "Overdue fees updated successfully",
        UpdatedCount { updated },
    ))
}

#[get("/fees/<id>")]
pub async fn show(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Fee> {
    let fee = get_fee(db, id).await?;
    student_scope(db, &principal, Permission::ViewFees, fee.student_id).await?;

    Ok(ApiResponse::ok("Fee retrieved successfully", fee))
}

#[put("/fees/<id>/pay", data = "<payment>")]
pub async fn pay(
    id: i64,
    principal: Principal,
    payment: Json<Payment>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Fee> {
    let fee = get_fee(db, id).await?;
    student_scope(db, &principal, Permission::ManageFees, fee.student_id).await?;
    let payment = payment.validate_custom()?;

    Ok(ApiResponse::ok(
        "Payment recorded successfully",
        mark_paid(db, &fee, &payment, today()).await?,
    ))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![index, generate, report, unpaid_overdue, overdue, show, pay]
}
