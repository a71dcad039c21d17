use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};
use validator::Validate;

use crate::error::AppError;
use crate::models::{Fee, FeeStatus};
use crate::scope::ScopeFilter;
use crate::validation::{month_bounds, validate_month};

const FEE_SELECT: &str = "SELECT f.id, f.student_id, f.center_id, f.month, f.amount, f.due_date, f.paid_date, f.status,
            f.payment_method, f.transaction_id, u.name AS student_name
     FROM fees f
     JOIN students s ON s.id = f.student_id
     JOIN users u ON u.id = s.user_id";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FeeGeneration {
    #[validate(custom(function = "validate_month"))]
    pub month: String,
    pub due_date: Option<NaiveDate>,
    /// Only honoured for a super admin.
    pub center_id: Option<i64>,
}

#[derive(Debug, Default, Clone, Deserialize, Validate)]
pub struct Payment {
    pub paid_date: Option<NaiveDate>,
    #[validate(length(max = 50, message = "Payment method must be at most 50 characters"))]
    pub payment_method: Option<String>,
    #[validate(length(max = 100, message = "Transaction id must be at most 100 characters"))]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct FeeQuery {
    pub student_id: Option<i64>,
    pub month: Option<String>,
    pub status: Option<FeeStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub created: u64,
    pub skipped: u64,
}

#[instrument(skip(pool))]
pub async fn list_fees(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
    filter: &FeeQuery,
) -> Result<Vec<Fee>, AppError> {
    info!("Listing fees");
    let mut query = QueryBuilder::<Sqlite>::new(FEE_SELECT);
    query.push(" WHERE 1 = 1");
    scope.push_predicate(&mut query, "s", "f.center_id");

    if let Some(student_id) = filter.student_id {
        query.push(" AND f.student_id = ").push_bind(student_id);
    }
    if let Some(month) = &filter.month {
        query.push(" AND f.month = ").push_bind(month.clone());
    }
    if let Some(status) = filter.status {
        query.push(" AND f.status = ").push_bind(status);
    }
    query.push(" ORDER BY f.month DESC, u.name");

    Ok(query.build_query_as::<Fee>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn list_unpaid_or_overdue(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
) -> Result<Vec<Fee>, AppError> {
    let mut query = QueryBuilder::<Sqlite>::new(FEE_SELECT);
    query.push(" WHERE f.status IN ('unpaid', 'overdue')");
    scope.push_predicate(&mut query, "s", "f.center_id");
    query.push(" ORDER BY f.due_date, u.name");

    Ok(query.build_query_as::<Fee>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_fee(pool: &Pool<Sqlite>, id: i64) -> Result<Fee, AppError> {
    sqlx::query_as::<_, Fee>(&format!("{} WHERE f.id = ?", FEE_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Fee", id))
}

/// One fee per active student in scope for the month. Students that already
/// have a fee for the month are skipped. Due date defaults to the month's last day.
#[instrument(skip(conn, request), fields(month = %request.month))]
pub async fn generate_monthly_fees(
    conn: &mut SqliteConnection,
    scope: ScopeFilter,
    request: &FeeGeneration,
) -> Result<GenerationOutcome, AppError> {
    info!("Generating monthly fees");
    let (_, last_day) = month_bounds(&request.month)?;
    let due_date = request.due_date.unwrap_or(last_day);

    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT s.id, s.center_id, s.monthly_fee FROM students s WHERE s.status = 'active'",
    );
    scope.push_student_predicate(&mut query, "s");
    query.push(" ORDER BY s.id");

    let students: Vec<(i64, i64, f64)> = query.build_query_as().fetch_all(&mut *conn).await?;

    let mut outcome = GenerationOutcome {
        created: 0,
        skipped: 0,
    };

    for (student_id, center_id, monthly_fee) in students {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM fees WHERE student_id = ? AND month = ?")
                .bind(student_id)
                .bind(&request.month)
                .fetch_optional(&mut *conn)
                .await?;

        if existing.is_some() {
            outcome.skipped += 1;
            continue;
        }

        sqlx::query(
            "INSERT INTO fees (student_id, center_id, month, amount, due_date, status)
             VALUES (?, ?, ?, ?, ?, 'unpaid')",
        )
        .bind(student_id)
        .bind(center_id)
        .bind(&request.month)
        .bind(monthly_fee)
        .bind(due_date)
        .execute(&mut *conn)
        .await?;

        outcome.created += 1;
    }

    info!(created = outcome.created, skipped = outcome.skipped, "Fee generation finished");
    Ok(outcome)
}

#[instrument(skip(pool, payment))]
pub async fn mark_paid(
    pool: &Pool<Sqlite>,
    fee: &Fee,
    payment: &Payment,
    today: NaiveDate,
) -> Result<Fee, AppError> {
    info!("Marking fee paid");
    if fee.status == FeeStatus::Paid {
        return Err(AppError::Conflict("Fee is already paid".to_string()));
    }

    sqlx::query(
        "UPDATE fees
         SET status = 'paid', paid_date = ?, payment_method = ?, transaction_id = ?,
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(payment.paid_date.unwrap_or(today))
    .bind(&payment.payment_method)
    .bind(&payment.transaction_id)
    .bind(fee.id)
    .execute(pool)
    .await?;

    get_fee(pool, fee.id).await
}

/// Flags unpaid fees past their due date. Returns the number flagged.
#[instrument(skip(pool))]
pub async fn mark_overdue(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
    today: NaiveDate,
) -> Result<u64, AppError> {
    info!("Marking overdue fees");
    let mut query = QueryBuilder::<Sqlite>::new(
        "UPDATE fees SET status = 'overdue', updated_at = CURRENT_TIMESTAMP
         WHERE status = 'unpaid' AND due_date IS NOT NULL AND due_date < ",
    );
    query.push_bind(today);
    scope.push_center_predicate(&mut query, "center_id");

    let result = query.build().execute(pool).await?;
    Ok(result.rows_affected())
}
