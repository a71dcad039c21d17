use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FeeStatus {
    Unpaid,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Fee {
    pub id: i64,
    pub student_id: i64,
    pub center_id: i64,
    pub month: String,
    pub amount: f64,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    pub status: FeeStatus,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub student_name: String,
}
