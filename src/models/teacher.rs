use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Teacher profile joined with its user. `user_id` is the identifier students
/// and assignments point at.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Teacher {
    pub id: i64,
    pub user_id: i64,
    pub center_id: i64,
    pub employee_id: Option<String>,
    pub qualification: Option<String>,
    pub join_date: Option<NaiveDate>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub student_count: i64,
    pub created_at: NaiveDateTime,
}
