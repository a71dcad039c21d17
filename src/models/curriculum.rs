use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Level {
    pub id: i64,
    pub subject_id: i64,
    pub name: String,
    pub order_index: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Worksheet {
    pub id: i64,
    pub subject_id: i64,
    pub level_id: i64,
    pub subject_name: String,
    pub level_name: String,
    pub title: String,
    pub worksheet_no: Option<String>,
    pub description: Option<String>,
    pub file_path: Option<String>,
    pub total_marks: i64,
    pub time_limit_minutes: Option<i64>,
    pub created_by: Option<i64>,
    pub created_at: NaiveDateTime,
}
