use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::scope::StudentOwnership;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StudentStatus {
    Active,
    Inactive,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub user_id: i64,
    pub center_id: i64,
    pub parent_id: Option<i64>,
    pub teacher_id: Option<i64>,
    pub enrollment_no: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub grade: Option<String>,
    pub enrollment_date: Option<NaiveDate>,
    pub subjects: Json<Vec<String>>,
    pub current_level: Option<String>,
    pub monthly_fee: f64,
    pub status: StudentStatus,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl Student {
    pub fn ownership(&self) -> StudentOwnership {
        StudentOwnership {
            student_id: self.id,
            center_id: self.center_id,
            parent_id: self.parent_id,
            teacher_id: self.teacher_id,
        }
    }
}
