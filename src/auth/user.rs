use chrono::{NaiveDateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};

use super::{Permission, Role};
use crate::error::AppError;

pub const USER_COLUMNS: &str = "users.id, users.name, users.email, users.role, users.phone, users.address, users.profile_photo_path, users.is_active, users.created_at";

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub profile_photo_path: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// The authenticated identity behind a request, with the links that define its scope.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Principal {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Owned center for a center admin, employing center for a teacher,
    /// enrolling center for a student.
    pub center_id: Option<i64>,
    pub linked_student_id: Option<i64>,
    /// Always a users.id. For a teacher this is their own id once a teacher
    /// profile exists; for a student it is their assigned teacher.
    pub linked_teacher_user_id: Option<i64>,
}

impl Principal {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.id,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Forbidden(
                "You don't have permission to perform this action".to_string(),
            ))
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl UserSession {
    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }

    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect()
    }
}
