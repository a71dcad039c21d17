use serde::Deserialize;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};
use validator::Validate;

use crate::auth::{Principal, Role, USER_COLUMNS, User};
use crate::error::AppError;
use crate::scope::ScopeFilter;

pub fn password_cost() -> u32 {
    if cfg!(test) { 4 } else { bcrypt::DEFAULT_COST }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: Role,
    #[validate(length(max = 20, message = "Phone must be at most 20 characters"))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(sqlx::FromRow)]
struct UserCredentials {
    #[sqlx(flatten)]
    user: User,
    password: String,
}

#[instrument(skip(conn, user), fields(email = %user.email, role = %user.role))]
pub async fn create_user(conn: &mut SqliteConnection, user: &NewUser) -> Result<i64, AppError> {
    info!("Creating user");

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(&user.email)
        .fetch_optional(&mut *conn)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let hashed_password = bcrypt::hash(&user.password, password_cost())?;

    let result = sqlx::query(
        "INSERT INTO users (name, email, password, role, phone, address) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(hashed_password)
    .bind(user.role)
    .bind(&user.phone)
    .bind(&user.address)
    .execute(&mut *conn)
    .await
    .map_err(|err| AppError::on_unique_violation(err, "Email already registered"))?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("User", id))
}

#[instrument(skip(pool))]
pub async fn count_users(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?)
}

/// Returns the user when the email exists, the account is active and the password matches.
#[instrument(skip(pool, password))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row = sqlx::query_as::<_, UserCredentials>(&format!(
        "SELECT {}, users.password FROM users WHERE email = ?",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(credentials) if credentials.user.is_active => {
            if bcrypt::verify(password, &credentials.password)? {
                Ok(Some(credentials.user))
            } else {
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

#[instrument(skip(pool, password))]
pub async fn verify_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    password: &str,
) -> Result<bool, AppError> {
    let hash: Option<String> = sqlx::query_scalar("SELECT password FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match hash {
        Some(hash) => Ok(bcrypt::verify(password, &hash)?),
        None => Err(AppError::not_found("User", user_id)),
    }
}

#[instrument(skip_all, fields(user_id))]
pub async fn update_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Updating user password");
    let hashed_password = bcrypt::hash(new_password, password_cost())?;

    sqlx::query("UPDATE users SET password = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[derive(Debug, Default, Clone, Deserialize, Validate)]
pub struct ProfileChanges {
    #[validate(length(min = 1, max = 255, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(max = 20, message = "Phone must be at most 20 characters"))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[instrument(skip(pool, changes))]
pub async fn update_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
    changes: &ProfileChanges,
    profile_photo_path: Option<&str>,
) -> Result<User, AppError> {
    info!("Updating user profile");
    sqlx::query(
        "UPDATE users
         SET name = COALESCE(?, name),
             phone = COALESCE(?, phone),
             address = COALESCE(?, address),
             profile_photo_path = COALESCE(?, profile_photo_path),
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&changes.name)
    .bind(&changes.phone)
    .bind(&changes.address)
    .bind(profile_photo_path)
    .bind(user_id)
    .execute(pool)
    .await?;

    get_user(pool, user_id).await
}

#[instrument(skip(pool))]
pub async fn set_user_active(
    pool: &Pool<Sqlite>,
    user_id: i64,
    is_active: bool,
) -> Result<(), AppError> {
    info!("Setting user active flag");
    sqlx::query("UPDATE users SET is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(is_active)
        .bind(user_id)
        .execute(pool)
        .await?;

    if !is_active {
        sqlx::query("DELETE FROM user_sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(pool)
            .await?;
    }

    Ok(())
}

#[instrument(skip(conn))]
pub async fn delete_user(conn: &mut SqliteConnection, user_id: i64) -> Result<(), AppError> {
    info!("Deleting user");
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("User", user_id));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn list_users_by_role(pool: &Pool<Sqlite>, role: Role) -> Result<Vec<User>, AppError> {
    info!("Listing users by role");
    Ok(sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE role = ? ORDER BY name",
        USER_COLUMNS
    ))
    .bind(role)
    .fetch_all(pool)
    .await?)
}

/// Parents visible to the scope. A center admin sees parents with a child in their center.
#[instrument(skip(pool))]
pub async fn list_parents(pool: &Pool<Sqlite>, scope: ScopeFilter) -> Result<Vec<User>, AppError> {
    info!("Listing parents");
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT DISTINCT {} FROM users LEFT JOIN students s ON s.parent_id = users.id WHERE users.role = 'parent'",
        USER_COLUMNS
    ));
    scope.push_center_predicate(&mut query, "s.center_id");
    query.push(" ORDER BY users.name");

    Ok(query.build_query_as::<User>().fetch_all(pool).await?)
}

/// Checks that `user_id` exists and carries `role`, reporting against `field` otherwise.
pub async fn ensure_role(
    conn: &mut SqliteConnection,
    user_id: i64,
    role: Role,
    field: &str,
) -> Result<(), AppError> {
    let actual: Option<Role> = sqlx::query_scalar("SELECT role FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    match actual {
        Some(actual) if actual == role => Ok(()),
        _ => Err(AppError::invalid(
            field,
            &format!("User {} is not a {}", user_id, role),
        )),
    }
}

/// Builds the request principal, or `None` for an unknown or deactivated user.
#[instrument(skip(pool))]
pub async fn load_principal(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<Principal>, AppError> {
    let user = match get_user(pool, user_id).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => return Ok(None),
        Err(err) => return Err(err),
    };

    if !user.is_active {
        return Ok(None);
    }

    let mut principal = Principal {
        id: user.id,
        name: user.name,
        email: user.email,
        role: user.role,
        center_id: None,
        linked_student_id: None,
        linked_teacher_user_id: None,
    };

    match principal.role {
        Role::CenterAdmin => {
            principal.center_id =
                sqlx::query_scalar("SELECT id FROM centers WHERE admin_id = ? ORDER BY id LIMIT 1")
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await?;
        }
        Role::Teacher => {
            let center_id: Option<i64> =
                sqlx::query_scalar("SELECT center_id FROM teachers WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await?;
            principal.center_id = center_id;
            principal.linked_teacher_user_id = center_id.map(|_| user_id);
        }
        Role::Student => {
            let row: Option<(i64, i64, Option<i64>)> = sqlx::query_as(
                "SELECT id, center_id, teacher_id FROM students WHERE user_id = ?",
            )
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
            if let Some((student_id, center_id, teacher_id)) = row {
                principal.linked_student_id = Some(student_id);
                principal.center_id = Some(center_id);
                principal.linked_teacher_user_id = teacher_id;
            }
        }
        Role::SuperAdmin | Role::Parent => {}
    }

    Ok(Some(principal))
}
