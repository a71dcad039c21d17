use chrono::{Duration, NaiveDateTime};
use rocket::State;
use rocket::FromForm;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::{Store, now};
use crate::auth::{Principal, Role, SESSION_COOKIE, SessionToken, User, UserSession};
use crate::db::sessions::{create_user_session, invalidate_session};
use crate::db::users::{
    NewUser, ProfileChanges, authenticate_user, count_users, create_user, get_user,
    update_profile, update_user_password, verify_password,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::storage::Bucket;
use crate::validation::{ApiResponse, ApiResult, JsonValidateExt};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub password_confirmation: String,
    pub role: Option<Role>,
    #[validate(length(max = 20, message = "Phone must be at most 20 characters"))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: NaiveDateTime,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileView {
    #[serde(flatten)]
    pub user: User,
    pub center_id: Option<i64>,
    pub linked_student_id: Option<i64>,
    pub linked_teacher_user_id: Option<i64>,
}

#[derive(FromForm)]
pub struct ProfileForm<'r> {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub profile_photo: Option<TempFile<'r>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub new_password_confirmation: String,
}

/// Who may create an account with `role`. Parents sign themselves up; admin
/// accounts need a super admin, except the very first account of an empty store.
fn may_register(role: Role, principal: Option<&Principal>, existing_users: i64) -> Result<(), AppError> {
    let by_super_admin = principal.is_some_and(|p| p.role == Role::SuperAdmin);

    match role {
        Role::Parent => Ok(()),
        Role::SuperAdmin if existing_users == 0 => Ok(()),
        Role::SuperAdmin | Role::CenterAdmin if by_super_admin => Ok(()),
        Role::SuperAdmin | Role::CenterAdmin => Err(AppError::Forbidden(
            "Only a super admin can register administrators".to_string(),
        )),
        Role::Teacher | Role::Student => Err(AppError::invalid(
            "role",
            "Teachers and students are created by their center",
        )),
    }
}

#[post("/register", data = "<request>")]
pub async fn register(
    request: Json<RegisterRequest>,
    principal: Option<Principal>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<User> {
    let request = request.validate_custom()?;
    let role = request.role.unwrap_or(Role::Parent);

    may_register(role, principal.as_ref(), count_users(db).await?)?;

    let mut tx = db.begin().await?;
    let user_id = create_user(
        &mut tx,
        &NewUser {
            name: request.name,
            email: request.email,
            password: request.password,
            role,
            phone: request.phone,
            address: request.address,
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id, role = %role, "User registered");
    Ok(ApiResponse::created(
        "Registration successful",
        get_user(db, user_id).await?,
    ))
}

#[post("/login", data = "<login>")]
pub async fn login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    config: &State<AppConfig>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<LoginResponse> {
    let login = login.validate_custom()?;

    let user = authenticate_user(db, &login.email, &login.password)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

    let token = UserSession::generate_token();
    let expires_at = now() + Duration::hours(config.session_hours);
    create_user_session(db, user.id, &token, expires_at).await?;

    cookies.add_private(
        Cookie::build((SESSION_COOKIE, token.clone()))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(rocket::time::Duration::hours(config.session_hours)),
    );

    tracing::info!(user_id = user.id, "User logged in");
    Ok(ApiResponse::ok(
        "Login successful",
        LoginResponse {
            token,
            expires_at,
            user,
        },
    ))
}

#[post("/logout")]
pub async fn logout(
    _principal: Principal,
    token: SessionToken,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<()> {
    invalidate_session(db, &token.0).await?;
    cookies.remove_private(Cookie::build(SESSION_COOKIE));

    Ok(ApiResponse::ok("Logged out successfully", ()))
}

#[get("/profile")]
pub async fn profile(principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<ProfileView> {
    let user = get_user(db, principal.id).await?;

    Ok(ApiResponse::ok(
        "Profile retrieved successfully",
        ProfileView {
            user,
            center_id: principal.center_id,
            linked_student_id: principal.linked_student_id,
            linked_teacher_user_id: principal.linked_teacher_user_id,
        },
    ))
}

#[put("/profile", data = "<form>")]
pub async fn update_own_profile(
    principal: Principal,
    mut form: Form<ProfileForm<'_>>,
    files: &State<Store>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<User> {
    let changes = ProfileChanges {
        name: form.name.take(),
        phone: form.phone.take(),
        address: form.address.take(),
    };
    changes.validate().map_err(crate::validation::into_field_errors)?;

    let previous = get_user(db, principal.id).await?.profile_photo_path;

    let photo = match form.profile_photo.as_mut() {
        Some(file) if file.len() > 0 => Some(files.store(Bucket::ProfilePhotos, file).await?),
        _ => None,
    };

    let user = update_profile(db, principal.id, &changes, photo.as_deref()).await?;

    if let (Some(_), Some(previous)) = (&photo, previous) {
        files.delete(&previous).await?;
    }

    Ok(ApiResponse::ok("Profile updated successfully", user))
}

#[post("/change-password", data = "<request>")]
pub async fn change_password(
    principal: Principal,
    request: Json<ChangePasswordRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<()> {
    let request = request.validate_custom()?;

    if !verify_password(db, principal.id, &request.current_password).await? {
        return Err(AppError::invalid(
            "current_password",
            "Current password is incorrect",
        ));
    }

    update_user_password(db, principal.id, &request.new_password).await?;
    Ok(ApiResponse::ok("Password changed successfully", ()))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        register,
        login,
        logout,
        profile,
        update_own_profile,
        change_password
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            id: 1,
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role,
            center_id: None,
            linked_student_id: None,
            linked_teacher_user_id: None,
        }
    }

    #[test]
    fn test_parents_register_freely() {
        assert!(may_register(Role::Parent, None, 10).is_ok());
    }

    #[test]
    fn test_first_account_may_be_super_admin() {
        assert!(may_register(Role::SuperAdmin, None, 0).is_ok());
        assert!(matches!(
            may_register(Role::SuperAdmin, None, 1),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_admin_accounts_need_a_super_admin() {
        let admin = principal(Role::SuperAdmin);
        let center_admin = principal(Role::CenterAdmin);

        assert!(may_register(Role::CenterAdmin, Some(&admin), 3).is_ok());
        assert!(matches!(
            may_register(Role::CenterAdmin, Some(&center_admin), 3),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_teachers_are_not_self_registered() {
        let admin = principal(Role::SuperAdmin);
        assert!(matches!(
            may_register(Role::Teacher, Some(&admin), 3),
            Err(AppError::Validation(_))
        ));
    }
}
