use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};
use validator::Validate;

use crate::auth::Role;
use crate::db::users::{NewUser, create_user};
use crate::error::AppError;
use crate::models::Teacher;
use crate::scope::ScopeFilter;

const TEACHER_SELECT: &str = "SELECT t.id, t.user_id, t.center_id, t.employee_id, t.qualification, t.join_date,
            u.name, u.email, u.phone, u.is_active,
            (SELECT COUNT(*) FROM students s WHERE s.teacher_id = t.user_id) AS student_count,
            t.created_at
     FROM teachers t
     JOIN users u ON u.id = t.user_id";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewTeacher {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(max = 20, message = "Phone must be at most 20 characters"))]
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Required for a super admin, ignored for a center admin.
    pub center_id: Option<i64>,
    #[validate(length(max = 50, message = "Employee id must be at most 50 characters"))]
    pub employee_id: Option<String>,
    pub qualification: Option<String>,
    pub join_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Clone, Deserialize, Validate)]
pub struct TeacherChanges {
    #[validate(length(min = 1, max = 255, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(max = 20, message = "Phone must be at most 20 characters"))]
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 50, message = "Employee id must be at most 50 characters"))]
    pub employee_id: Option<String>,
    pub qualification: Option<String>,
    pub join_date: Option<NaiveDate>,
}

#[instrument(skip(pool))]
pub async fn list_teachers(pool: &Pool<Sqlite>, scope: ScopeFilter) -> Result<Vec<Teacher>, AppError> {
    info!("Listing teachers");
    let mut query = QueryBuilder::<Sqlite>::new(TEACHER_SELECT);
    query.push(" WHERE 1 = 1");
    scope.push_center_predicate(&mut query, "t.center_id");
    query.push(" ORDER BY u.name");

    Ok(query.build_query_as::<Teacher>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_teacher(pool: &Pool<Sqlite>, id: i64) -> Result<Teacher, AppError> {
    sqlx::query_as::<_, Teacher>(&format!("{} WHERE t.id = ?", TEACHER_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Teacher", id))
}

#[instrument(skip(pool))]
pub async fn get_teacher_by_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<Teacher>, AppError> {
    Ok(
        sqlx::query_as::<_, Teacher>(&format!("{} WHERE t.user_id = ?", TEACHER_SELECT))
            .bind(user_id)
            .fetch_optional(pool)
            .await?,
    )
}

/// Creates the user and its teacher profile. Run inside a transaction.
#[instrument(skip(conn, input), fields(email = %input.email))]
pub async fn create_teacher(
    conn: &mut SqliteConnection,
    center_id: i64,
    input: &NewTeacher,
) -> Result<i64, AppError> {
    info!("Creating teacher");
    let center_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM centers WHERE id = ?")
        .bind(center_id)
        .fetch_optional(&mut *conn)
        .await?;
    if center_exists.is_none() {
        return Err(AppError::invalid("center_id", "Center does not exist"));
    }

    let user_id = create_user(
        conn,
        &NewUser {
            name: input.name.clone(),
            email: input.email.clone(),
            password: input.password.clone(),
            role: Role::Teacher,
            phone: input.phone.clone(),
            address: input.address.clone(),
        },
    )
    .await?;

    let result = sqlx::query(
        "INSERT INTO teachers (user_id, center_id, employee_id, qualification, join_date) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(center_id)
    .bind(&input.employee_id)
    .bind(&input.qualification)
    .bind(input.join_date)
    .execute(&mut *conn)
    .await
    .map_err(|err| AppError::on_unique_violation(err, "Employee id already in use"))?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(conn, changes))]
pub async fn update_teacher(
    conn: &mut SqliteConnection,
    teacher: &Teacher,
    changes: &TeacherChanges,
) -> Result<(), AppError> {
    info!("Updating teacher");
    sqlx::query(
        "UPDATE users
         SET name = COALESCE(?, name), phone = COALESCE(?, phone), address = COALESCE(?, address),
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&changes.name)
    .bind(&changes.phone)
    .bind(&changes.address)
    .bind(teacher.user_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE teachers
         SET employee_id = COALESCE(?, employee_id), qualification = COALESCE(?, qualification),
             join_date = COALESCE(?, join_date), updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&changes.employee_id)
    .bind(&changes.qualification)
    .bind(changes.join_date)
    .bind(teacher.id)
    .execute(&mut *conn)
    .await
    .map_err(|err| AppError::on_unique_violation(err, "Employee id already in use"))?;

    Ok(())
}

/// Points the given students at `teacher_user_id`. Students outside the
/// teacher's center are left alone; the number actually moved is returned.
#[instrument(skip(conn, student_ids))]
pub async fn assign_students(
    conn: &mut SqliteConnection,
    teacher: &Teacher,
    student_ids: &[i64],
) -> Result<u64, AppError> {
    info!(count = student_ids.len(), "Assigning students to teacher");
    let mut moved = 0;
    for student_id in student_ids {
        let result = sqlx::query(
            "UPDATE students SET teacher_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND center_id = ?",
        )
        .bind(teacher.user_id)
        .bind(student_id)
        .bind(teacher.center_id)
        .execute(&mut *conn)
        .await?;
        moved += result.rows_affected();
    }

    Ok(moved)
}

#[instrument(skip(conn, student_ids))]
pub async fn unassign_students(
    conn: &mut SqliteConnection,
    teacher: &Teacher,
    student_ids: &[i64],
) -> Result<u64, AppError> {
    info!(count = student_ids.len(), "Unassigning students from teacher");
    let mut released = 0;
    for student_id in student_ids {
        let result = sqlx::query(
            "UPDATE students SET teacher_id = NULL, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND teacher_id = ?",
        )
        .bind(student_id)
        .bind(teacher.user_id)
        .execute(&mut *conn)
        .await?;
        released += result.rows_affected();
    }

    Ok(released)
}
