use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};
use validator::Validate;

use crate::auth::Role;
use crate::db::users::{NewUser, create_user, ensure_role};
use crate::error::AppError;
use crate::models::{Student, StudentStatus};
use crate::scope::{ScopeFilter, StudentOwnership};

pub const STUDENT_SELECT: &str = "SELECT s.id, s.user_id, s.center_id, s.parent_id, s.teacher_id, s.enrollment_no,
            s.date_of_birth, s.grade, s.enrollment_date, s.subjects, s.current_level, s.monthly_fee,
            s.status, u.name, u.email, u.phone, u.is_active, s.created_at
     FROM students s
     JOIN users u ON u.id = s.user_id";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewStudent {
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
    pub parent_id: Option<i64>,
    pub teacher_id: Option<i64>,
    #[validate(length(max = 50, message = "Enrollment number must be at most 50 characters"))]
    pub enrollment_no: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub grade: Option<String>,
    pub enrollment_date: Option<NaiveDate>,
    #[serde(default)]
    pub subjects: Vec<String>,
    pub current_level: Option<String>,
    #[validate(range(min = 0.0, message = "Monthly fee cannot be negative"))]
    #[serde(default)]
    pub monthly_fee: f64,
}

#[derive(Debug, Default, Clone, Deserialize, Validate)]
pub struct StudentChanges {
    #[validate(length(min = 1, max = 255, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(max = 20, message = "Phone must be at most 20 characters"))]
    pub phone: Option<String>,
    pub parent_id: Option<i64>,
    pub teacher_id: Option<i64>,
    pub grade: Option<String>,
    pub subjects: Option<Vec<String>>,
    pub current_level: Option<String>,
    #[validate(range(min = 0.0, message = "Monthly fee cannot be negative"))]
    pub monthly_fee: Option<f64>,
    pub status: Option<StudentStatus>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StudentQuery {
    pub status: Option<StudentStatus>,
    pub teacher_id: Option<i64>,
}

#[instrument(skip(pool))]
pub async fn list_students(
    pool: &Pool<Sqlite>,
    scope: ScopeFilter,
    filter: StudentQuery,
) -> Result<Vec<Student>, AppError> {
    info!("Listing students");
    let mut query = QueryBuilder::<Sqlite>::new(STUDENT_SELECT);
    query.push(" WHERE 1 = 1");
    scope.push_student_predicate(&mut query, "s");

    if let Some(status) = filter.status {
        query.push(" AND s.status = ").push_bind(status);
    }
    if let Some(teacher_id) = filter.teacher_id {
        query.push(" AND s.teacher_id = ").push_bind(teacher_id);
    }
    query.push(" ORDER BY u.name");

    Ok(query.build_query_as::<Student>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_student(pool: &Pool<Sqlite>, id: i64) -> Result<Student, AppError> {
    sqlx::query_as::<_, Student>(&format!("{} WHERE s.id = ?", STUDENT_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Student", id))
}

/// Owner fields of a student, for scope checks on rows that hang off it.
#[instrument(skip(pool))]
pub async fn ownership(pool: &Pool<Sqlite>, student_id: i64) -> Result<StudentOwnership, AppError> {
    let row: Option<(i64, i64, Option<i64>, Option<i64>)> = sqlx::query_as(
        "SELECT id, center_id, parent_id, teacher_id FROM students WHERE id = ?",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    row.map(|(student_id, center_id, parent_id, teacher_id)| StudentOwnership {
        student_id,
        center_id,
        parent_id,
        teacher_id,
    })
    .ok_or_else(|| AppError::not_found("Student", student_id))
}

/// A teacher link must name a teacher employed at the student's center.
async fn ensure_teacher_in_center(
    conn: &mut SqliteConnection,
    teacher_user_id: i64,
    center_id: i64,
) -> Result<(), AppError> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT id FROM teachers WHERE user_id = ? AND center_id = ?")
            .bind(teacher_user_id)
            .bind(center_id)
            .fetch_optional(&mut *conn)
            .await?;

    match found {
        Some(_) => Ok(()),
        None => Err(AppError::invalid(
            "teacher_id",
            "Teacher does not belong to the student's center",
        )),
    }
}

/// Creates the user and its student profile. Run inside a transaction.
#[instrument(skip(conn, input), fields(email = %input.email))]
pub async fn create_student(
    conn: &mut SqliteConnection,
    center_id: i64,
    input: &NewStudent,
) -> Result<i64, AppError> {
    info!("Creating student");
    let center_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM centers WHERE id = ?")
        .bind(center_id)
        .fetch_optional(&mut *conn)
        .await?;
    if center_exists.is_none() {
        return Err(AppError::invalid("center_id", "Center does not exist"));
    }
    if let Some(parent_id) = input.parent_id {
        ensure_role(conn, parent_id, Role::Parent, "parent_id").await?;
    }
    if let Some(teacher_id) = input.teacher_id {
        ensure_teacher_in_center(conn, teacher_id, center_id).await?;
    }

    let user_id = create_user(
        conn,
        &NewUser {
            name: input.name.clone(),
            email: input.email.clone(),
            password: input.password.clone(),
            role: Role::Student,
            phone: input.phone.clone(),
            address: input.address.clone(),
        },
    )
    .await?;

    let result = sqlx::query(
        "INSERT INTO students (user_id, center_id, parent_id, teacher_id, enrollment_no, date_of_birth,
                               grade, enrollment_date, subjects, current_level, monthly_fee, status)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active')",
    )
    .bind(user_id)
    .bind(center_id)
    .bind(input.parent_id)
    .bind(input.teacher_id)
    .bind(&input.enrollment_no)
    .bind(input.date_of_birth)
    .bind(&input.grade)
    .bind(input.enrollment_date)
    .bind(Json(&input.subjects))
    .bind(&input.current_level)
    .bind(input.monthly_fee)
    .execute(&mut *conn)
    .await
    .map_err(|err| AppError::on_unique_violation(err, "Enrollment number already in use"))?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(conn, changes))]
pub async fn update_student(
    conn: &mut SqliteConnection,
    student: &Student,
    changes: &StudentChanges,
) -> Result<(), AppError> {
    info!("Updating student");
    if let Some(parent_id) = changes.parent_id {
        ensure_role(conn, parent_id, Role::Parent, "parent_id").await?;
    }
    if let Some(teacher_id) = changes.teacher_id {
        ensure_teacher_in_center(conn, teacher_id, student.center_id).await?;
    }

    sqlx::query(
        "UPDATE users SET name = COALESCE(?, name), phone = COALESCE(?, phone), updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&changes.name)
    .bind(&changes.phone)
    .bind(student.user_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE students
         SET parent_id = COALESCE(?, parent_id),
             teacher_id = COALESCE(?, teacher_id),
             grade = COALESCE(?, grade),
             subjects = COALESCE(?, subjects),
             current_level = COALESCE(?, current_level),
             monthly_fee = COALESCE(?, monthly_fee),
             status = COALESCE(?, status),
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(changes.parent_id)
    .bind(changes.teacher_id)
    .bind(&changes.grade)
    .bind(changes.subjects.as_ref().map(Json))
    .bind(&changes.current_level)
    .bind(changes.monthly_fee)
    .bind(changes.status)
    .bind(student.id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
