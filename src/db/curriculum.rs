use serde::Deserialize;
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::{info, instrument};
use validator::Validate;

use crate::error::AppError;
use crate::models::{Level, Subject, Worksheet};

const SUBJECT_COLUMNS: &str = "id, name, description, is_active, created_at";
const LEVEL_COLUMNS: &str = "id, subject_id, name, order_index, description";
const WORKSHEET_SELECT: &str = "SELECT w.id, w.subject_id, w.level_id, sub.name AS subject_name, l.name AS level_name,
            w.title, w.worksheet_no, w.description, w.file_path, w.total_marks, w.time_limit_minutes,
            w.created_by, w.created_at
     FROM worksheets w
     JOIN subjects sub ON sub.id = w.subject_id
     JOIN levels l ON l.id = w.level_id";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubjectInput {
    #[validate(length(min = 1, max = 255, message = "Subject name is required"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LevelInput {
    pub subject_id: i64,
    #[validate(length(min = 1, max = 255, message = "Level name is required"))]
    pub name: String,
    #[validate(range(min = 0, message = "Order must not be negative"))]
    #[serde(default)]
    pub order_index: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct WorksheetInput {
    pub subject_id: i64,
    pub level_id: i64,
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,
    #[validate(length(max = 50, message = "Worksheet number must be at most 50 characters"))]
    pub worksheet_no: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Total marks must be at least 1"))]
    pub total_marks: i64,
    #[validate(range(min = 1, message = "Time limit must be at least 1 minute"))]
    pub time_limit_minutes: Option<i64>,
}

#[instrument(skip(pool))]
pub async fn list_subjects(
    pool: &Pool<Sqlite>,
    include_inactive: bool,
) -> Result<Vec<Subject>, AppError> {
    info!("Listing subjects");
    let sql = if include_inactive {
        format!("SELECT {} FROM subjects ORDER BY name", SUBJECT_COLUMNS)
    } else {
        format!(
            "SELECT {} FROM subjects WHERE is_active = TRUE ORDER BY name",
            SUBJECT_COLUMNS
        )
    };

    Ok(sqlx::query_as::<_, Subject>(&sql).fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_subject(pool: &Pool<Sqlite>, id: i64) -> Result<Subject, AppError> {
    sqlx::query_as::<_, Subject>(&format!("SELECT {} FROM subjects WHERE id = ?", SUBJECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Subject", id))
}

#[instrument(skip(pool, input), fields(name = %input.name))]
pub async fn create_subject(pool: &Pool<Sqlite>, input: &SubjectInput) -> Result<Subject, AppError> {
    info!("Creating subject");
    let result = sqlx::query("INSERT INTO subjects (name, description) VALUES (?, ?)")
        .bind(&input.name)
        .bind(&input.description)
        .execute(pool)
        .await
        .map_err(|err| AppError::on_unique_violation(err, "Subject name already exists"))?;

    get_subject(pool, result.last_insert_rowid()).await
}

#[instrument(skip(pool, input))]
pub async fn update_subject(
    pool: &Pool<Sqlite>,
    id: i64,
    input: &SubjectInput,
) -> Result<Subject, AppError> {
    info!("Updating subject");
    let result = sqlx::query(
        "UPDATE subjects SET name = ?, description = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(&input.name)
    .bind(&input.description)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|err| AppError::on_unique_violation(err, "Subject name already exists"))?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Subject", id));
    }

    get_subject(pool, id).await
}

#[instrument(skip(pool))]
pub async fn toggle_subject(pool: &Pool<Sqlite>, id: i64) -> Result<Subject, AppError> {
    info!("Toggling subject status");
    let result = sqlx::query(
        "UPDATE subjects SET is_active = NOT is_active, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Subject", id));
    }

    get_subject(pool, id).await
}

async fn ensure_subject_exists(pool: &Pool<Sqlite>, subject_id: i64) -> Result<(), AppError> {
    match get_subject(pool, subject_id).await {
        Ok(_) => Ok(()),
        Err(AppError::NotFound(_)) => Err(AppError::invalid("subject_id", "Subject does not exist")),
        Err(err) => Err(err),
    }
}

#[instrument(skip(pool))]
pub async fn list_levels(
    pool: &Pool<Sqlite>,
    subject_id: Option<i64>,
) -> Result<Vec<Level>, AppError> {
    info!("Listing levels");
    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM levels WHERE 1 = 1", LEVEL_COLUMNS));
    if let Some(subject_id) = subject_id {
        query.push(" AND subject_id = ").push_bind(subject_id);
    }
    query.push(" ORDER BY subject_id, order_index, id");

    Ok(query.build_query_as::<Level>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_level(pool: &Pool<Sqlite>, id: i64) -> Result<Level, AppError> {
    sqlx::query_as::<_, Level>(&format!("SELECT {} FROM levels WHERE id = ?", LEVEL_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Level", id))
}

#[instrument(skip(pool, input), fields(name = %input.name))]
pub async fn create_level(pool: &Pool<Sqlite>, input: &LevelInput) -> Result<Level, AppError> {
    info!("Creating level");
    ensure_subject_exists(pool, input.subject_id).await?;

    let result = sqlx::query(
        "INSERT INTO levels (subject_id, name, order_index, description) VALUES (?, ?, ?, ?)",
    )
    .bind(input.subject_id)
    .bind(&input.name)
    .bind(input.order_index)
    .bind(&input.description)
    .execute(pool)
    .await?;

    get_level(pool, result.last_insert_rowid()).await
}

#[instrument(skip(pool, input))]
pub async fn update_level(
    pool: &Pool<Sqlite>,
    id: i64,
    input: &LevelInput,
) -> Result<Level, AppError> {
    info!("Updating level");
    ensure_subject_exists(pool, input.subject_id).await?;

    let result = sqlx::query(
        "UPDATE levels SET subject_id = ?, name = ?, order_index = ?, description = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.subject_id)
    .bind(&input.name)
    .bind(input.order_index)
    .bind(&input.description)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Level", id));
    }

    get_level(pool, id).await
}

#[instrument(skip(pool))]
pub async fn delete_level(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting level");
    let result = sqlx::query("DELETE FROM levels WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Level", id));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn list_worksheets(
    pool: &Pool<Sqlite>,
    subject_id: Option<i64>,
    level_id: Option<i64>,
) -> Result<Vec<Worksheet>, AppError> {
    info!("Listing worksheets");
    let mut query = QueryBuilder::<Sqlite>::new(WORKSHEET_SELECT);
    query.push(" WHERE 1 = 1");
    if let Some(subject_id) = subject_id {
        query.push(" AND w.subject_id = ").push_bind(subject_id);
    }
    if let Some(level_id) = level_id {
        query.push(" AND w.level_id = ").push_bind(level_id);
    }
    query.push(" ORDER BY sub.name, l.order_index, w.worksheet_no, w.id");

    Ok(query.build_query_as::<Worksheet>().fetch_all(pool).await?)
}

#[instrument(skip(pool))]
pub async fn get_worksheet(pool: &Pool<Sqlite>, id: i64) -> Result<Worksheet, AppError> {
    sqlx::query_as::<_, Worksheet>(&format!("{} WHERE w.id = ?", WORKSHEET_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Worksheet", id))
}

/// A worksheet's level must belong to its subject, since progress is keyed on both.
async fn ensure_level_in_subject(
    pool: &Pool<Sqlite>,
    subject_id: i64,
    level_id: i64,
) -> Result<(), AppError> {
    let level_subject: Option<i64> = sqlx::query_scalar("SELECT subject_id FROM levels WHERE id = ?")
        .bind(level_id)
        .fetch_optional(pool)
        .await?;

    match level_subject {
        Some(found) if found == subject_id => Ok(()),
        Some(_) => Err(AppError::invalid(
            "level_id",
            "Level does not belong to the selected subject",
        )),
        None => Err(AppError::invalid("level_id", "Level does not exist")),
    }
}

#[instrument(skip(pool, input), fields(title = %input.title))]
pub async fn create_worksheet(
    pool: &Pool<Sqlite>,
    input: &WorksheetInput,
    file_path: Option<&str>,
    created_by: i64,
) -> Result<Worksheet, AppError> {
    info!("Creating worksheet");
    ensure_level_in_subject(pool, input.subject_id, input.level_id).await?;

    let result = sqlx::query(
        "INSERT INTO worksheets (subject_id, level_id, title, worksheet_no, description, file_path,
                                 total_marks, time_limit_minutes, created_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.subject_id)
    .bind(input.level_id)
    .bind(&input.title)
    .bind(&input.worksheet_no)
    .bind(&input.description)
    .bind(file_path)
    .bind(input.total_marks)
    .bind(input.time_limit_minutes)
    .bind(created_by)
    .execute(pool)
    .await?;

    get_worksheet(pool, result.last_insert_rowid()).await
}

/// Replaces the worksheet metadata. A new `file_path` replaces the stored
/// file; the previous path is returned so the caller can remove it.
#[instrument(skip(pool, input))]
pub async fn update_worksheet(
    pool: &Pool<Sqlite>,
    id: i64,
    input: &WorksheetInput,
    file_path: Option<&str>,
) -> Result<(Worksheet, Option<String>), AppError> {
    info!("Updating worksheet");
    let existing = get_worksheet(pool, id).await?;
    ensure_level_in_subject(pool, input.subject_id, input.level_id).await?;

    sqlx::query(
        "UPDATE worksheets
         SET subject_id = ?, level_id = ?, title = ?, worksheet_no = ?, description = ?,
             file_path = COALESCE(?, file_path), total_marks = ?, time_limit_minutes = ?,
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.subject_id)
    .bind(input.level_id)
    .bind(&input.title)
    .bind(&input.worksheet_no)
    .bind(&input.description)
    .bind(file_path)
    .bind(input.total_marks)
    .bind(input.time_limit_minutes)
    .bind(id)
    .execute(pool)
    .await?;

    let replaced = match file_path {
        Some(_) => existing.file_path,
        None => None,
    };

    Ok((get_worksheet(pool, id).await?, replaced))
}

/// Deletes the worksheet and returns its stored file path, if any.
#[instrument(skip(pool))]
pub async fn delete_worksheet(pool: &Pool<Sqlite>, id: i64) -> Result<Option<String>, AppError> {
    info!("Deleting worksheet");
    let existing = get_worksheet(pool, id).await?;

    sqlx::query("DELETE FROM worksheets WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(existing.file_path)
}
