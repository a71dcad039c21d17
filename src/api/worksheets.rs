use rocket::FromForm;
use rocket::State;
use rocket::form::Form;
use rocket::fs::{NamedFile, TempFile};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::Store;
use crate::auth::{Permission, Principal};
use crate::db::curriculum::{
    WorksheetInput, create_worksheet, delete_worksheet, get_worksheet, list_worksheets,
    update_worksheet,
};
use crate::error::AppError;
use crate::models::Worksheet;
use crate::storage::{Bucket, FileStore};
use crate::validation::{ApiResponse, ApiResult, into_field_errors};

const DEFAULT_TOTAL_MARKS: i64 = 100;

#[derive(FromForm)]
pub struct WorksheetForm<'r> {
    pub subject_id: i64,
    pub level_id: i64,
    pub title: String,
    pub worksheet_no: Option<String>,
    pub description: Option<String>,
    pub total_marks: Option<i64>,
    pub time_limit_minutes: Option<i64>,
    pub pdf_file: Option<TempFile<'r>>,
}

impl WorksheetForm<'_> {
    fn input(&self) -> Result<WorksheetInput, AppError> {
        let input = WorksheetInput {
            subject_id: self.subject_id,
            level_id: self.level_id,
            title: self.title.clone(),
            worksheet_no: self.worksheet_no.clone(),
            description: self.description.clone(),
            total_marks: self.total_marks.unwrap_or(DEFAULT_TOTAL_MARKS),
            time_limit_minutes: self.time_limit_minutes,
        };
        input.validate().map_err(into_field_errors)?;
        Ok(input)
    }
}

/// Stores an uploaded worksheet PDF, or nothing when the field was left empty.
async fn store_pdf(
    files: &dyn FileStore,
    file: Option<&mut TempFile<'_>>,
) -> Result<Option<String>, AppError> {
    let Some(file) = file.filter(|file| file.len() > 0) else {
        return Ok(None);
    };

    if !file.content_type().is_some_and(|content_type| content_type.is_pdf()) {
        return Err(AppError::invalid("pdf_file", "Worksheet file must be a PDF"));
    }

    Ok(Some(files.store(Bucket::Worksheets, file).await?))
}

#[get("/worksheet?<subject_id>&<level_id>")]
pub async fn index(
    subject_id: Option<i64>,
    level_id: Option<i64>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Worksheet>> {
    principal.require_permission(Permission::ViewWorksheet)?;

    Ok(ApiResponse::ok(
        "Worksheets retrieved successfully",
        list_worksheets(db, subject_id, level_id).await?,
    ))
}

#[post("/worksheet", data = "<form>")]
pub async fn store(
    principal: Principal,
    mut form: Form<WorksheetForm<'_>>,
    files: &State<Store>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Worksheet> {
    principal.require_permission(Permission::EditWorksheets)?;
    let input = form.input()?;

    let file_path = store_pdf(files.inner().as_ref(), form.pdf_file.as_mut()).await?;

    match create_worksheet(db, &input, file_path.as_deref(), principal.id).await {
        Ok(worksheet) => Ok(ApiResponse::created("Worksheet created successfully", worksheet)),
        Err(err) => {
            if let Some(path) = &file_path {
                files.delete(path).await?;
            }
            Err(err)
        }
    }
}

#[get("/worksheet/<id>")]
pub async fn show(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Worksheet> {
    principal.require_permission(Permission::ViewWorksheet)?;

    Ok(ApiResponse::ok(
        "Worksheet retrieved successfully",
        get_worksheet(db, id).await?,
    ))
}

#[put("/worksheet/<id>", data = "<form>")]
pub async fn update(
    id: i64,
    principal: Principal,
    mut form: Form<WorksheetForm<'_>>,
    files: &State<Store>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Worksheet> {
    principal.require_permission(Permission::EditWorksheets)?;
    let input = form.input()?;
    get_worksheet(db, id).await?;

    let file_path = store_pdf(files.inner().as_ref(), form.pdf_file.as_mut()).await?;

    match update_worksheet(db, id, &input, file_path.as_deref()).await {
        Ok((worksheet, replaced)) => {
            if let Some(replaced) = replaced {
                files.delete(&replaced).await?;
            }
            Ok(ApiResponse::ok("Worksheet updated successfully", worksheet))
        }
        Err(err) => {
            if let Some(path) = &file_path {
                files.delete(path).await?;
            }
            Err(err)
        }
    }
}

#[delete("/worksheet/<id>")]
pub async fn destroy(
    id: i64,
    principal: Principal,
    files: &State<Store>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<()> {
    principal.require_permission(Permission::DeleteWorksheets)?;

    if let Some(path) = delete_worksheet(db, id).await? {
        files.delete(&path).await?;
    }

    Ok(ApiResponse::ok("Worksheet deleted successfully", ()))
}

#[get("/worksheet/<id>/download")]
pub async fn download(
    id: i64,
    principal: Principal,
    files: &State<Store>,
    db: &State<Pool<Sqlite>>,
) -> Result<NamedFile, AppError> {
    principal.require_permission(Permission::ViewWorksheet)?;
    let worksheet = get_worksheet(db, id).await?;

    let path = worksheet
        .file_path
        .as_deref()
        .and_then(|path| files.resolve(path))
        .ok_or_else(|| AppError::NotFound("Worksheet file not found".to_string()))?;

    NamedFile::open(path)
        .await
        .map_err(|_| AppError::NotFound("Worksheet file not found".to_string()))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![index, store, show, update, destroy, download]
}
