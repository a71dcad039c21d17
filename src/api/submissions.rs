use rocket::FromForm;
use rocket::State;
use rocket::form::Form;
use rocket::fs::{NamedFile, TempFile};
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use super::{Store, now, student_scope};
use crate::auth::{Permission, Principal};
use crate::db::assignments::get_assignment;
use crate::db::submissions::{
    Grade, create_submission, get_submission, get_submission_for_assignment, list_submissions,
};
use crate::error::AppError;
use crate::models::{Submission, SubmissionStatus};
use crate::progress::grade_submission;
use crate::scope::authorize;
use crate::storage::Bucket;
use crate::validation::{ApiResponse, ApiResult, JsonValidateExt, parse_optional_choice};

#[derive(FromForm)]
pub struct SubmissionForm<'r> {
    pub assignment_id: i64,
    pub submitted_file: Option<TempFile<'r>>,
    pub time_taken_min: Option<i64>,
}

/// Hands in work for an assignment. Students may only submit their own.
#[post("/submission", data = "<form>")]
pub async fn submit(
    principal: Principal,
    mut form: Form<SubmissionForm<'_>>,
    files: &State<Store>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Submission> {
    let assignment = get_assignment(db, form.assignment_id).await?;
    student_scope(db, &principal, Permission::SubmitWork, assignment.student_id).await?;

    if form.time_taken_min.is_some_and(|minutes| minutes < 0) {
        return Err(AppError::invalid(
            "time_taken_min",
            "Time taken cannot be negative",
        ));
    }

    let file_path = match form.submitted_file.as_mut() {
        Some(file) if file.len() > 0 => Some(files.store(Bucket::Submissions, file).await?),
        _ => None,
    };

    let created = async {
        let mut tx = db.begin().await?;
        let id = create_submission(
            &mut tx,
            &assignment,
            file_path.as_deref(),
            form.time_taken_min,
            now(),
        )
        .await?;
        tx.commit().await?;
        Ok::<i64, AppError>(id)
    }
    .await;

    match created {
        Ok(id) => Ok(ApiResponse::created(
            "Worksheet submitted successfully",
            get_submission(db, id).await?,
        )),
        Err(err) => {
            if let Some(path) = &file_path {
                files.delete(path).await?;
            }
            Err(err)
        }
    }
}

#[patch("/submission/<id>/grade", data = "<grade>")]
pub async fn grade(
    id: i64,
    principal: Principal,
    grade: Json<Grade>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Submission> {
    let submission = get_submission(db, id).await?;
    student_scope(db, &principal, Permission::GradeSubmissions, submission.student_id).await?;
    let grade = grade.validate_custom()?;

    Ok(ApiResponse::ok(
        "Submission graded successfully",
        grade_submission(db, &submission, &grade, principal.id, now()).await?,
    ))
}

#[get("/submission?<status>")]
pub async fn index(
    status: Option<&str>,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Submission>> {
    let scope = authorize(&principal, Permission::ListSubmissions)?;
    let status = parse_optional_choice("status", status)?;

    Ok(ApiResponse::ok(
        "Submissions retrieved successfully",
        list_submissions(db, scope, status).await?,
    ))
}

#[get("/submission/pending")]
pub async fn pending(principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Vec<Submission>> {
    let scope = authorize(&principal, Permission::ListSubmissions)?;

    Ok(ApiResponse::ok(
        "Pending submissions retrieved successfully",
        list_submissions(db, scope, Some(SubmissionStatus::Pending)).await?,
    ))
}

#[get("/submission/<id>")]
pub async fn show(id: i64, principal: Principal, db: &State<Pool<Sqlite>>) -> ApiResult<Submission> {
    let submission = get_submission(db, id).await?;
    student_scope(db, &principal, Permission::ViewSubmission, submission.student_id).await?;

    Ok(ApiResponse::ok("Submission retrieved successfully", submission))
}

#[get("/submission/assignment/<assignment_id>")]
pub async fn for_assignment(
    assignment_id: i64,
    principal: Principal,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Submission> {
    let assignment = get_assignment(db, assignment_id).await?;
    student_scope(db, &principal, Permission::ViewSubmission, assignment.student_id).await?;

    let submission = get_submission_for_assignment(db, assignment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No submission for this assignment".to_string()))?;

    Ok(ApiResponse::ok("Submission retrieved successfully", submission))
}

#[get("/submission/<id>/download", rank = 2)]
pub async fn download(
    id: i64,
    principal: Principal,
    files: &State<Store>,
    db: &State<Pool<Sqlite>>,
) -> Result<NamedFile, AppError> {
    let submission = get_submission(db, id).await?;
    student_scope(db, &principal, Permission::ViewSubmission, submission.student_id).await?;

    let path = submission
        .submitted_file
        .as_deref()
        .and_then(|path| files.resolve(path))
        .ok_or_else(|| AppError::NotFound("Submitted file not found".to_string()))?;

    NamedFile::open(path)
        .await
        .map_err(|_| AppError::NotFound("Submitted file not found".to_string()))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![submit, grade, index, pending, show, for_assignment, download]
}
