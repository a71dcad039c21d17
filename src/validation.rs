use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rocket::Request;
use rocket::form::Form;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::error::AppError;

pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

static MONTH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("month pattern is a valid regex"));

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorEnvelope {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl ErrorEnvelope {
    pub fn new(message: String, errors: Option<FieldErrors>) -> Self {
        Self {
            status: "Error".to_string(),
            message,
            errors,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SuccessBody<T> {
    pub status: String,
    pub message: String,
    pub data: T,
}

pub struct ApiResponse<T> {
    status: Status,
    message: String,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
            data,
        }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            status: Status::Created,
            message: message.into(),
            data,
        }
    }
}

impl<'r, T: Serialize> rocket::response::Responder<'r, 'static> for ApiResponse<T> {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'static> {
        let body = SuccessBody {
            status: "Success".to_string(),
            message: self.message,
            data: self.data,
        };
        Custom(self.status, Json(body)).respond_to(req)
    }
}

pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate().map_err(into_field_errors)?;
        Ok(inner)
    }
}

impl<T: Validate> JsonValidateExt<T> for Form<T> {
    fn validate_custom(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate().map_err(into_field_errors)?;
        Ok(inner)
    }
}

pub fn into_field_errors(errors: ValidationErrors) -> AppError {
    let mut out = FieldErrors::new();
    collect_errors(&errors, "", &mut out);
    AppError::Validation(out)
}

fn collect_errors(errors: &ValidationErrors, prefix: &str, out: &mut FieldErrors) {
    for (field, kind) in errors.errors() {
        let key = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                out.entry(key).or_default().extend(field_errors.iter().map(|error| {
                    error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", error.code))
                }));
            }
            ValidationErrorsKind::Struct(inner) => collect_errors(inner, &key, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_errors(inner, &format!("{}.{}", key, index), out);
                }
            }
        }
    }
}

pub fn validate_month(value: &str) -> Result<(), ValidationError> {
    if parse_month(value).is_some() {
        Ok(())
    } else {
        let mut error = ValidationError::new("month");
        error.message = Some("Month must be in YYYY-MM format".into());
        Err(error)
    }
}

/// First and last day of a `YYYY-MM` month.
pub fn parse_month(value: &str) -> Option<(NaiveDate, NaiveDate)> {
    let captures = MONTH_PATTERN.captures(value)?;
    let year: i32 = captures.get(1)?.as_str().parse().ok()?;
    let month: u32 = captures.get(2)?.as_str().parse().ok()?;

    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };

    Some((first, next.pred_opt()?))
}

pub fn month_bounds(value: &str) -> Result<(NaiveDate, NaiveDate), AppError> {
    parse_month(value).ok_or_else(|| AppError::invalid("month", "Month must be in YYYY-MM format"))
}

pub fn month_of(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Reads a snake_case enum value from a query parameter.
pub fn parse_choice<T: DeserializeOwned>(field: &str, value: &str) -> Result<T, AppError> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| AppError::invalid(field, &format!("Unknown {} {:?}", field, value)))
}

/// Like [`parse_choice`] for an optional parameter.
pub fn parse_optional_choice<T: DeserializeOwned>(
    field: &str,
    value: Option<&str>,
) -> Result<Option<T>, AppError> {
    value.map(|value| parse_choice(field, value)).transpose()
}

fn envelope(status: Status, message: &str) -> Custom<Json<ErrorEnvelope>> {
    Custom(status, Json(ErrorEnvelope::new(message.to_string(), None)))
}

#[catch(400)]
pub fn bad_request(_req: &Request) -> Custom<Json<ErrorEnvelope>> {
    envelope(Status::BadRequest, "Bad request")
}

#[catch(404)]
pub fn not_found(_req: &Request) -> Custom<Json<ErrorEnvelope>> {
    envelope(Status::NotFound, "Resource not found")
}

#[catch(422)]
pub fn unprocessable(_req: &Request) -> Custom<Json<ErrorEnvelope>> {
    envelope(Status::UnprocessableEntity, "Validation failed")
}

#[catch(500)]
pub fn internal_error(_req: &Request) -> Custom<Json<ErrorEnvelope>> {
    envelope(Status::InternalServerError, "Internal server error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Validate)]
    struct Line {
        #[validate(length(min = 1, message = "Status is required"))]
        status: String,
    }

    #[derive(Debug, Validate)]
    struct Sheet {
        #[validate(custom(function = "validate_month"))]
        month: String,
        #[validate(nested)]
        lines: Vec<Line>,
    }

    #[test]
    fn test_parse_month_bounds() {
        let (first, last) = parse_month("2024-02").unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (_, last) = parse_month("2023-12").unwrap();
        assert_eq!(last, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn test_parse_month_rejects_garbage() {
        assert!(parse_month("2024-13").is_none());
        assert!(parse_month("2024-1").is_none());
        assert!(parse_month("March").is_none());
    }

    #[test]
    fn test_nested_list_errors_are_flattened() {
        let sheet = Sheet {
            month: "2024-00".to_string(),
            lines: vec![
                Line {
                    status: "present".to_string(),
                },
                Line {
                    status: String::new(),
                },
            ],
        };

        let err = sheet.validate().map_err(into_field_errors).unwrap_err();
        let AppError::Validation(fields) = err else {
            panic!("expected validation error");
        };

        assert_eq!(fields["month"], vec!["Month must be in YYYY-MM format"]);
        assert_eq!(fields["lines.1.status"], vec!["Status is required"]);
        assert!(!fields.contains_key("lines.0.status"));
    }

    #[test]
    fn test_parse_choice_reads_snake_case() {
        use crate::models::FeeStatus;

        let status: FeeStatus = parse_choice("status", "overdue").unwrap();
        assert_eq!(status, FeeStatus::Overdue);

        let missing: Option<FeeStatus> = parse_optional_choice("status", None).unwrap();
        assert!(missing.is_none());

        assert!(matches!(
            parse_choice::<FeeStatus>("status", "Overdue"),
            Err(AppError::Validation(_))
        ));
    }
}
