use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;

use super::Principal;
use crate::db::sessions::get_session_by_token;
use crate::db::users::load_principal;
use crate::validation::ErrorEnvelope;

pub const SESSION_COOKIE: &str = "session_token";

/// The raw session token presented with a request, from an
/// `Authorization: Bearer` header or the private session cookie.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

fn bearer_token(request: &Request<'_>) -> Option<String> {
    let header = request.headers().get_one("Authorization")?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionToken {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = bearer_token(request).or_else(|| {
            request
                .cookies()
                .get_private(SESSION_COOKIE)
                .map(|cookie| cookie.value().to_string())
        });

        match token {
            Some(token) => Outcome::Success(SessionToken(token)),
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Principal {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("principal_guard");
        let _guard = auth_span.enter();

        let SessionToken(token) = match request.guard::<SessionToken>().await {
            Outcome::Success(token) => token,
            _ => return Outcome::Error((Status::Unauthorized, ())),
        };

        let Some(db) = request.rocket().state::<SqlitePool>() else {
            tracing::error!("Database pool not found in managed state");
            return Outcome::Error((Status::InternalServerError, ()));
        };

        let session = match get_session_by_token(db, &token).await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(error = %err, "Invalid session token");
                return Outcome::Error((Status::Unauthorized, ()));
            }
        };

        if !session.is_valid() {
            tracing::warn!(user_id = %session.user_id, "Session token expired");
            return Outcome::Error((Status::Unauthorized, ()));
        }

        match load_principal(db, session.user_id).await {
            Ok(Some(principal)) => {
                tracing::info!(user_id = %principal.id, role = %principal.role, "Principal resolved");
                Outcome::Success(principal)
            }
            Ok(None) => {
                tracing::warn!(user_id = %session.user_id, "Session belongs to an inactive or missing user");
                Outcome::Error((Status::Unauthorized, ()))
            }
            Err(err) => {
                tracing::error!(user_id = %session.user_id, error = ?err, "Failed to load principal");
                Outcome::Error((Status::InternalServerError, ()))
            }
        }
    }
}

#[catch(401)]
pub fn unauthorized(_req: &Request) -> Custom<Json<ErrorEnvelope>> {
    Custom(
        Status::Unauthorized,
        Json(ErrorEnvelope::new("Authentication required".to_string(), None)),
    )
}

#[catch(403)]
pub fn forbidden(_req: &Request) -> Custom<Json<ErrorEnvelope>> {
    tracing::warn!("Forbidden access attempt");
    Custom(
        Status::Forbidden,
        Json(ErrorEnvelope::new(
            "You don't have permission to perform this action".to_string(),
            None,
        )),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Header;
    use rocket::local::asynchronous::Client;

    #[rocket::async_test]
    async fn test_bearer_header_is_preferred() {
        let client = Client::untracked(rocket::build()).await.unwrap();
        let mut request = client.get("/");
        request.add_header(Header::new("Authorization", "Bearer abc123"));
        assert_eq!(bearer_token(request.inner()), Some("abc123".to_string()));
    }

    #[rocket::async_test]
    async fn test_malformed_authorization_is_ignored() {
        let client = Client::untracked(rocket::build()).await.unwrap();
        let mut request = client.get("/");
        request.add_header(Header::new("Authorization", "Basic abc123"));
        assert_eq!(bearer_token(request.inner()), None);

        let mut request = client.get("/");
        request.add_header(Header::new("Authorization", "Bearer   "));
        assert_eq!(bearer_token(request.inner()), None);
    }
}
