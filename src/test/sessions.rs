#[cfg(test)]
mod tests {
    use crate::{
        db::sessions::{
            clean_expired_sessions, create_user_session, get_session_by_token, invalidate_session,
        },
        db::users::{load_principal, set_user_active},
        error::AppError,
        test::utils::test_db::{TestDbBuilder, memory_pool},
    };
    use chrono::{Duration, NaiveDateTime, Utc};
    use rocket::tokio;
    use sqlx::{Pool, Sqlite};
    use uuid::Uuid;

    async fn create_test_session() -> (i64, String, NaiveDateTime, Pool<Sqlite>) {
        let test_db = TestDbBuilder::new()
            .parent("session.user@example.com")
            .build()
            .await
            .expect("Failed to build test database");

        let user_id = test_db.user_id("session.user@example.com");
        let token = format!("test_token_{}", Uuid::new_v4());
        let expires_at = (Utc::now() + Duration::hours(1)).naive_utc();

        (user_id, token, expires_at, test_db.pool)
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (user_id, token, expires_at, pool) = create_test_session().await;

        create_user_session(&pool, user_id, &token, expires_at)
            .await
            .expect("Failed to create session");

        let session = get_session_by_token(&pool, &token)
            .await
            .expect("Failed to get session");

        assert_eq!(session.user_id, user_id);
        assert_eq!(session.token, token);
        assert!(session.is_valid());

        let expires_diff =
            (session.expires_at.and_utc().timestamp() - expires_at.and_utc().timestamp()).abs();
        assert!(
            expires_diff <= 1,
            "Expiration timestamps should match within 1 second"
        );
    }

    #[tokio::test]
    async fn test_get_nonexistent_session() {
        let pool = memory_pool().await.expect("Failed to create database");

        match get_session_by_token(&pool, "nonexistent_token").await {
            Err(AppError::Authentication(msg)) => assert_eq!(msg, "Invalid session token"),
            other => panic!("Expected Authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalidate_session() {
        let (user_id, token, expires_at, pool) = create_test_session().await;
        create_user_session(&pool, user_id, &token, expires_at)
            .await
            .unwrap();

        invalidate_session(&pool, &token).await.unwrap();

        assert!(get_session_by_token(&pool, &token).await.is_err());
    }

    #[tokio::test]
    async fn test_clean_expired_sessions() {
        let (user_id, token, _, pool) = create_test_session().await;
        let expired = (Utc::now() - Duration::hours(1)).naive_utc();
        let live_token = format!("live_{}", Uuid::new_v4());

        create_user_session(&pool, user_id, &token, expired)
            .await
            .unwrap();
        create_user_session(
            &pool,
            user_id,
            &live_token,
            (Utc::now() + Duration::hours(1)).naive_utc(),
        )
        .await
        .unwrap();

        let expired_session = get_session_by_token(&pool, &token).await.unwrap();
        assert!(!expired_session.is_valid());

        assert_eq!(clean_expired_sessions(&pool).await.unwrap(), 1);
        assert!(get_session_by_token(&pool, &token).await.is_err());
        assert!(get_session_by_token(&pool, &live_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_deactivation_ends_sessions_and_principal() {
        let (user_id, token, expires_at, pool) = create_test_session().await;
        create_user_session(&pool, user_id, &token, expires_at)
            .await
            .unwrap();

        set_user_active(&pool, user_id, false).await.unwrap();

        assert!(get_session_by_token(&pool, &token).await.is_err());
        assert!(load_principal(&pool, user_id).await.unwrap().is_none());
    }
}
