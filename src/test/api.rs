#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use serde_json::{Value, json};

    use crate::auth::User;
    use crate::models::Student;
    use crate::test::utils::test_client::{authed, data, login_test_user, setup_test_client};
    use crate::test::utils::test_db::{TestDbBuilder, create_standard_test_db};

    #[rocket::async_test]
    async fn test_health() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["status"], "Success");
        assert_eq!(body["data"]["database"], true);
    }

    #[rocket::async_test]
    async fn test_login_and_profile() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let token = login_test_user(&client, "alice@example.com").await;
        let response = authed(client.get("/api/profile"), &token).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["data"]["email"], "alice@example.com");
        assert_eq!(body["data"]["role"], "teacher");
        assert!(body["data"]["password"].is_null());
    }

    #[rocket::async_test]
    async fn test_wrong_password_is_unauthorized() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "email": "alice@example.com", "password": "not-the-one" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Unauthorized);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["status"], "Error");
        assert_eq!(body["message"], "Invalid credentials");
    }

    #[rocket::async_test]
    async fn test_auth_required_endpoints() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        for endpoint in ["/api/profile", "/api/student", "/api/dashboard/kpis", "/api/fees"] {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );

            let body: Value = response.into_json().await.unwrap();
            assert_eq!(body["message"], "Authentication required");
        }
    }

    #[rocket::async_test]
    async fn test_forged_token_is_rejected() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = authed(client.get("/api/profile"), "forged-token")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_logout_ends_the_session() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "pat@example.com").await;

        let response = authed(client.post("/api/logout"), &token).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = authed(client.get("/api/profile"), &token).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_parent_cannot_view_other_child() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "pat@example.com").await;

        let own = format!("/api/student/{}", db.student_id("sam@example.com"));
        let response = authed(client.get(own), &token).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let other = format!("/api/student/{}", db.student_id("sue@example.com"));
        let response = authed(client.get(other), &token).dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);

        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["status"], "Error");
    }

    #[rocket::async_test]
    async fn test_parent_filter_on_other_child_is_forbidden() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "pat@example.com").await;

        for base in ["/api/fees", "/api/attendance"] {
            let own = format!("{}?student_id={}", base, db.student_id("sam@example.com"));
            let response = authed(client.get(own), &token).dispatch().await;
            assert_eq!(response.status(), Status::Ok, "{}", base);

            let other = format!("{}?student_id={}", base, db.student_id("sue@example.com"));
            let response = authed(client.get(other), &token).dispatch().await;
            assert_eq!(response.status(), Status::Forbidden, "{}", base);

            let body: Value = response.into_json().await.unwrap();
            assert_eq!(body["status"], "Error");
        }
    }

    #[rocket::async_test]
    async fn test_parent_cannot_reach_staff_listings() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "pat@example.com").await;

        for endpoint in ["/api/student", "/api/attendance/today", "/api/fees/unpaid-overdue"] {
            let response = authed(client.get(endpoint), &token).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Forbidden,
                "Endpoint {} was open to a parent",
                endpoint
            );
        }

        let token = login_test_user(&client, "alice@example.com").await;
        let response = authed(client.get("/api/attendance/today"), &token)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_center_admin_listing_ignores_other_center() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "north.admin@example.com").await;

        let uri = format!("/api/student?center_id={}", db.center_id("South"));
        let response = authed(client.get(uri), &token).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value = response.into_json().await.unwrap();
        let students: Vec<Student> = data(&body);
        assert_eq!(students.len(), 2);
        assert!(students.iter().all(|s| s.center_id == db.center_id("North")));
    }

    #[rocket::async_test]
    async fn test_registration_validation_errors() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "name": "Morgan",
                    "email": "not-an-email",
                    "password": "password123",
                    "password_confirmation": "password124"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["message"], "Validation failed");
        assert!(body["errors"]["email"].is_array());
        assert!(body["errors"]["password_confirmation"].is_array());
    }

    #[rocket::async_test]
    async fn test_parent_registration_and_duplicate_email() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;
        let request = json!({
            "name": "Morgan",
            "email": "morgan@example.com",
            "password": "password123",
            "password_confirmation": "password123"
        })
        .to_string();

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(&request)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);

        let body: Value = response.into_json().await.unwrap();
        let user: User = data(&body);
        assert_eq!(user.email, "morgan@example.com");

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(&request)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
    }

    #[rocket::async_test]
    async fn test_first_user_may_bootstrap_super_admin() {
        let (client, _) = setup_test_client(TestDbBuilder::new().build().await.unwrap()).await;

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "name": "Root",
                    "email": "root@example.com",
                    "password": "password123",
                    "password_confirmation": "password123",
                    "role": "super_admin"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);
    }

    #[rocket::async_test]
    async fn test_bulk_attendance_is_all_or_nothing() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "alice@example.com").await;

        let response = authed(client.post("/api/attendance/bulk"), &token)
            .header(ContentType::JSON)
            .body(
                json!({
                    "date": "2024-04-02",
                    "attendance": [
                        { "student_id": db.student_id("sam@example.com"), "status": "present" },
                        { "student_id": db.student_id("sue@example.com"), "status": "absent" }
                    ]
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendances")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);

        let response = authed(client.post("/api/attendance/bulk"), &token)
            .header(ContentType::JSON)
            .body(
                json!({
                    "date": "2024-04-02",
                    "attendance": [
                        { "student_id": db.student_id("sam@example.com"), "status": "present" }
                    ]
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["data"]["marked"], 1);
    }

    #[rocket::async_test]
    async fn test_unknown_status_filter_is_rejected() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "root@example.com").await;

        let response = authed(client.get("/api/assignment?status=lost"), &token)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
    }

    #[rocket::async_test]
    async fn test_super_admin_cannot_deactivate_self() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "root@example.com").await;

        let own = format!("/api/users/{}/toggle-status", db.user_id("root@example.com"));
        let response = authed(client.patch(own), &token).dispatch().await;
        assert_eq!(response.status(), Status::UnprocessableEntity);

        let other = format!("/api/users/{}/toggle-status", db.user_id("pat@example.com"));
        let response = authed(client.patch(other), &token).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["data"]["is_active"], false);
    }

    #[rocket::async_test]
    async fn test_center_admin_with_center_cannot_be_deleted() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "root@example.com").await;

        let uri = format!("/api/center-admins/{}", db.user_id("north.admin@example.com"));
        let response = authed(client.delete(uri), &token).dispatch().await;
        assert_eq!(response.status(), Status::Conflict);
    }

    #[rocket::async_test]
    async fn test_kpis_follow_the_caller_role() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;
        let token = login_test_user(&client, "sam@example.com").await;

        let response = authed(client.get("/api/dashboard/kpis"), &token)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["data"]["role"], "student");
        assert_eq!(body["data"]["stats"]["current_level"], "A");
    }

    #[rocket::async_test]
    async fn test_unknown_route_uses_error_envelope() {
        let (client, _) = setup_test_client(create_standard_test_db().await).await;

        let response = client.get("/api/nowhere").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);

        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["status"], "Error");
    }
}
