#[cfg(test)]
pub mod test_db {
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Once;

    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::{Pool, Sqlite};

    use crate::auth::{Principal, Role};
    use crate::db::apply_schema;
    use crate::db::centers::{CenterInput, create_center};
    use crate::db::curriculum::{
        LevelInput, SubjectInput, WorksheetInput, create_level, create_subject, create_worksheet,
    };
    use crate::db::students::{NewStudent, create_student};
    use crate::db::teachers::{NewTeacher, create_teacher};
    use crate::db::users::{NewUser, create_user, load_principal};
    use crate::error::AppError;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    pub fn init_test_tracing() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
                .with_test_writer()
                .try_init();
        });
    }

    /// Single-connection in-memory store, so every query sees the same database.
    pub async fn memory_pool() -> Result<Pool<Sqlite>, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        apply_schema(&pool).await?;
        Ok(pool)
    }

    pub struct TestUser {
        pub email: String,
        pub role: Role,
    }

    pub struct TestCenter {
        pub name: String,
        pub admin_email: Option<String>,
    }

    pub struct TestTeacher {
        pub email: String,
        pub center: String,
    }

    pub struct TestStudent {
        pub email: String,
        pub center: String,
        pub teacher_email: Option<String>,
        pub parent_email: Option<String>,
        pub monthly_fee: f64,
    }

    pub struct TestWorksheet {
        pub title: String,
        pub subject: String,
        pub level: String,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        centers: Vec<TestCenter>,
        teachers: Vec<TestTeacher>,
        students: Vec<TestStudent>,
        subjects: Vec<(String, Vec<String>)>,
        worksheets: Vec<TestWorksheet>,
    }

    fn name_of(email: &str) -> String {
        email.split('@').next().unwrap_or(email).to_string()
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn super_admin(mut self, email: &str) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                role: Role::SuperAdmin,
            });
            self
        }

        pub fn parent(mut self, email: &str) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                role: Role::Parent,
            });
            self
        }

        pub fn center_admin(mut self, email: &str) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                role: Role::CenterAdmin,
            });
            self
        }

        /// A center administered by `admin_email`, which is created as a center admin.
        pub fn center(mut self, name: &str, admin_email: Option<&str>) -> Self {
            if let Some(email) = admin_email {
                self = self.center_admin(email);
            }
            self.centers.push(TestCenter {
                name: name.to_string(),
                admin_email: admin_email.map(String::from),
            });
            self
        }

        pub fn teacher(mut self, email: &str, center: &str) -> Self {
            self.teachers.push(TestTeacher {
                email: email.to_string(),
                center: center.to_string(),
            });
            self
        }

        pub fn student(
            mut self,
            email: &str,
            center: &str,
            teacher_email: Option<&str>,
            parent_email: Option<&str>,
            monthly_fee: f64,
        ) -> Self {
            self.students.push(TestStudent {
                email: email.to_string(),
                center: center.to_string(),
                teacher_email: teacher_email.map(String::from),
                parent_email: parent_email.map(String::from),
                monthly_fee,
            });
            self
        }

        pub fn subject(mut self, name: &str, levels: &[&str]) -> Self {
            self.subjects.push((
                name.to_string(),
                levels.iter().map(|level| level.to_string()).collect(),
            ));
            self
        }

        pub fn worksheet(mut self, title: &str, subject: &str, level: &str) -> Self {
            self.worksheets.push(TestWorksheet {
                title: title.to_string(),
                subject: subject.to_string(),
                level: level.to_string(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            init_test_tracing();
            let pool = memory_pool().await?;

            let mut db = TestDb {
                pool,
                user_ids: HashMap::new(),
                center_ids: HashMap::new(),
                student_ids: HashMap::new(),
                subject_ids: HashMap::new(),
                level_ids: HashMap::new(),
                worksheet_ids: HashMap::new(),
            };

            let mut tx = db.pool.begin().await?;

            for user in &self.users {
                let id = create_user(
                    &mut tx,
                    &NewUser {
                        name: name_of(&user.email),
                        email: user.email.clone(),
                        password: STANDARD_PASSWORD.to_string(),
                        role: user.role,
                        phone: None,
                        address: None,
                    },
                )
                .await?;
                db.user_ids.insert(user.email.clone(), id);
            }

            for center in &self.centers {
                let admin_id = center
                    .admin_email
                    .as_ref()
                    .and_then(|email| db.user_ids.get(email).copied());
                let id = create_center(
                    &mut tx,
                    &CenterInput {
                        name: center.name.clone(),
                        admin_id,
                        address: None,
                        city: Some("Springfield".to_string()),
                        phone: None,
                        is_active: Some(true),
                    },
                )
                .await?;
                db.center_ids.insert(center.name.clone(), id);
            }

            for teacher in &self.teachers {
                let center_id = db.center_ids[&teacher.center];
                create_teacher(
                    &mut tx,
                    center_id,
                    &NewTeacher {
                        name: name_of(&teacher.email),
                        email: teacher.email.clone(),
                        password: STANDARD_PASSWORD.to_string(),
                        phone: None,
                        address: None,
                        center_id: Some(center_id),
                        employee_id: None,
                        qualification: None,
                        join_date: None,
                    },
                )
                .await?;

                let user_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
                    .bind(&teacher.email)
                    .fetch_one(&mut *tx)
                    .await?;
                db.user_ids.insert(teacher.email.clone(), user_id);
            }

            for student in &self.students {
                let center_id = db.center_ids[&student.center];
                let student_id = create_student(
                    &mut tx,
                    center_id,
                    &NewStudent {
                        name: name_of(&student.email),
                        email: student.email.clone(),
                        password: STANDARD_PASSWORD.to_string(),
                        phone: None,
                        address: None,
                        center_id: Some(center_id),
                        parent_id: student
                            .parent_email
                            .as_ref()
                            .map(|email| db.user_ids[email]),
                        teacher_id: student
                            .teacher_email
                            .as_ref()
                            .map(|email| db.user_ids[email]),
                        enrollment_no: None,
                        date_of_birth: None,
                        grade: Some("5".to_string()),
                        enrollment_date: None,
                        subjects: vec!["Math".to_string()],
                        current_level: Some("A".to_string()),
                        monthly_fee: student.monthly_fee,
                    },
                )
                .await?;

                let user_id: i64 = sqlx::query_scalar("SELECT user_id FROM students WHERE id = ?")
                    .bind(student_id)
                    .fetch_one(&mut *tx)
                    .await?;
                db.user_ids.insert(student.email.clone(), user_id);
                db.student_ids.insert(student.email.clone(), student_id);
            }

            tx.commit().await?;

            for (subject, levels) in &self.subjects {
                let created = create_subject(
                    &db.pool,
                    &SubjectInput {
                        name: subject.clone(),
                        description: None,
                    },
                )
                .await?;
                db.subject_ids.insert(subject.clone(), created.id);

                for (order_index, level) in levels.iter().enumerate() {
                    let created_level = create_level(
                        &db.pool,
                        &LevelInput {
                            subject_id: created.id,
                            name: level.clone(),
                            order_index: order_index as i64,
                            description: None,
                        },
                    )
                    .await?;
                    db.level_ids
                        .insert(format!("{}/{}", subject, level), created_level.id);
                }
            }

            let author = db.user_ids.values().copied().min();
            for worksheet in &self.worksheets {
                let created = create_worksheet(
                    &db.pool,
                    &WorksheetInput {
                        subject_id: db.subject_ids[&worksheet.subject],
                        level_id: db.level_ids[&format!("{}/{}", worksheet.subject, worksheet.level)],
                        title: worksheet.title.clone(),
                        worksheet_no: None,
                        description: None,
                        total_marks: 100,
                        time_limit_minutes: Some(30),
                    },
                    None,
                    author.unwrap_or(1),
                )
                .await?;
                db.worksheet_ids.insert(worksheet.title.clone(), created.id);
            }

            Ok(db)
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_ids: HashMap<String, i64>,
        pub center_ids: HashMap<String, i64>,
        pub student_ids: HashMap<String, i64>,
        pub subject_ids: HashMap<String, i64>,
        pub level_ids: HashMap<String, i64>,
        pub worksheet_ids: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, email: &str) -> i64 {
            self.user_ids[email]
        }

        pub fn center_id(&self, name: &str) -> i64 {
            self.center_ids[name]
        }

        /// The `students.id` row, not the user id.
        pub fn student_id(&self, email: &str) -> i64 {
            self.student_ids[email]
        }

        pub fn worksheet_id(&self, title: &str) -> i64 {
            self.worksheet_ids[title]
        }

        pub fn level_id(&self, subject: &str, level: &str) -> i64 {
            self.level_ids[&format!("{}/{}", subject, level)]
        }

        pub async fn principal(&self, email: &str) -> Principal {
            load_principal(&self.pool, self.user_id(email))
                .await
                .unwrap()
                .unwrap()
        }
    }

    /// Two centers, each with an admin, a teacher and a student; one parent
    /// whose only child is in North. One subject with two levels.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .super_admin("root@example.com")
            .parent("pat@example.com")
            .parent("quinn@example.com")
            .center("North", Some("north.admin@example.com"))
            .center("South", Some("south.admin@example.com"))
            .teacher("alice@example.com", "North")
            .teacher("bob@example.com", "South")
            .student(
                "sam@example.com",
                "North",
                Some("alice@example.com"),
                Some("pat@example.com"),
                100.0,
            )
            .student("nia@example.com", "North", None, None, 90.0)
            .student(
                "sue@example.com",
                "South",
                Some("bob@example.com"),
                Some("quinn@example.com"),
                80.0,
            )
            .subject("Math", &["A", "B"])
            .worksheet("Addition 1", "Math", "A")
            .worksheet("Addition 2", "Math", "A")
            .worksheet("Fractions 1", "Math", "B")
            .build()
            .await
            .unwrap()
    }
}

#[cfg(test)]
pub mod test_client {
    use std::sync::Arc;

    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::{Client, LocalRequest};
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};

    use super::test_db::{STANDARD_PASSWORD, TestDb};
    use crate::env::AppConfig;
    use crate::storage::{FileStore, LocalFileStore};

    pub fn test_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            storage_root: std::env::temp_dir()
                .join(format!("tutor-center-test-{}", uuid::Uuid::new_v4())),
            session_hours: 24,
            otlp_endpoint: None,
            otlp_headers: Vec::new(),
        }
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let config = test_config();
        let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(config.storage_root.clone()));
        let rocket = crate::init_rocket(test_db.pool.clone(), config, store);
        let client = Client::tracked(rocket)
            .await
            .expect("valid rocket instance");
        (client, test_db)
    }

    /// Logs in and returns the bearer token.
    pub async fn login_test_user(client: &Client, email: &str) -> String {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": STANDARD_PASSWORD }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "login failed for {}", email);
        let body: Value = response.into_json().await.unwrap();
        body["data"]["token"].as_str().unwrap().to_string()
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token))
    }

    pub fn authed<'c>(request: LocalRequest<'c>, token: &str) -> LocalRequest<'c> {
        request.header(bearer(token))
    }

    /// The `data` member of a success envelope.
    pub fn data<T: DeserializeOwned>(body: &Value) -> T {
        serde_json::from_value(body["data"].clone()).unwrap()
    }
}
