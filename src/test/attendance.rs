#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::auth::Permission;
    use crate::db::attendance::{
        AttendanceCorrection, AttendanceLine, AttendanceQuery, correct_attendance,
        list_attendance, upsert_attendance,
    };
    use crate::models::AttendanceStatus;
    use crate::reports::attendance_summary;
    use crate::scope::authorize;
    use crate::test::utils::test_db::{TestDb, create_standard_test_db};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    async fn mark(db: &TestDb, student: &str, date: NaiveDate, status: AttendanceStatus) {
        let center = if student == "sue@example.com" {
            "South"
        } else {
            "North"
        };
        let mut conn = db.pool.acquire().await.unwrap();
        upsert_attendance(
            &mut conn,
            db.center_id(center),
            date,
            &AttendanceLine {
                student_id: db.student_id(student),
                status,
                notes: None,
            },
            db.user_id("alice@example.com"),
        )
        .await
        .unwrap();
    }

    #[rocket::async_test]
    async fn test_marking_twice_overwrites_the_day() {
        let db = create_standard_test_db().await;
        mark(&db, "sam@example.com", day(2), AttendanceStatus::Absent).await;
        mark(&db, "sam@example.com", day(2), AttendanceStatus::Late).await;

        let root = db.principal("root@example.com").await;
        let scope = authorize(&root, Permission::ViewAttendance).unwrap();
        let rows = list_attendance(
            &db.pool,
            scope,
            AttendanceQuery {
                student_id: Some(db.student_id("sam@example.com")),
                ..AttendanceQuery::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, AttendanceStatus::Late);
        assert_eq!(rows[0].center_id, db.center_id("North"));
    }

    #[rocket::async_test]
    async fn test_correction_keeps_notes_when_absent() {
        let db = create_standard_test_db().await;
        mark(&db, "sam@example.com", day(3), AttendanceStatus::Absent).await;

        let id: i64 = sqlx::query_scalar("SELECT id FROM attendances WHERE student_id = ?")
            .bind(db.student_id("sam@example.com"))
            .fetch_one(&db.pool)
            .await
            .unwrap();

        let corrected = correct_attendance(
            &db.pool,
            id,
            &AttendanceCorrection {
                status: AttendanceStatus::Present,
                notes: Some("Arrived after roll call".to_string()),
            },
            db.user_id("north.admin@example.com"),
        )
        .await
        .unwrap();
        assert_eq!(corrected.status, AttendanceStatus::Present);
        assert_eq!(
            corrected.marked_by,
            Some(db.user_id("north.admin@example.com"))
        );

        let again = correct_attendance(
            &db.pool,
            id,
            &AttendanceCorrection {
                status: AttendanceStatus::Late,
                notes: None,
            },
            db.user_id("north.admin@example.com"),
        )
        .await
        .unwrap();
        assert_eq!(again.notes.as_deref(), Some("Arrived after roll call"));
    }

    #[rocket::async_test]
    async fn test_month_window_and_center_scope() {
        let db = create_standard_test_db().await;
        mark(&db, "sam@example.com", day(1), AttendanceStatus::Present).await;
        mark(&db, "sam@example.com", day(30), AttendanceStatus::Present).await;
        mark(
            &db,
            "sam@example.com",
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            AttendanceStatus::Present,
        )
        .await;
        mark(&db, "sue@example.com", day(1), AttendanceStatus::Absent).await;

        let admin = db.principal("north.admin@example.com").await;
        let scope = authorize(&admin, Permission::ViewAttendance).unwrap();
        let april = list_attendance(
            &db.pool,
            scope,
            AttendanceQuery {
                student_id: None,
                from: Some(day(1)),
                to: Some(day(30)),
            },
        )
        .await
        .unwrap();

        assert_eq!(april.len(), 2);
        assert!(april.iter().all(|row| row.student_id == db.student_id("sam@example.com")));
    }

    #[rocket::async_test]
    async fn test_summary_counts_and_rate() {
        let db = create_standard_test_db().await;
        mark(&db, "sam@example.com", day(1), AttendanceStatus::Present).await;
        mark(&db, "sam@example.com", day(2), AttendanceStatus::Present).await;
        mark(&db, "nia@example.com", day(2), AttendanceStatus::Late).await;
        mark(&db, "sue@example.com", day(2), AttendanceStatus::Absent).await;

        let admin = db.principal("north.admin@example.com").await;
        let scope = authorize(&admin, Permission::AttendanceSummary).unwrap();
        let summary = attendance_summary(&db.pool, scope, "2024-04").await.unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.present, 2);
        assert_eq!(summary.late, 1);
        assert_eq!(summary.absent, 0);
        assert_eq!(summary.attendance_rate, 2.0 / 3.0 * 100.0);

        let empty = attendance_summary(&db.pool, scope, "2023-01").await.unwrap();
        assert_eq!(empty.total, 0);
    }
}
