#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::auth::Permission;
    use crate::db::assignments::{
        AssignmentChanges, BulkAssignment, cancel_assignment, create_assignments, get_assignment,
        list_assignments, update_assignment,
    };
    use crate::db::submissions::{Grade, create_submission, get_submission};
    use crate::error::AppError;
    use crate::models::{AssignmentStatus, Submission};
    use crate::progress::grade_submission;
    use crate::scope::authorize;
    use crate::test::utils::test_db::{TestDb, create_standard_test_db};

    fn assigned_on() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
    }

    async fn assign(db: &TestDb, worksheet: &str, students: &[&str]) -> Result<Vec<i64>, AppError> {
        let mut tx = db.pool.begin().await?;
        let ids = create_assignments(
            &mut tx,
            &BulkAssignment {
                worksheet_id: db.worksheet_id(worksheet),
                student_ids: students.iter().map(|email| db.student_id(email)).collect(),
                due_date: NaiveDate::from_ymd_opt(2024, 5, 13),
                notes: Some("Page 1 only".to_string()),
            },
            db.user_id("root@example.com"),
            assigned_on(),
        )
        .await?;
        tx.commit().await?;
        Ok(ids)
    }

    #[rocket::async_test]
    async fn test_bulk_assignment_creates_one_row_per_student() {
        let db = create_standard_test_db().await;

        let ids = assign(&db, "Addition 1", &["sam@example.com", "sue@example.com"])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let assignment = get_assignment(&db.pool, ids[0]).await.unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Assigned);
        assert_eq!(assignment.assigned_date, assigned_on());
        assert_eq!(assignment.worksheet_title, "Addition 1");
    }

    #[rocket::async_test]
    async fn test_open_duplicate_rolls_back_the_batch() {
        let db = create_standard_test_db().await;
        assign(&db, "Addition 1", &["sam@example.com"]).await.unwrap();

        let err = assign(&db, "Addition 1", &["nia@example.com", "sam@example.com"])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let root = db.principal("root@example.com").await;
        let scope = authorize(&root, Permission::ViewAssignments).unwrap();
        let all = list_assignments(&db.pool, scope, None, None).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[rocket::async_test]
    async fn test_unknown_worksheet_is_a_validation_error() {
        let db = create_standard_test_db().await;

        let mut tx = db.pool.begin().await.unwrap();
        let err = create_assignments(
            &mut tx,
            &BulkAssignment {
                worksheet_id: 9999,
                student_ids: vec![db.student_id("sam@example.com")],
                due_date: None,
                notes: None,
            },
            db.user_id("root@example.com"),
            assigned_on(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    async fn hand_in(db: &TestDb, assignment_id: i64) -> Submission {
        let assignment = get_assignment(&db.pool, assignment_id).await.unwrap();
        let mut tx = db.pool.begin().await.unwrap();
        let submitted_at = assigned_on().and_hms_opt(15, 0, 0).unwrap();
        let id = create_submission(&mut tx, &assignment, None, Some(20), submitted_at)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        get_submission(&db.pool, id).await.unwrap()
    }

    async fn grade(db: &TestDb, submission: &Submission, score: f64) {
        grade_submission(
            &db.pool,
            submission,
            &Grade {
                score,
                error_count: 0,
                teacher_feedback: None,
            },
            db.user_id("root@example.com"),
            assigned_on().and_hms_opt(18, 0, 0).unwrap(),
        )
        .await
        .unwrap();
    }

    fn set_status(status: AssignmentStatus) -> AssignmentChanges {
        AssignmentChanges {
            status: Some(status),
            ..AssignmentChanges::default()
        }
    }

    #[rocket::async_test]
    async fn test_manual_status_changes_only_return_graded_work() {
        let db = create_standard_test_db().await;
        let ids = assign(&db, "Addition 1", &["sam@example.com"]).await.unwrap();
        let assignment = get_assignment(&db.pool, ids[0]).await.unwrap();

        for skipped in [AssignmentStatus::Submitted, AssignmentStatus::Graded] {
            let err = update_assignment(&db.pool, &assignment, &set_status(skipped))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Conflict(_)));
        }

        let unchanged = get_assignment(&db.pool, ids[0]).await.unwrap();
        assert_eq!(unchanged.status, AssignmentStatus::Assigned);
        assert_eq!(unchanged.notes.as_deref(), Some("Page 1 only"));

        let submission = hand_in(&db, ids[0]).await;
        grade(&db, &submission, 70.0).await;

        let graded = get_assignment(&db.pool, ids[0]).await.unwrap();
        assert_eq!(graded.status, AssignmentStatus::Graded);

        let returned = update_assignment(&db.pool, &graded, &set_status(AssignmentStatus::Returned))
            .await
            .unwrap();
        assert_eq!(returned.status, AssignmentStatus::Returned);

        let err = update_assignment(&db.pool, &returned, &set_status(AssignmentStatus::Assigned))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[rocket::async_test]
    async fn test_regrading_keeps_returned_status() {
        let db = create_standard_test_db().await;
        let ids = assign(&db, "Addition 1", &["sam@example.com"]).await.unwrap();

        let submission = hand_in(&db, ids[0]).await;
        grade(&db, &submission, 60.0).await;
        let graded = get_assignment(&db.pool, ids[0]).await.unwrap();
        update_assignment(&db.pool, &graded, &set_status(AssignmentStatus::Returned))
            .await
            .unwrap();

        grade(&db, &submission, 90.0).await;

        let assignment = get_assignment(&db.pool, ids[0]).await.unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Returned);
        let regraded = get_submission(&db.pool, submission.id).await.unwrap();
        assert_eq!(regraded.score, Some(90.0));
    }

    #[rocket::async_test]
    async fn test_cancel_only_while_assigned() {
        let db = create_standard_test_db().await;
        let ids = assign(&db, "Addition 1", &["sam@example.com", "nia@example.com"])
            .await
            .unwrap();

        let open = get_assignment(&db.pool, ids[0]).await.unwrap();
        cancel_assignment(&db.pool, &open).await.unwrap();
        assert!(matches!(
            get_assignment(&db.pool, ids[0]).await,
            Err(AppError::NotFound(_))
        ));

        hand_in(&db, ids[1]).await;
        let submitted = get_assignment(&db.pool, ids[1]).await.unwrap();
        assert_eq!(submitted.status, AssignmentStatus::Submitted);
        assert!(matches!(
            cancel_assignment(&db.pool, &submitted).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[rocket::async_test]
    async fn test_listing_respects_teacher_scope_and_status() {
        let db = create_standard_test_db().await;
        assign(&db, "Addition 1", &["sam@example.com", "sue@example.com"])
            .await
            .unwrap();

        let alice = db.principal("alice@example.com").await;
        let scope = authorize(&alice, Permission::ViewAssignments).unwrap();

        let mine = list_assignments(&db.pool, scope, None, None).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].student_id, db.student_id("sam@example.com"));

        let graded = list_assignments(&db.pool, scope, Some(AssignmentStatus::Graded), None)
            .await
            .unwrap();
        assert!(graded.is_empty());
    }
}
