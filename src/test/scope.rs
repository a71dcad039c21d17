#[cfg(test)]
mod tests {
    use crate::auth::Permission;
    use crate::db::students::{StudentQuery, list_students, ownership};
    use crate::db::teachers::list_teachers;
    use crate::db::users::list_parents;
    use crate::error::AppError;
    use crate::scope::{ScopeFilter, authorize};
    use crate::test::utils::test_db::create_standard_test_db;

    #[rocket::async_test]
    async fn test_center_admin_sees_only_own_center() {
        let db = create_standard_test_db().await;
        let admin = db.principal("north.admin@example.com").await;

        let scope = authorize(&admin, Permission::ViewStudents).unwrap();
        assert_eq!(scope, ScopeFilter::Center(db.center_id("North")));

        let students = list_students(&db.pool, scope, StudentQuery::default())
            .await
            .unwrap();
        let ids: Vec<i64> = students.iter().map(|s| s.id).collect();

        assert_eq!(students.len(), 2);
        assert!(ids.contains(&db.student_id("sam@example.com")));
        assert!(!ids.contains(&db.student_id("sue@example.com")));

        let teachers = list_teachers(&db.pool, scope).await.unwrap();
        assert_eq!(teachers.len(), 1);
        assert_eq!(teachers[0].email, "alice@example.com");
    }

    #[rocket::async_test]
    async fn test_center_admin_hint_is_ignored() {
        let db = create_standard_test_db().await;
        let admin = db.principal("north.admin@example.com").await;

        let scope = authorize(&admin, Permission::ViewStudents)
            .unwrap()
            .with_center_hint(Some(db.center_id("South")));

        assert_eq!(scope, ScopeFilter::Center(db.center_id("North")));
    }

    #[rocket::async_test]
    async fn test_super_admin_center_hint_narrows() {
        let db = create_standard_test_db().await;
        let root = db.principal("root@example.com").await;

        let all = authorize(&root, Permission::ViewStudents).unwrap();
        assert_eq!(
            list_students(&db.pool, all, StudentQuery::default())
                .await
                .unwrap()
                .len(),
            3
        );

        let south = all.with_center_hint(Some(db.center_id("South")));
        let students = list_students(&db.pool, south, StudentQuery::default())
            .await
            .unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, db.student_id("sue@example.com"));
    }

    #[rocket::async_test]
    async fn test_teacher_scope_is_keyed_by_user_id() {
        let db = create_standard_test_db().await;
        let alice = db.principal("alice@example.com").await;

        let scope = authorize(&alice, Permission::ViewStudents).unwrap();
        assert_eq!(
            scope,
            ScopeFilter::TeacherStudents(db.user_id("alice@example.com"))
        );

        let students = list_students(&db.pool, scope, StudentQuery::default())
            .await
            .unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, db.student_id("sam@example.com"));

        let unassigned = ownership(&db.pool, db.student_id("nia@example.com"))
            .await
            .unwrap();
        assert!(scope.ensure(&unassigned).is_err());
    }

    #[rocket::async_test]
    async fn test_parent_cannot_reach_other_children() {
        let db = create_standard_test_db().await;
        let pat = db.principal("pat@example.com").await;

        let scope = authorize(&pat, Permission::ViewStudents).unwrap();
        let own = ownership(&db.pool, db.student_id("sam@example.com"))
            .await
            .unwrap();
        let other = ownership(&db.pool, db.student_id("sue@example.com"))
            .await
            .unwrap();

        assert!(scope.ensure(&own).is_ok());
        assert!(matches!(scope.ensure(&other), Err(AppError::Forbidden(_))));
    }

    #[rocket::async_test]
    async fn test_roles_without_permission_are_denied() {
        let db = create_standard_test_db().await;

        let sam = db.principal("sam@example.com").await;
        assert!(matches!(
            authorize(&sam, Permission::ManageFees),
            Err(AppError::Forbidden(_))
        ));

        let pat = db.principal("pat@example.com").await;
        assert!(matches!(
            authorize(&pat, Permission::MarkAttendance),
            Err(AppError::Forbidden(_))
        ));
    }

    #[rocket::async_test]
    async fn test_student_principal_links_to_student_row() {
        let db = create_standard_test_db().await;
        let sam = db.principal("sam@example.com").await;

        assert_eq!(sam.linked_student_id, Some(db.student_id("sam@example.com")));
        assert_eq!(
            authorize(&sam, Permission::StudentPortal).unwrap(),
            ScopeFilter::OwnStudent(db.student_id("sam@example.com"))
        );
    }

    #[rocket::async_test]
    async fn test_center_admin_lists_parents_of_own_center() {
        let db = create_standard_test_db().await;
        let admin = db.principal("north.admin@example.com").await;

        let scope = authorize(&admin, Permission::ListParents).unwrap();
        let parents = list_parents(&db.pool, scope).await.unwrap();

        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].email, "pat@example.com");
    }
}
