//! Role and scope checks for every operation.
//!
//! `resolve` answers two questions at once: may this role attempt the action
//! at all, and if so which slice of the data it may touch. List queries push
//! the returned [`ScopeFilter`] into their SQL; single-resource operations load
//! the row first and check it with [`ScopeFilter::ensure`].

use sqlx::{QueryBuilder, Sqlite};
use std::fmt;

use crate::auth::{Permission, Principal, Role};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter {
    Unrestricted { center_id: Option<i64> },
    Center(i64),
    /// Students whose `teacher_id` is this user id.
    TeacherStudents(i64),
    /// Students whose `parent_id` is this user id.
    ParentChildren(i64),
    /// A single student row.
    OwnStudent(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    RoleNotPermitted,
    NoCenterAssigned,
    NoStudentProfile,
    OutOfScope,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DenyReason::RoleNotPermitted => "You don't have permission to perform this action",
            DenyReason::NoCenterAssigned => "not assigned to any center",
            DenyReason::NoStudentProfile => "Student profile not found",
            DenyReason::OutOfScope => "You don't have access to this resource",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow(ScopeFilter),
    Deny(DenyReason),
}

impl Decision {
    pub fn into_result(self) -> Result<ScopeFilter, AppError> {
        match self {
            Decision::Allow(filter) => Ok(filter),
            Decision::Deny(reason) => Err(AppError::Forbidden(reason.to_string())),
        }
    }
}

/// The students a student ownership check is made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudentOwnership {
    pub student_id: i64,
    pub center_id: i64,
    pub parent_id: Option<i64>,
    pub teacher_id: Option<i64>,
}

pub fn resolve(principal: &Principal, permission: Permission) -> Decision {
    if !principal.has_permission(permission) {
        tracing::warn!(
            user_id = %principal.id,
            role = %principal.role,
            permission = ?permission,
            "Role not permitted"
        );
        return Decision::Deny(DenyReason::RoleNotPermitted);
    }

    match principal.role {
        Role::SuperAdmin => Decision::Allow(ScopeFilter::Unrestricted { center_id: None }),
        Role::CenterAdmin => match principal.center_id {
            Some(center_id) => Decision::Allow(ScopeFilter::Center(center_id)),
            None => Decision::Deny(DenyReason::NoCenterAssigned),
        },
        Role::Teacher => Decision::Allow(ScopeFilter::TeacherStudents(principal.id)),
        Role::Parent => Decision::Allow(ScopeFilter::ParentChildren(principal.id)),
        Role::Student => match principal.linked_student_id {
            Some(student_id) => Decision::Allow(ScopeFilter::OwnStudent(student_id)),
            None => Decision::Deny(DenyReason::NoStudentProfile),
        },
    }
}

pub fn authorize(principal: &Principal, permission: Permission) -> Result<ScopeFilter, AppError> {
    resolve(principal, permission).into_result()
}

impl ScopeFilter {
    /// Applies an explicit center filter. Only a super admin's scope takes it.
    pub fn with_center_hint(self, hint: Option<i64>) -> Self {
        match self {
            ScopeFilter::Unrestricted { .. } => ScopeFilter::Unrestricted { center_id: hint },
            other => other,
        }
    }

    pub fn center_id(&self) -> Option<i64> {
        match self {
            ScopeFilter::Unrestricted { center_id } => *center_id,
            ScopeFilter::Center(center_id) => Some(*center_id),
            _ => None,
        }
    }

    pub fn admits(&self, owner: &StudentOwnership) -> bool {
        match self {
            ScopeFilter::Unrestricted { .. } => true,
            ScopeFilter::Center(center_id) => owner.center_id == *center_id,
            ScopeFilter::TeacherStudents(user_id) => owner.teacher_id == Some(*user_id),
            ScopeFilter::ParentChildren(user_id) => owner.parent_id == Some(*user_id),
            ScopeFilter::OwnStudent(student_id) => owner.student_id == *student_id,
        }
    }

    pub fn admits_center(&self, center_id: i64) -> bool {
        match self {
            ScopeFilter::Unrestricted { .. } => true,
            ScopeFilter::Center(own) => *own == center_id,
            _ => false,
        }
    }

    pub fn ensure(&self, owner: &StudentOwnership) -> Result<(), AppError> {
        if self.admits(owner) {
            Ok(())
        } else {
            tracing::warn!(scope = ?self, student_id = %owner.student_id, "Out of scope access");
            Err(AppError::Forbidden(DenyReason::OutOfScope.to_string()))
        }
    }

    pub fn ensure_center(&self, center_id: i64) -> Result<(), AppError> {
        if self.admits_center(center_id) {
            Ok(())
        } else {
            tracing::warn!(scope = ?self, center_id = %center_id, "Out of scope center access");
            Err(AppError::Forbidden(DenyReason::OutOfScope.to_string()))
        }
    }

    /// Appends ` AND ...` narrowing rows joined to a student under `student_alias`.
    pub fn push_student_predicate(&self, query: &mut QueryBuilder<'_, Sqlite>, student_alias: &str) {
        self.push_predicate(query, student_alias, &format!("{}.center_id", student_alias));
    }

    /// Like [`push_student_predicate`](Self::push_student_predicate) but the
    /// center comparison uses `center_column`, for rows that carry their own
    /// center id.
    pub fn push_predicate(
        &self,
        query: &mut QueryBuilder<'_, Sqlite>,
        student_alias: &str,
        center_column: &str,
    ) {
        match self {
            ScopeFilter::Unrestricted { center_id: None } => {}
            ScopeFilter::Unrestricted {
                center_id: Some(center_id),
            }
            | ScopeFilter::Center(center_id) => {
                query.push(format!(" AND {} = ", center_column));
                query.push_bind(*center_id);
            }
            ScopeFilter::TeacherStudents(user_id) => {
                query.push(format!(" AND {}.teacher_id = ", student_alias));
                query.push_bind(*user_id);
            }
            ScopeFilter::ParentChildren(user_id) => {
                query.push(format!(" AND {}.parent_id = ", student_alias));
                query.push_bind(*user_id);
            }
            ScopeFilter::OwnStudent(student_id) => {
                query.push(format!(" AND {}.id = ", student_alias));
                query.push_bind(*student_id);
            }
        }
    }

    /// Narrows rows that belong to a center but not to a student.
    pub fn push_center_predicate(&self, query: &mut QueryBuilder<'_, Sqlite>, center_column: &str) {
        match self.center_id() {
            Some(center_id) => {
                query.push(format!(" AND {} = ", center_column));
                query.push_bind(center_id);
            }
            None if matches!(self, ScopeFilter::Unrestricted { .. }) => {}
            None => {
                query.push(" AND 1 = 0");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            id: 7,
            name: "Pat".to_string(),
            email: "pat@example.com".to_string(),
            role,
            center_id: None,
            linked_student_id: None,
            linked_teacher_user_id: None,
        }
    }

    fn owner() -> StudentOwnership {
        StudentOwnership {
            student_id: 3,
            center_id: 1,
            parent_id: Some(7),
            teacher_id: Some(9),
        }
    }

    #[test]
    fn test_center_admin_without_center_is_denied() {
        let decision = resolve(&principal(Role::CenterAdmin), Permission::ViewStudents);
        assert_eq!(decision, Decision::Deny(DenyReason::NoCenterAssigned));

        let err = decision.into_result().unwrap_err();
        assert_eq!(err.public_message(), "not assigned to any center");
    }

    #[test]
    fn test_student_without_profile_is_denied() {
        let decision = resolve(&principal(Role::Student), Permission::ViewProgress);
        assert_eq!(decision, Decision::Deny(DenyReason::NoStudentProfile));
    }

    #[test]
    fn test_role_gate_runs_before_scope() {
        let mut admin = principal(Role::CenterAdmin);
        admin.center_id = Some(1);
        assert_eq!(
            resolve(&admin, Permission::GradeSubmissions),
            Decision::Deny(DenyReason::RoleNotPermitted)
        );
        assert_eq!(
            resolve(&admin, Permission::ViewStudents),
            Decision::Allow(ScopeFilter::Center(1))
        );
    }

    #[test]
    fn test_teacher_scope_is_keyed_by_user_id() {
        let teacher = principal(Role::Teacher);
        assert_eq!(
            resolve(&teacher, Permission::ViewStudents),
            Decision::Allow(ScopeFilter::TeacherStudents(7))
        );

        assert!(ScopeFilter::TeacherStudents(9).admits(&owner()));
        assert!(!ScopeFilter::TeacherStudents(7).admits(&owner()));
    }

    #[test]
    fn test_admits_per_scope() {
        let owner = owner();
        assert!(ScopeFilter::Unrestricted { center_id: Some(2) }.admits(&owner));
        assert!(ScopeFilter::Center(1).admits(&owner));
        assert!(!ScopeFilter::Center(2).admits(&owner));
        assert!(ScopeFilter::ParentChildren(7).admits(&owner));
        assert!(!ScopeFilter::ParentChildren(8).admits(&owner));
        assert!(ScopeFilter::OwnStudent(3).admits(&owner));
        assert!(!ScopeFilter::OwnStudent(4).admits(&owner));
    }

    #[test]
    fn test_center_hint_only_applies_to_super_admin() {
        assert_eq!(
            ScopeFilter::Unrestricted { center_id: None }.with_center_hint(Some(4)),
            ScopeFilter::Unrestricted { center_id: Some(4) }
        );
        assert_eq!(
            ScopeFilter::Center(1).with_center_hint(Some(4)),
            ScopeFilter::Center(1)
        );
    }

    #[test]
    fn test_predicate_sql() {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT s.id FROM students s WHERE 1 = 1");
        ScopeFilter::ParentChildren(5).push_student_predicate(&mut query, "s");
        assert_eq!(
            query.sql(),
            "SELECT s.id FROM students s WHERE 1 = 1 AND s.parent_id = ?"
        );

        let mut query = QueryBuilder::<Sqlite>::new("SELECT f.id FROM fees f JOIN students s ON s.id = f.student_id WHERE 1 = 1");
        ScopeFilter::Center(2).push_predicate(&mut query, "s", "f.center_id");
        assert!(query.sql().ends_with(" AND f.center_id = ?"));

        let mut query = QueryBuilder::<Sqlite>::new("SELECT t.id FROM teachers t WHERE 1 = 1");
        ScopeFilter::TeacherStudents(5).push_center_predicate(&mut query, "t.center_id");
        assert!(query.sql().ends_with(" AND 1 = 0"));
    }
}
