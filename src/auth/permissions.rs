use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewDashboard,
    ViewCurriculum,
    ViewWorksheet,
    ViewProgress,

    ManageCenters,
    ViewCenter,
    ManageTeachers,
    ViewTeacherStudents,

    ManageStudents,
    EditStudents,
    ViewStudents,
    ListStudents,
    ViewStudentFees,

    ManageCurriculum,
    EditWorksheets,
    DeleteWorksheets,

    ViewAssignments,
    AssignWorksheets,
    CancelAssignments,

    SubmitWork,
    GradeSubmissions,
    ListSubmissions,
    ViewSubmission,

    MarkAttendance,
    ViewAttendance,
    AttendanceSummary,

    ViewFees,
    ManageFees,

    ViewManagementReports,
    AdministerUsers,
    ListParents,

    ParentPortal,
    StudentPortal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    CenterAdmin,
    Teacher,
    Parent,
    Student,
}

static EVERYONE_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewDashboard);
    permissions.insert(Permission::ViewCurriculum);
    permissions.insert(Permission::ViewWorksheet);
    permissions.insert(Permission::ViewProgress);

    permissions
});

static STUDENT_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(EVERYONE_PERMISSIONS.iter().copied());

    permissions.insert(Permission::SubmitWork);
    permissions.insert(Permission::ViewSubmission);
    permissions.insert(Permission::StudentPortal);

    permissions
});

static PARENT_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(EVERYONE_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewStudents);
    permissions.insert(Permission::ViewStudentFees);
    permissions.insert(Permission::ViewAttendance);
    permissions.insert(Permission::ViewFees);
    permissions.insert(Permission::ParentPortal);

    permissions
});

static TEACHER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(EVERYONE_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewTeacherStudents);
    permissions.insert(Permission::EditStudents);
    permissions.insert(Permission::ViewStudents);
    permissions.insert(Permission::ListStudents);
    permissions.insert(Permission::EditWorksheets);
    permissions.insert(Permission::ViewAssignments);
    permissions.insert(Permission::AssignWorksheets);
    permissions.insert(Permission::CancelAssignments);
    permissions.insert(Permission::SubmitWork);
    permissions.insert(Permission::GradeSubmissions);
    permissions.insert(Permission::ListSubmissions);
    permissions.insert(Permission::ViewSubmission);
    permissions.insert(Permission::MarkAttendance);
    permissions.insert(Permission::ViewAttendance);

    permissions
});

static CENTER_ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(EVERYONE_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewCenter);
    permissions.insert(Permission::ManageTeachers);
    permissions.insert(Permission::ViewTeacherStudents);
    permissions.insert(Permission::ManageStudents);
    permissions.insert(Permission::EditStudents);
    permissions.insert(Permission::ViewStudents);
    permissions.insert(Permission::ListStudents);
    permissions.insert(Permission::ViewStudentFees);
    permissions.insert(Permission::EditWorksheets);
    permissions.insert(Permission::DeleteWorksheets);
    permissions.insert(Permission::ViewAssignments);
    permissions.insert(Permission::CancelAssignments);
    permissions.insert(Permission::SubmitWork);
    permissions.insert(Permission::ListSubmissions);
    permissions.insert(Permission::ViewSubmission);
    permissions.insert(Permission::MarkAttendance);
    permissions.insert(Permission::ViewAttendance);
    permissions.insert(Permission::AttendanceSummary);
    permissions.insert(Permission::ViewFees);
    permissions.insert(Permission::ManageFees);
    permissions.insert(Permission::ViewManagementReports);
    permissions.insert(Permission::ListParents);

    permissions
});

static SUPER_ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(CENTER_ADMIN_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageCenters);
    permissions.insert(Permission::ManageCurriculum);
    permissions.insert(Permission::AssignWorksheets);
    permissions.insert(Permission::GradeSubmissions);
    permissions.insert(Permission::AdministerUsers);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::SuperAdmin => &SUPER_ADMIN_PERMISSIONS,
            Role::CenterAdmin => &CENTER_ADMIN_PERMISSIONS,
            Role::Teacher => &TEACHER_PERMISSIONS,
            Role::Parent => &PARENT_PERMISSIONS,
            Role::Student => &STUDENT_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::CenterAdmin => "center_admin",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
            Role::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "center_admin" => Ok(Role::CenterAdmin),
            "teacher" => Ok(Role::Teacher),
            "parent" => Ok(Role::Parent),
            "student" => Ok(Role::Student),
            _ => Err(AppError::invalid("role", &format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
