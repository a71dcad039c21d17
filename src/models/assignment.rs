use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Submitted,
    Graded,
    Returned,
}

impl AssignmentStatus {
    fn rank(&self) -> u8 {
        match self {
            AssignmentStatus::Assigned => 0,
            AssignmentStatus::Submitted => 1,
            AssignmentStatus::Graded => 2,
            AssignmentStatus::Returned => 3,
        }
    }

    /// Status only moves forward: assigned, submitted, graded, returned.
    pub fn can_move_to(&self, next: AssignmentStatus) -> bool {
        next.rank() >= self.rank()
    }

    /// Status changes a person may make by hand. Handing in and grading
    /// advance everything else.
    pub fn can_be_set_to(&self, next: AssignmentStatus) -> bool {
        *self == next || (*self == AssignmentStatus::Graded && next == AssignmentStatus::Returned)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assignment {
    pub id: i64,
    pub student_id: i64,
    pub worksheet_id: i64,
    pub teacher_id: Option<i64>,
    pub assigned_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub status: AssignmentStatus,
    pub notes: Option<String>,
    pub student_name: String,
    pub worksheet_title: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Graded,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Submission {
    pub id: i64,
    pub assignment_id: i64,
    pub student_id: i64,
    pub submitted_file: Option<String>,
    pub submitted_at: Option<NaiveDateTime>,
    pub score: Option<f64>,
    pub time_taken_min: Option<i64>,
    pub error_count: i64,
    pub teacher_feedback: Option<String>,
    pub graded_by: Option<i64>,
    pub graded_at: Option<NaiveDateTime>,
    pub status: SubmissionStatus,
    pub student_name: String,
    pub worksheet_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudentProgress {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    pub level_id: i64,
    pub subject_name: String,
    pub level_name: String,
    pub worksheets_completed: i64,
    pub average_score: f64,
    pub average_time: f64,
    pub level_started_at: Option<NaiveDate>,
    pub level_completed_at: Option<NaiveDate>,
    pub is_level_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_status_never_moves_back() {
        use AssignmentStatus::*;

        assert!(Assigned.can_move_to(Submitted));
        assert!(Submitted.can_move_to(Graded));
        assert!(Graded.can_move_to(Returned));
        assert!(Graded.can_move_to(Graded));
        assert!(!Graded.can_move_to(Assigned));
        assert!(!Returned.can_move_to(Submitted));
    }

    #[test]
    fn test_only_graded_work_is_returned_by_hand() {
        use AssignmentStatus::*;

        assert!(Graded.can_be_set_to(Returned));
        assert!(Assigned.can_be_set_to(Assigned));
        assert!(!Assigned.can_be_set_to(Submitted));
        assert!(!Assigned.can_be_set_to(Graded));
        assert!(!Submitted.can_be_set_to(Graded));
        assert!(!Returned.can_be_set_to(Graded));
    }
}
