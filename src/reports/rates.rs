pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole` as an unrounded percentage. An empty whole counts as fully
/// achieved.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 100.0;
    }
    part / whole * 100.0
}

pub fn fee_collection_rate(paid_amount: f64, total_amount: f64) -> f64 {
    percentage(paid_amount, total_amount)
}

pub fn submission_rate(submissions: i64, assignments: i64) -> f64 {
    percentage(submissions as f64, assignments as f64)
}

pub fn attendance_rate(present: i64, total: i64) -> f64 {
    percentage(present as f64, total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_denominators_are_full_marks() {
        assert_eq!(fee_collection_rate(0.0, 0.0), 100.0);
        assert_eq!(submission_rate(0, 0), 100.0);
        assert_eq!(attendance_rate(0, 0), 100.0);
    }

    #[test]
    fn test_rates() {
        assert_eq!(fee_collection_rate(500.0, 1000.0), 50.0);
        assert_eq!(submission_rate(3, 4), 75.0);
        assert_eq!(attendance_rate(2, 3), 2.0 / 3.0 * 100.0);
        assert!(attendance_rate(2, 3) > 66.66 && attendance_rate(2, 3) < 66.67);
        assert_eq!(attendance_rate(0, 5), 0.0);
    }
}
