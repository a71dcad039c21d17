//! Read-only aggregates. Nothing here writes to the store, and missing data
//! yields zeros rather than errors.

pub mod kpis;
pub mod rates;
pub mod student_report;
pub mod summaries;

pub use kpis::*;
pub use student_report::*;
pub use summaries::*;
