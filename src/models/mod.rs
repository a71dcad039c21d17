mod assignment;
mod attendance;
mod center;
mod curriculum;
mod fee;
mod notification;
mod student;
mod teacher;

pub use assignment::*;
pub use attendance::*;
pub use center::*;
pub use curriculum::*;
pub use fee::*;
pub use notification::*;
pub use student::*;
pub use teacher::*;
