pub mod attendance;
pub mod classes;
pub mod core;
pub mod enrollments;
pub mod exams;
pub mod roster;
pub mod schedules;
pub mod setup;
