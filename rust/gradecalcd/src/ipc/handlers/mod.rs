pub mod core;
pub mod exports;
pub mod grades;
pub mod import;
pub mod reports;
pub mod students;
pub mod subjects;
