pub mod analyze;
pub mod reports;
