pub mod approval;
pub mod delegation;
pub mod employee;
