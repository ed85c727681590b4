//! Boundary types shared by every command: the response envelope and
//! per-field validation errors

pub mod response;
pub mod validation;

pub use response::ApiResponse;
pub use validation::ValidationErrors;
