pub mod errors;
pub mod services;
