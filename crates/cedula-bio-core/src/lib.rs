pub mod biometrics;
pub mod errors;
pub mod session;
pub mod symmetry;

pub use errors::{AppError, AppResult};
