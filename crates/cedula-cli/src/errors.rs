use std::process::ExitCode;

use cedula_config::ConfigError;
use thiserror::Error;

pub use cedula_bio_core::errors::{AppError, AppResult};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] AppError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CliError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Core(err) => err.exit_code(),
            CliError::Config(_) => ExitCode::from(2),
        }
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type CliResult<T> = Result<T, CliError>;
