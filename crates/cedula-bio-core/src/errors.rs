use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

use crate::biometrics::vector::Modality;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid {modality} vector: {message}")]
    InvalidVector { modality: Modality, message: String },

    #[error("degenerate {modality} vector: zero norm has no direction")]
    DegenerateVector { modality: Modality },

    #[error("no {modality} enrollment found for identity '{identity}'")]
    NotEnrolled { identity: String, modality: Modality },

    #[error("invalid identity '{identity}': {message}")]
    InvalidIdentity { identity: String, message: String },

    #[error("gallery and store diverged for ({identity}, {modality}): {message}")]
    PartialWrite {
        identity: String,
        modality: Modality,
        message: String,
    },

    #[error("failed to open capture device {device}: {message}")]
    DeviceUnavailable { device: String, message: String },

    #[error("capture device {device} is held by a running session")]
    DeviceBusy { device: String },

    #[error("session {id} already stopped; construct a new session")]
    SessionFinished { id: String },

    #[error("failed to read gallery record {path}: {source}")]
    StoreRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write gallery record {path}: {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("gallery record {path} is invalid: {message}")]
    InvalidStoreFile { path: PathBuf, message: String },

    #[error("failed to read feature file {path}: {source}")]
    FeatureRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed processing frame data: {0}")]
    FrameProcessing(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AppError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::InvalidVector { .. } => ExitCode::from(2),
            AppError::InvalidIdentity { .. } => ExitCode::from(2),
            AppError::FeatureRead { .. } => ExitCode::from(2),
            AppError::InvalidStoreFile { .. } => ExitCode::from(2),
            AppError::DegenerateVector { .. } => ExitCode::from(3),
            AppError::NotEnrolled { .. } => ExitCode::from(4),
            AppError::DeviceUnavailable { .. } => ExitCode::from(4),
            AppError::DeviceBusy { .. } => ExitCode::from(4),
            AppError::PartialWrite { .. } => ExitCode::from(5),
            _ => ExitCode::from(1),
        }
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;
