use std::path::PathBuf;

use cedula_bio_core::biometrics::Modality;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "cedula",
    about = "Manage and query the citizen biometric enrollment gallery",
    version
)]
pub struct Cli {
    /// Emit structured JSON to stdout instead of human-readable logs
    #[arg(long)]
    pub json: bool,

    /// Increase verbosity (may be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Gallery store directory (falls back to $CEDULA_GALLERY_DIR, then the
    /// configuration file, then the built-in default)
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Enroll (or replace) a feature vector for an identity
    Enroll(EnrollArgs),
    /// Verify a probe against one claimed identity (1:1)
    Verify(VerifyArgs),
    /// Search a probe against every enrollment of a modality (1:N)
    Identify(IdentifyArgs),
    /// Remove enrollments for an identity
    Remove(RemoveArgs),
    /// List current enrollments
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct EnrollArgs {
    /// Identity the vector belongs to
    #[arg(long)]
    pub identity: String,

    /// Biometric modality of the vector (voice or face)
    #[arg(long)]
    pub modality: Modality,

    /// Feature-vector JSON produced by the extraction step
    #[arg(long)]
    pub features: PathBuf,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Claimed identity to verify against
    #[arg(long)]
    pub identity: String,

    /// Biometric modality of the probe (voice or face)
    #[arg(long)]
    pub modality: Modality,

    /// Probe feature-vector JSON
    #[arg(long)]
    pub features: PathBuf,
}

#[derive(Debug, Args)]
pub struct IdentifyArgs {
    /// Biometric modality of the probe (voice or face)
    #[arg(long)]
    pub modality: Modality,

    /// Probe feature-vector JSON
    #[arg(long)]
    pub features: PathBuf,
}

#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// Identity whose enrollments to remove
    #[arg(long)]
    pub identity: String,

    /// Remove only this modality (default: every modality)
    #[arg(long)]
    pub modality: Option<Modality>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Restrict the listing to one modality
    #[arg(long)]
    pub modality: Option<Modality>,
}

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}
