use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{AppError, AppResult};

// MFCC mean (13) + MFCC std (13) + spectral-centroid mean (1) + chroma
// mean (12).
pub const VOICE_DIMS: usize = 39;
pub const FACE_DIMS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Voice,
    Face,
}

impl Modality {
    pub fn arity(self) -> usize {
        match self {
            Modality::Voice => VOICE_DIMS,
            Modality::Face => FACE_DIMS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Voice => "voice",
            Modality::Face => "face",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_lowercase().as_str() {
            "voice" => Ok(Modality::Voice),
            "face" => Ok(Modality::Face),
            other => Err(format!("unknown modality '{other}' (expected voice or face)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn canonical_text(&self) -> String {
        let mut text = String::with_capacity(self.values.len() * 8);
        for (idx, value) in self.values.iter().enumerate() {
            if idx > 0 {
                text.push(',');
            }
            text.push_str(&format!("{value}"));
        }
        text
    }
}

pub fn ensure_valid_vector(vector: &FeatureVector, modality: Modality) -> AppResult<()> {
    if vector.is_empty() {
        return Err(AppError::InvalidVector {
            modality,
            message: "vector is empty".into(),
        });
    }
    if vector.len() != modality.arity() {
        return Err(AppError::InvalidVector {
            modality,
            message: format!(
                "arity mismatch: expected {} values, found {}",
                modality.arity(),
                vector.len()
            ),
        });
    }
    Ok(())
}

pub fn validate_identity(identity: &str) -> AppResult<()> {
    if identity.is_empty() {
        return Err(AppError::InvalidIdentity {
            identity: identity.to_string(),
            message: "identity cannot be empty".into(),
        });
    }

    if !identity
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(AppError::InvalidIdentity {
            identity: identity.to_string(),
            message: "use ASCII letters, numbers, '-' or '_' only".into(),
        });
    }

    Ok(())
}

// Audit/dedup hash of the canonical text; never consulted for similarity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn compute(vector: &FeatureVector) -> Self {
        let digest = Sha256::digest(vector.canonical_text().as_bytes());
        Signature(hex::encode(digest))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Payload shape written by the external extraction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFile {
    pub modality: Modality,
    pub vector: FeatureVector,
}

pub fn load_feature_file(path: &Path) -> AppResult<FeatureFile> {
    let file = File::open(path).map_err(|source| AppError::FeatureRead {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let parsed: FeatureFile = serde_json::from_reader(reader)?;
    Ok(parsed)
}
