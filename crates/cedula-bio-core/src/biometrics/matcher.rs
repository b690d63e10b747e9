use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::biometrics::gallery::EnrollmentGallery;
use crate::biometrics::vector::{ensure_valid_vector, FeatureVector, Modality};
use crate::errors::{AppError, AppResult};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

// A zero-norm input has no direction and is rejected instead of yielding NaN.
pub fn cosine_similarity(lhs: &[f64], rhs: &[f64], modality: Modality) -> AppResult<f64> {
    let mut dot = 0.0;
    let mut norm_lhs = 0.0;
    let mut norm_rhs = 0.0;

    for (l, r) in lhs.iter().zip(rhs.iter()) {
        dot += l * r;
        norm_lhs += l * l;
        norm_rhs += r * r;
    }

    if norm_lhs <= f64::EPSILON || norm_rhs <= f64::EPSILON {
        return Err(AppError::DegenerateVector { modality });
    }

    Ok(dot / (norm_lhs.sqrt() * norm_rhs.sqrt()))
}

#[derive(Debug, Clone, Copy)]
pub struct Comparison {
    pub matched: bool,
    pub score: f64,
}

// An external library's own match predicate plugs in as an alternative
// implementation whose boolean verdict is taken at face value.
pub trait VectorComparator: Send + Sync {
    fn compare(&self, probe: &FeatureVector, enrolled: &FeatureVector) -> AppResult<Comparison>;
    fn threshold(&self) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct CosineComparator {
    pub modality: Modality,
    pub threshold: f64,
}

impl CosineComparator {
    pub fn new(modality: Modality, threshold: f64) -> Self {
        Self {
            modality,
            threshold,
        }
    }
}

impl VectorComparator for CosineComparator {
    fn compare(&self, probe: &FeatureVector, enrolled: &FeatureVector) -> AppResult<Comparison> {
        let score = cosine_similarity(&probe.values, &enrolled.values, self.modality)?;
        Ok(Comparison {
            matched: score >= self.threshold,
            score,
        })
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

// `FirstAboveThreshold` keeps the historical behavior of taking the first
// accepting candidate in gallery order, which can return a weaker match than
// a later, stronger one. `BestAboveThreshold` is the stricter substitute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    FirstAboveThreshold,
    BestAboveThreshold,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_lowercase().as_str() {
            "first" => Ok(MatchPolicy::FirstAboveThreshold),
            "best" => Ok(MatchPolicy::BestAboveThreshold),
            other => Err(format!(
                "unknown match policy '{other}' (expected first or best)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDecision {
    pub matched: bool,
    pub identity: Option<String>,
    pub score: f64,
    pub threshold: f64,
}

pub struct MatchingEngine {
    gallery: Arc<EnrollmentGallery>,
    comparators: HashMap<Modality, Box<dyn VectorComparator>>,
    policy: MatchPolicy,
}

impl MatchingEngine {
    pub fn new(
        gallery: Arc<EnrollmentGallery>,
        comparators: HashMap<Modality, Box<dyn VectorComparator>>,
        policy: MatchPolicy,
    ) -> Self {
        Self {
            gallery,
            comparators,
            policy,
        }
    }

    pub fn with_cosine_comparators(
        gallery: Arc<EnrollmentGallery>,
        voice_threshold: f64,
        face_threshold: f64,
        policy: MatchPolicy,
    ) -> Self {
        let mut comparators: HashMap<Modality, Box<dyn VectorComparator>> = HashMap::new();
        comparators.insert(
            Modality::Voice,
            Box::new(CosineComparator::new(Modality::Voice, voice_threshold)),
        );
        comparators.insert(
            Modality::Face,
            Box::new(CosineComparator::new(Modality::Face, face_threshold)),
        );
        Self::new(gallery, comparators, policy)
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    fn comparator(&self, modality: Modality) -> AppResult<&dyn VectorComparator> {
        self.comparators
            .get(&modality)
            .map(|boxed| boxed.as_ref())
            .ok_or_else(|| AppError::InvalidVector {
                modality,
                message: "no comparator registered for modality".into(),
            })
    }

    // A missing enrollment is `NotEnrolled`, distinct from a negative match.
    pub fn verify(
        &self,
        identity: &str,
        modality: Modality,
        probe: &FeatureVector,
    ) -> AppResult<MatchDecision> {
        ensure_valid_vector(probe, modality)?;
        let comparator = self.comparator(modality)?;

        let record =
            self.gallery
                .lookup(identity, modality)
                .ok_or_else(|| AppError::NotEnrolled {
                    identity: identity.to_string(),
                    modality,
                })?;

        let comparison = comparator.compare(probe, &record.vector)?;
        debug!(
            identity,
            modality = %modality,
            score = comparison.score,
            matched = comparison.matched,
            "1:1 verification"
        );

        Ok(MatchDecision {
            matched: comparison.matched,
            identity: comparison.matched.then(|| identity.to_string()),
            score: comparison.score,
            threshold: comparator.threshold(),
        })
    }

    // Not finding a match is a normal outcome, not an error.
    pub fn identify(&self, modality: Modality, probe: &FeatureVector) -> AppResult<MatchDecision> {
        ensure_valid_vector(probe, modality)?;
        let comparator = self.comparator(modality)?;

        let mut best_score = 0.0_f64;
        let mut best_candidate: Option<(String, f64)> = None;
        let mut scanned = 0usize;

        for record in self.gallery.all(modality) {
            scanned += 1;
            let comparison = comparator.compare(probe, &record.vector)?;
            if scanned == 1 || comparison.score > best_score {
                best_score = comparison.score;
            }
            if comparison.matched {
                match self.policy {
                    MatchPolicy::FirstAboveThreshold => {
                        debug!(
                            identity = %record.identity,
                            modality = %modality,
                            score = comparison.score,
                            scanned,
                            "1:N first-match accepted"
                        );
                        return Ok(MatchDecision {
                            matched: true,
                            identity: Some(record.identity),
                            score: comparison.score,
                            threshold: comparator.threshold(),
                        });
                    }
                    MatchPolicy::BestAboveThreshold => {
                        let better = best_candidate
                            .as_ref()
                            .map(|(_, score)| comparison.score > *score)
                            .unwrap_or(true);
                        if better {
                            best_candidate = Some((record.identity, comparison.score));
                        }
                    }
                }
            }
        }

        if let Some((identity, score)) = best_candidate {
            debug!(identity = %identity, modality = %modality, score, scanned, "1:N best-match accepted");
            return Ok(MatchDecision {
                matched: true,
                identity: Some(identity),
                score,
                threshold: comparator.threshold(),
            });
        }

        debug!(modality = %modality, best_score, scanned, "1:N search found no match");
        Ok(MatchDecision {
            matched: false,
            identity: None,
            score: best_score,
            threshold: comparator.threshold(),
        })
    }
}
