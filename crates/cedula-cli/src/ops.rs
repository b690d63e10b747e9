use serde::Serialize;

use cedula_bio_core::biometrics::{
    load_feature_file, EnrollmentGallery, MatchDecision, MatchingEngine, Modality,
};
use cedula_bio_core::errors::{AppError, AppResult};

use crate::cli::{EnrollArgs, IdentifyArgs, ListArgs, RemoveArgs, VerifyArgs};

#[derive(Debug, Serialize)]
pub struct EnrollSummary {
    pub success: bool,
    pub identity: String,
    pub modality: Modality,
    pub signature: String,
    pub gallery_size: usize,
}

#[derive(Debug)]
pub struct EnrollOutcome {
    pub summary: EnrollSummary,
    pub logs: Vec<String>,
}

pub fn run_enroll(gallery: &EnrollmentGallery, args: &EnrollArgs) -> AppResult<EnrollOutcome> {
    let mut logs = Vec::new();
    let payload = load_feature_file(&args.features)?;
    logs.push(format!(
        "Loaded {} feature vector ({} values) from {}",
        payload.modality,
        payload.vector.len(),
        args.features.display()
    ));

    if payload.modality != args.modality {
        return Err(AppError::InvalidVector {
            modality: args.modality,
            message: format!(
                "feature file carries a {} vector but --modality is {}",
                payload.modality, args.modality
            ),
        });
    }

    let signature = gallery.enroll(&args.identity, args.modality, payload.vector)?;
    logs.push(format!(
        "Enrolled {} {} vector (signature {})",
        args.identity, args.modality, signature
    ));

    Ok(EnrollOutcome {
        summary: EnrollSummary {
            success: true,
            identity: args.identity.clone(),
            modality: args.modality,
            signature: signature.as_hex().to_string(),
            gallery_size: gallery.len(),
        },
        logs,
    })
}

#[derive(Debug)]
pub struct DecisionOutcome {
    pub decision: MatchDecision,
    pub logs: Vec<String>,
}

pub fn run_verify(engine: &MatchingEngine, args: &VerifyArgs) -> AppResult<DecisionOutcome> {
    let mut logs = Vec::new();
    let payload = load_feature_file(&args.features)?;
    logs.push(format!(
        "Loaded probe vector from {}",
        args.features.display()
    ));

    let decision = engine.verify(&args.identity, args.modality, &payload.vector)?;
    logs.push(format!(
        "1:1 verification for {}: matched={} score={:.4} threshold={:.2}",
        args.identity, decision.matched, decision.score, decision.threshold
    ));

    Ok(DecisionOutcome { decision, logs })
}

pub fn run_identify(engine: &MatchingEngine, args: &IdentifyArgs) -> AppResult<DecisionOutcome> {
    let mut logs = Vec::new();
    let payload = load_feature_file(&args.features)?;
    logs.push(format!(
        "Loaded probe vector from {}",
        args.features.display()
    ));

    let decision = engine.identify(args.modality, &payload.vector)?;
    match &decision.identity {
        Some(identity) => logs.push(format!(
            "1:N search matched {} (score {:.4})",
            identity, decision.score
        )),
        None => logs.push(format!(
            "1:N search found no match (best score {:.4})",
            decision.score
        )),
    }

    Ok(DecisionOutcome { decision, logs })
}

#[derive(Debug, Serialize)]
pub struct RemoveSummary {
    pub success: bool,
    pub identity: String,
    pub removed: usize,
}

#[derive(Debug)]
pub struct RemoveOutcome {
    pub summary: RemoveSummary,
    pub logs: Vec<String>,
}

pub fn run_remove(gallery: &EnrollmentGallery, args: &RemoveArgs) -> AppResult<RemoveOutcome> {
    let mut logs = Vec::new();
    let removed = match args.modality {
        Some(modality) => {
            let existed = gallery.remove(&args.identity, modality)?;
            usize::from(existed)
        }
        None => gallery.remove_identity(&args.identity)?,
    };
    logs.push(format!(
        "Removed {} enrollment(s) for {}",
        removed, args.identity
    ));

    Ok(RemoveOutcome {
        summary: RemoveSummary {
            success: true,
            identity: args.identity.clone(),
            removed,
        },
        logs,
    })
}

#[derive(Debug, Serialize)]
pub struct ListedRecord {
    pub identity: String,
    pub modality: Modality,
    pub signature: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ListSummary {
    pub records: Vec<ListedRecord>,
}

#[derive(Debug)]
pub struct ListOutcome {
    pub summary: ListSummary,
    pub logs: Vec<String>,
}

pub fn run_list(gallery: &EnrollmentGallery, args: &ListArgs) -> AppResult<ListOutcome> {
    let modalities = match args.modality {
        Some(modality) => vec![modality],
        None => vec![Modality::Voice, Modality::Face],
    };

    let mut records = Vec::new();
    for modality in modalities {
        for record in gallery.all(modality) {
            records.push(ListedRecord {
                identity: record.identity,
                modality: record.modality,
                signature: record.signature.as_hex().to_string(),
                created_at: record.created_at,
            });
        }
    }

    let logs = vec![format!("{} enrollment(s)", records.len())];
    Ok(ListOutcome {
        summary: ListSummary { records },
        logs,
    })
}
