use std::error::Error;
use std::io::{self, Write};

use serde_json::json;

use crate::cli::OutputMode;
use crate::errors::{CliError, CliResult};
use crate::ops::{DecisionOutcome, EnrollOutcome, ListOutcome, RemoveOutcome};

pub fn render_enroll(outcome: &EnrollOutcome, mode: OutputMode) -> CliResult<()> {
    match mode {
        OutputMode::Human => {
            for line in &outcome.logs {
                println!("{}", line);
            }
            println!(
                "Enrollment successful: {} ({}) signature {}",
                outcome.summary.identity, outcome.summary.modality, outcome.summary.signature
            );
        }
        OutputMode::Json => write_json(&outcome.summary)?,
    }
    Ok(())
}

pub fn render_decision(outcome: &DecisionOutcome, mode: OutputMode) -> CliResult<()> {
    match mode {
        OutputMode::Human => {
            for line in &outcome.logs {
                println!("{}", line);
            }
            if outcome.decision.matched {
                match &outcome.decision.identity {
                    Some(identity) => println!(
                        "Match: {} (score {:.4}, threshold {:.2})",
                        identity, outcome.decision.score, outcome.decision.threshold
                    ),
                    None => println!(
                        "Match (score {:.4}, threshold {:.2})",
                        outcome.decision.score, outcome.decision.threshold
                    ),
                }
            } else {
                println!(
                    "No match (best score {:.4}, threshold {:.2})",
                    outcome.decision.score, outcome.decision.threshold
                );
            }
        }
        OutputMode::Json => write_json(&outcome.decision)?,
    }
    Ok(())
}

pub fn render_remove(outcome: &RemoveOutcome, mode: OutputMode) -> CliResult<()> {
    match mode {
        OutputMode::Human => {
            for line in &outcome.logs {
                println!("{}", line);
            }
            println!(
                "Removal successful: {} ({} enrollment(s))",
                outcome.summary.identity, outcome.summary.removed
            );
        }
        OutputMode::Json => write_json(&outcome.summary)?,
    }
    Ok(())
}

pub fn render_list(outcome: &ListOutcome, mode: OutputMode) -> CliResult<()> {
    match mode {
        OutputMode::Human => {
            for record in &outcome.summary.records {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.identity, record.modality, record.created_at, record.signature
                );
            }
            for line in &outcome.logs {
                println!("{}", line);
            }
        }
        OutputMode::Json => write_json(&outcome.summary)?,
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(payload: &T) -> CliResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let encoded = serde_json::to_string(payload).map_err(cedula_bio_core::AppError::from)?;
    handle
        .write_all(encoded.as_bytes())
        .map_err(cedula_bio_core::AppError::from)?;
    handle
        .write_all(b"\n")
        .map_err(cedula_bio_core::AppError::from)?;
    Ok(())
}

pub fn render_error(err: &CliError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {}", source);
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "success": false,
                "error": err.human_message(),
            });
            if let Ok(json) = serde_json::to_string(&payload) {
                println!("{}", json);
            }
            if let Some(source) = err.source() {
                eprintln!("cause: {}", source);
            }
        }
    }
}
