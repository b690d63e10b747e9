use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use cedula_bio_core::biometrics::{
    EnrollmentGallery, FilesystemGalleryStore, MatchPolicy, MatchingEngine, GALLERY_STORE_ENV,
};
use cedula_cli::cli::{Cli, Commands, OutputMode};
use cedula_cli::errors::CliResult;
use cedula_cli::ops;
use cedula_cli::output::{
    render_decision, render_enroll, render_error, render_list, render_remove,
};
use cedula_config::ResolvedConfig;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mode = cli.output_mode();
    init_tracing(cli.verbose, mode);

    match run(cli, mode) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            render_error(&err, mode);
            err.exit_code()
        }
    }
}

fn run(cli: Cli, mode: OutputMode) -> CliResult<()> {
    let loaded = cedula_config::load_resolved_config()?;
    if let Some(source) = &loaded.source {
        debug!(path = %source.display(), "loaded configuration file");
    }
    let config = loaded.resolved;

    let store_dir = resolve_store_dir(cli.store_dir, &config);
    debug!(dir = %store_dir.display(), "using gallery store directory");

    let store = FilesystemGalleryStore::new(store_dir);
    let gallery = Arc::new(EnrollmentGallery::load(Box::new(store))?);

    match cli.command {
        Commands::Enroll(args) => {
            let outcome = ops::run_enroll(&gallery, &args)?;
            render_enroll(&outcome, mode)?;
        }
        Commands::Verify(args) => {
            let engine = build_engine(Arc::clone(&gallery), &config);
            let outcome = ops::run_verify(&engine, &args)?;
            render_decision(&outcome, mode)?;
        }
        Commands::Identify(args) => {
            let engine = build_engine(Arc::clone(&gallery), &config);
            let outcome = ops::run_identify(&engine, &args)?;
            render_decision(&outcome, mode)?;
        }
        Commands::Remove(args) => {
            let outcome = ops::run_remove(&gallery, &args)?;
            render_remove(&outcome, mode)?;
        }
        Commands::List(args) => {
            let outcome = ops::run_list(&gallery, &args)?;
            render_list(&outcome, mode)?;
        }
    }
    Ok(())
}

fn resolve_store_dir(flag: Option<PathBuf>, config: &ResolvedConfig) -> PathBuf {
    if let Some(dir) = flag {
        dir
    } else if let Ok(env_value) = env::var(GALLERY_STORE_ENV) {
        PathBuf::from(env_value)
    } else {
        config.gallery_store_dir.clone()
    }
}

fn build_engine(gallery: Arc<EnrollmentGallery>, config: &ResolvedConfig) -> MatchingEngine {
    let policy = match config.match_policy.parse::<MatchPolicy>() {
        Ok(policy) => policy,
        Err(message) => {
            warn!(%message, "falling back to first-above-threshold policy");
            MatchPolicy::FirstAboveThreshold
        }
    };
    MatchingEngine::with_cosine_comparators(
        gallery,
        config.voice_threshold,
        config.face_threshold,
        policy,
    )
}

fn init_tracing(verbose: u8, _mode: OutputMode) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(fmt_layer);
    if tracing::subscriber::set_global_default(registry).is_err() {
        // Already initialised (tests).
    }
}
