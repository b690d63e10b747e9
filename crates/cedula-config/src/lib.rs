use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/cedula/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/cedula/config.toml";
pub const DEFAULT_VOICE_THRESHOLD: f64 = 0.8;
pub const DEFAULT_FACE_THRESHOLD: f64 = 0.8;
pub const DEFAULT_MATCH_POLICY: &str = "first";
pub const DEFAULT_STORE_DIR: &str = "/var/lib/cedula/gallery";
pub const DEFAULT_FRAME_INTERVAL_MILLIS: u64 = 33;
pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const DEFAULT_VIDEO_DEVICE: &str = "/dev/video0";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    pub voice_threshold: Option<f64>,
    pub face_threshold: Option<f64>,
    pub match_policy: Option<String>,
    pub gallery_store_dir: Option<PathBuf>,
    pub frame_interval_millis: Option<u64>,
    pub jpeg_quality: Option<u8>,
    pub video_device: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub voice_threshold: f64,
    pub face_threshold: f64,
    pub match_policy: String,
    pub gallery_store_dir: PathBuf,
    pub frame_interval: Duration,
    pub jpeg_quality: u8,
    pub video_device: String,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            voice_threshold: raw.voice_threshold.unwrap_or(DEFAULT_VOICE_THRESHOLD),
            face_threshold: raw.face_threshold.unwrap_or(DEFAULT_FACE_THRESHOLD),
            match_policy: raw
                .match_policy
                .unwrap_or_else(|| DEFAULT_MATCH_POLICY.to_string()),
            gallery_store_dir: raw
                .gallery_store_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR)),
            frame_interval: Duration::from_millis(
                raw.frame_interval_millis
                    .unwrap_or(DEFAULT_FRAME_INTERVAL_MILLIS),
            ),
            jpeg_quality: raw.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY).min(100),
            video_device: raw
                .video_device
                .unwrap_or_else(|| DEFAULT_VIDEO_DEVICE.to_string()),
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

impl LoadedConfig {
    pub fn new(contents: ConfigFile, source: PathBuf) -> Self {
        Self { contents, source }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn into_contents(self) -> ConfigFile {
        self.contents
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

pub fn load_config() -> Result<Option<LoadedConfig>, ConfigError> {
    let sources = [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ];
    load_from_paths(&sources)
}

pub fn load_resolved_config() -> Result<ResolvedConfigWithSource, ConfigError> {
    let sources = [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ];
    load_resolved_from_paths(&sources)
}

pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig::new(parsed, path.clone())));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match load_from_paths(paths)? {
        Some(entry) => {
            let path = entry.source.clone();
            Ok(ResolvedConfigWithSource {
                resolved: ResolvedConfig::from_raw(entry.contents),
                source: Some(path),
            })
        }
        None => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::default(),
            source: None,
        }),
    }
}
