use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use client_core::{PollSettings, SessionOptions, DEFAULT_ARCHIVE_NAME};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "image-compressor.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend_url: String,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub default_archive_name: String,
    pub record_access: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5001".into(),
            poll_interval_ms: 3000,
            poll_max_attempts: 60,
            default_archive_name: DEFAULT_ARCHIVE_NAME.into(),
            record_access: true,
        }
    }
}

impl Settings {
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.poll_max_attempts,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            poll: self.poll_settings(),
            default_archive_name: self.default_archive_name.clone(),
        }
    }
}

/// Keys accepted in the TOML file; anything absent keeps its default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    backend_url: Option<String>,
    poll_interval_ms: Option<u64>,
    poll_max_attempts: Option<u32>,
    default_archive_name: Option<String>,
    record_access: Option<bool>,
}

pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    load_settings_with(path, |key| std::env::var(key).ok())
}

/// Defaults, then the config file, then environment variables. An explicit
/// `path` must exist; the default file is optional.
pub fn load_settings_with<E>(path: Option<&Path>, env: E) -> anyhow::Result<Settings>
where
    E: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();

    let (file, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&file) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file '{}'", file.display()))?;
            apply_file(&mut settings, file_cfg);
        }
        Err(err) if err.kind() == ErrorKind::NotFound && !required => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", file.display()));
        }
    }

    if let Some(v) = env("IMAGE_COMPRESSOR_BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = env("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Some(v) = env("APP__POLL_INTERVAL_MS") {
        if let Ok(parsed) = v.trim().parse::<u64>() {
            settings.poll_interval_ms = parsed;
        }
    }
    if let Some(v) = env("APP__POLL_MAX_ATTEMPTS") {
        if let Ok(parsed) = v.trim().parse::<u32>() {
            settings.poll_max_attempts = parsed;
        }
    }

    if let Some(v) = env("APP__DEFAULT_ARCHIVE_NAME") {
        settings.default_archive_name = v;
    }

    if let Some(v) = env("APP__RECORD_ACCESS") {
        if let Some(flag) = parse_flag(&v) {
            settings.record_access = flag;
        }
    }

    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = v;
    }
    if let Some(v) = file_cfg.poll_interval_ms {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = file_cfg.poll_max_attempts {
        settings.poll_max_attempts = v;
    }
    if let Some(v) = file_cfg.default_archive_name {
        settings.default_archive_name = v;
    }
    if let Some(v) = file_cfg.record_access {
        settings.record_access = v;
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
