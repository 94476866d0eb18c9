use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use client_core::api::DEFAULT_API_URL;
use shared::domain::PageSize;
use tracing::warn;

pub const SETTINGS_FILE: &str = "crm.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub token_path: PathBuf,
    pub page_size: PageSize,
    pub request_timeout_secs: u64,
    pub simulator_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            token_path: default_token_path(),
            page_size: PageSize::default(),
            request_timeout_secs: 30,
            simulator_debounce_ms: 500,
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then `path` if it parses, then environment overrides.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("api_url") {
                    settings.api_url = v.clone();
                }
                if let Some(v) = file_cfg.get("token_path") {
                    settings.token_path = PathBuf::from(v);
                }
                if let Some(v) = file_cfg.get("page_size") {
                    apply_page_size(&mut settings, "page_size", v);
                }
                if let Some(v) = file_cfg.get("request_timeout_secs") {
                    apply_number(&mut settings.request_timeout_secs, "request_timeout_secs", v);
                }
                if let Some(v) = file_cfg.get("simulator_debounce_ms") {
                    apply_number(&mut settings.simulator_debounce_ms, "simulator_debounce_ms", v);
                }
            }
            Err(err) => warn!(%err, path = %path.display(), "config: ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("CRM_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = env("CRM_TOKEN_PATH") {
        settings.token_path = PathBuf::from(v);
    }

    if let Some(v) = env("CRM_PAGE_SIZE") {
        apply_page_size(&mut settings, "CRM_PAGE_SIZE", &v);
    }

    if let Some(v) = env("CRM_REQUEST_TIMEOUT_SECS") {
        apply_number(&mut settings.request_timeout_secs, "CRM_REQUEST_TIMEOUT_SECS", &v);
    }

    if let Some(v) = env("CRM_SIMULATOR_DEBOUNCE_MS") {
        apply_number(&mut settings.simulator_debounce_ms, "CRM_SIMULATOR_DEBOUNCE_MS", &v);
    }

    settings.api_url = normalize_api_url(&settings.api_url);
    settings
}

fn apply_page_size(settings: &mut Settings, key: &str, raw: &str) {
    match raw.trim().parse::<PageSize>() {
        Ok(size) => settings.page_size = size,
        Err(err) => warn!(key, %err, "config: keeping previous page size"),
    }
}

fn apply_number(slot: &mut u64, key: &str, raw: &str) {
    match raw.trim().parse::<u64>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value = raw, "config: not a whole number; ignoring"),
    }
}

fn normalize_api_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_API_URL.to_string();
    }
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn default_token_path() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crm")
        .join("token")
}
