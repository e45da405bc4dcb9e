use crate::db::{Database, SyncLogEntry};
use crate::models::Settings;
use crate::services::state::AppState;

pub const SETTING_KEYS: [&str; 5] = [
    "sheets_endpoint",
    "upload_endpoint",
    "allowed_emails",
    "simulate_latency",
    "page_size",
];

fn split_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Reads settings from the database, falling back to defaults per key.
pub fn load_settings(db: &Database) -> Settings {
    let defaults = Settings::default();
    let sheets_endpoint = db
        .get_setting("sheets_endpoint")
        .ok()
        .flatten()
        .filter(|v| !v.trim().is_empty());
    let upload_endpoint = db
        .get_setting("upload_endpoint")
        .ok()
        .flatten()
        .unwrap_or(defaults.upload_endpoint);
    let allowed_emails = db
        .get_setting("allowed_emails")
        .ok()
        .flatten()
        .map(|raw| split_emails(&raw))
        .unwrap_or(defaults.allowed_emails);
    let simulate_latency = db
        .get_setting("simulate_latency")
        .ok()
        .flatten()
        .and_then(|v| v.trim().parse::<bool>().ok())
        .unwrap_or(defaults.simulate_latency);
    let page_size = db
        .get_setting("page_size")
        .ok()
        .flatten()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|size| *size > 0)
        .unwrap_or(defaults.page_size);
    Settings {
        sheets_endpoint,
        upload_endpoint,
        allowed_emails,
        simulate_latency,
        page_size,
    }
}

fn normalize_value(key: &str, value: &str) -> Result<String, String> {
    let value = value.trim();
    match key {
        "sheets_endpoint" | "upload_endpoint" => {
            if !value.is_empty() && !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(format!("{} must be an http(s) URL", key));
            }
            Ok(value.to_string())
        }
        "allowed_emails" => Ok(split_emails(value).join(",")),
        "simulate_latency" => value
            .parse::<bool>()
            .map(|v| v.to_string())
            .map_err(|_| "simulate_latency must be true or false".to_string()),
        "page_size" => match value.parse::<usize>() {
            Ok(size) if size > 0 => Ok(size.to_string()),
            _ => Err("page_size must be a positive number".to_string()),
        },
        other => Err(format!(
            "Unknown setting: {} (expected one of {})",
            other,
            SETTING_KEYS.join(", ")
        )),
    }
}

pub fn get_settings(state: &AppState) -> Result<Settings, String> {
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    Ok(load_settings(&db))
}

pub fn save_setting(state: &AppState, key: &str, value: &str) -> Result<Settings, String> {
    let normalized = normalize_value(key, value)?;
    {
        let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
        db.set_setting(key, &normalized).map_err(|e| e.to_string())?;
    }

    let settings = get_settings(state)?;
    state
        .update_settings(settings.clone())
        .map_err(|e| e.to_string())?;
    Ok(settings)
}

pub fn get_sync_logs(state: &AppState, limit: usize) -> Result<Vec<SyncLogEntry>, String> {
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    db.recent_sync_logs(limit).map_err(|e| e.to_string())
}
