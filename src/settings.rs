use crate::errors::{AppError, AppResult};
use crate::models::AppSettings;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "TASK_REMINDER_HOME";
const SETTINGS_FILE: &str = "settings.json";
const DEFAULT_HOME_DIR: &str = ".task-reminder";
const MIN_POLL_INTERVAL_SECS: u64 = 1;

pub fn resolve_data_dir() -> PathBuf {
    match env::var(HOME_ENV) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
        _ => PathBuf::from(DEFAULT_HOME_DIR),
    }
}

/// Loads `settings.json` from the data dir, writing defaults when absent.
pub fn load_settings(data_dir: &Path) -> AppResult<AppSettings> {
    fs::create_dir_all(data_dir).map_err(|err| AppError::Io(err.to_string()))?;
    let path = data_dir.join(SETTINGS_FILE);
    if !path.exists() {
        let defaults = AppSettings::default();
        save_settings(data_dir, &defaults)?;
        return Ok(defaults);
    }

    let bytes = fs::read(&path).map_err(|err| AppError::Io(err.to_string()))?;
    let mut settings: AppSettings = serde_json::from_slice(&bytes).map_err(|err| {
        AppError::Validation(format!("invalid settings file {}: {}", path.to_string_lossy(), err))
    })?;
    if settings.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
        tracing::warn!(
            configured = settings.poll_interval_secs,
            "poll interval below minimum; clamping"
        );
        settings.poll_interval_secs = MIN_POLL_INTERVAL_SECS;
    }
    Ok(settings)
}

pub fn save_settings(data_dir: &Path, settings: &AppSettings) -> AppResult<()> {
    let path = data_dir.join(SETTINGS_FILE);
    let tmp_path = data_dir.join(format!("{SETTINGS_FILE}.tmp"));
    let bytes = serde_json::to_vec_pretty(settings)?;
    fs::write(&tmp_path, bytes).map_err(|err| AppError::Io(err.to_string()))?;
    fs::rename(&tmp_path, &path).map_err(|err| AppError::Io(err.to_string()))
}

/// Store location; relative paths are resolved against the data dir.
pub fn store_path(data_dir: &Path, settings: &AppSettings) -> PathBuf {
    if settings.store_file.is_absolute() {
        settings.store_file.clone()
    } else {
        data_dir.join(&settings.store_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MailSettings;

    #[test]
    fn missing_settings_are_written_with_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = load_settings(dir.path()).expect("load");
        assert_eq!(settings, AppSettings::default());
        assert!(dir.path().join("settings.json").exists());
        assert_eq!(store_path(dir.path(), &settings), dir.path().join("tasks.json"));
    }

    #[test]
    fn saved_settings_round_trip_and_clamp_interval() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = AppSettings {
            poll_interval_secs: 0,
            mail: Some(MailSettings {
                program: "sendmail".to_string(),
                args: vec!["-t".to_string()],
                from: "me@example.com".to_string(),
                to: "me@example.com".to_string(),
                timeout_ms: 5_000,
            }),
            ..AppSettings::default()
        };
        save_settings(dir.path(), &settings).expect("save");
        let loaded = load_settings(dir.path()).expect("load");
        assert_eq!(loaded.poll_interval_secs, 1);
        assert_eq!(loaded.mail, settings.mail);
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("settings.json"), r#"{"pollIntervalSecs": 30}"#).expect("write");
        let loaded = load_settings(dir.path()).expect("load");
        assert_eq!(loaded.poll_interval_secs, 30);
        assert_eq!(loaded.store_file, PathBuf::from("tasks.json"));
        assert!(loaded.mail.is_none());
    }

    #[test]
    fn malformed_settings_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("settings.json"), "{").expect("write");
        assert!(matches!(load_settings(dir.path()), Err(AppError::Validation(_))));
    }
}
