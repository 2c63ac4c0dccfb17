use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const APP_DIR: &str = "digital-dog";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bundle identifiers that count as distracting when frontmost.
    pub distracting_bundle_ids: Vec<String>,
    /// URL substrings that count as distracting in a supported browser tab.
    pub distracting_url_keywords: Vec<String>,
    /// Continuous distraction before the dog reacts, in seconds (1–3600). Default: 5.
    pub distraction_threshold_seconds: u64,
    /// Foreground poll cadence in seconds (1–60). Default: 2.
    pub poll_interval_seconds: u64,
    /// URL keyword that gets its own reaction message.
    pub priority_url_keyword: String,
    pub priority_message: String,
    pub generic_message: String,
    /// Minutes before a task is due that it starts being announced. Default: 10.
    pub reminder_lead_minutes: i64,
    /// Task reminder check cadence in seconds. Default: 60.
    pub reminder_check_seconds: u64,
    /// Pet slides out after this many idle seconds. Default: 5.
    pub idle_slide_out_seconds: u64,
    /// Glob for the idle (tongue) animation frames.
    pub idle_frames: String,
    /// Glob for the eating animation frames.
    pub eating_frames: String,
    /// Frames are scaled to fit a square of this many pixels.
    pub frame_size: u32,
    /// Launch at login.
    pub launch_at_login: bool,
    /// Overrides for the data files; `None` uses the platform directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_token_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_client_secret_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            distracting_bundle_ids: [
                "com.apple.Safari",
                "com.google.Chrome",
                "org.mozilla.firefox",
                "com.google.Chrome.app.yt",
                "com.netflix.Netflix",
                "com.instagram.desktop",
                "com.brave.Browser",
                "com.microsoft.edgemac",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            distracting_url_keywords: [
                "instagram.com",
                "youtube.com",
                "netflix.com",
                "twitch.tv",
                "facebook.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            distraction_threshold_seconds: 5,
            poll_interval_seconds: 2,
            priority_url_keyword: "instagram.com".into(),
            priority_message: "Instagram detected! Let's get back to work! 🐶".into(),
            generic_message: "Hey! Let's get back to work! 🐶".into(),
            reminder_lead_minutes: 10,
            reminder_check_seconds: 60,
            idle_slide_out_seconds: 5,
            idle_frames: "Dog tongue animation/Dog_Tongue_*.png".into(),
            eating_frames: "Dog eating/Dog_Eating_*.png".into(),
            frame_size: 200,
            launch_at_login: false,
            tasks_file: None,
            calendar_token_file: None,
            calendar_client_secret_file: None,
        }
    }
}

impl AppConfig {
    /// `<config_dir>/digital-dog`, home of `config.toml` and `credentials.json`.
    pub fn config_dir() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Self {
        let path = Self::config_path();
        if let Ok(contents) = fs::read_to_string(&path) {
            match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => return config.validated(),
                Err(e) => log::warn!("Ignoring malformed config at {}: {e}", path.display()),
            }
        }
        let default_config = Self::default();
        // Save defaults on first run
        let _ = default_config.save();
        default_config
    }

    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(&path, contents).map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Clamp values to valid ranges.
    pub fn validated(mut self) -> Self {
        self.distraction_threshold_seconds = self.distraction_threshold_seconds.clamp(1, 3600);
        self.poll_interval_seconds = self.poll_interval_seconds.clamp(1, 60);
        self.reminder_lead_minutes = self.reminder_lead_minutes.clamp(0, 24 * 60);
        self.reminder_check_seconds = self.reminder_check_seconds.clamp(5, 3600);
        self.idle_slide_out_seconds = self.idle_slide_out_seconds.clamp(1, 600);
        self.frame_size = self.frame_size.clamp(16, 1024);
        self
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.tasks_file
            .clone()
            .unwrap_or_else(|| data_dir().join("tasks.json"))
    }

    pub fn calendar_token_path(&self) -> PathBuf {
        self.calendar_token_file
            .clone()
            .unwrap_or_else(|| data_dir().join("token.json"))
    }

    pub fn calendar_client_secret_path(&self) -> PathBuf {
        self.calendar_client_secret_file
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("credentials.json"))
    }
}

fn data_dir() -> PathBuf {
    let mut p = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    p.push(APP_DIR);
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            distraction_threshold_seconds = 60
            distracting_url_keywords = ["reddit.com"]
            "#,
        )
        .unwrap();
        assert_eq!(config.distraction_threshold_seconds, 60);
        assert_eq!(config.distracting_url_keywords, vec!["reddit.com".to_string()]);
        assert_eq!(config.poll_interval_seconds, 2);
        assert!(config.distracting_bundle_ids.contains(&"com.apple.Safari".to_string()));
    }

    #[test]
    fn validated_clamps_out_of_range_values() {
        let config = AppConfig {
            distraction_threshold_seconds: 0,
            poll_interval_seconds: 600,
            reminder_lead_minutes: -5,
            frame_size: 4,
            ..AppConfig::default()
        }
        .validated();
        assert_eq!(config.distraction_threshold_seconds, 1);
        assert_eq!(config.poll_interval_seconds, 60);
        assert_eq!(config.reminder_lead_minutes, 0);
        assert_eq!(config.frame_size, 16);
    }

    #[test]
    fn explicit_paths_override_platform_dirs() {
        let config = AppConfig {
            tasks_file: Some(PathBuf::from("/tmp/dog/tasks.json")),
            ..AppConfig::default()
        };
        assert_eq!(config.tasks_path(), PathBuf::from("/tmp/dog/tasks.json"));
        assert!(config.calendar_token_path().ends_with("digital-dog/token.json"));
    }
}
