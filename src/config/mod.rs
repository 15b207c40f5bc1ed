use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub browser: BrowserConfig,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Root directory for all session artifacts (frames, audio, video,
    /// screenshots, active_sessions.json). Defaults to the data dir.
    pub recordings_root: Option<PathBuf>,
    /// Display name the agent joins meetings under.
    pub bot_name: String,
    /// OS-specific audio source. On macOS this is the avfoundation device
    /// index (e.g. "0"); on Linux the pulse source name or "default".
    pub audio_device: Option<String>,
    /// FFmpeg executable. Resolved via PATH when not absolute.
    pub ffmpeg_path: PathBuf,
    /// Write debug/<platform>_step<N>_<label>.png captures during join.
    pub debug_screenshots: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            recordings_root: None,
            bot_name: "Meetscribe Notetaker".to_string(),
            audio_device: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            debug_screenshots: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chromium/Chrome executable override. Auto-detected when unset.
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Opaque token handed to the transcription collaborator.
    /// Absence disables that path; capture itself never uses it.
    pub openai_api_key: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = global::config_file()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = global::config_file()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Effective recordings root, falling back to the platform data dir.
    pub fn recordings_root(&self) -> Result<PathBuf> {
        match &self.capture.recordings_root {
            Some(root) => Ok(root.clone()),
            None => global::recordings_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capture_config() {
        let config = CaptureConfig::default();
        assert_eq!(config.bot_name, "Meetscribe Notetaker");
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert!(config.recordings_root.is_none());
        assert!(!config.debug_screenshots);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.capture.bot_name = "Scribe".to_string();
        config.capture.audio_device = Some("1".to_string());

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.capture.bot_name, "Scribe");
        assert_eq!(parsed.capture.audio_device, Some("1".to_string()));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[capture]\nbot_name = \"Notula\"\n").unwrap();
        assert_eq!(parsed.capture.bot_name, "Notula");
        assert!(parsed.browser.headless);
        assert!(parsed.transcription.openai_api_key.is_none());
    }
}
