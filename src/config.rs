use crate::defaults;
use crate::error::{Result, SpeakError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub speech: SpeechConfig,
    pub pipeline: QueueConfig,
    pub audio: AudioConfig,
    pub models: ModelsConfig,
    pub log: LogConfig,
}

/// Voice, rate and language handed to the TTS backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechConfig {
    pub voice: String,
    pub speed: f32,
    pub language: String,
}

/// Queue capacities and worker timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub task_queue: usize,
    pub audio_queue: usize,
    pub poll_interval_ms: u64,
    pub join_timeout_ms: u64,
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name; `None` uses the system default.
    pub device: Option<String>,
    /// When set, sentences are written as WAV files here instead of played.
    pub export_dir: Option<PathBuf>,
}

/// Model storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ModelsConfig {
    pub dir: Option<PathBuf>,
}

/// Run log location and rotation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub run_log: Option<PathBuf>,
    pub max_bytes: u64,
    pub backups: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice: defaults::DEFAULT_VOICE.to_string(),
            speed: defaults::DEFAULT_SPEED,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            task_queue: defaults::TASK_QUEUE_CAPACITY,
            audio_queue: defaults::AUDIO_QUEUE_CAPACITY,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            join_timeout_ms: defaults::JOIN_TIMEOUT_MS,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            run_log: None,
            max_bytes: defaults::RUN_LOG_MAX_BYTES,
            backups: defaults::RUN_LOG_BACKUPS,
        }
    }
}

impl LogConfig {
    /// Run log path, defaulting to `~/.local/share/speakline/speakline.log`.
    pub fn run_log_path(&self) -> Option<PathBuf> {
        self.run_log.clone().or_else(|| {
            dirs::data_local_dir().map(|d| d.join("speakline").join(defaults::RUN_LOG_FILE))
        })
    }
}

impl ModelsConfig {
    /// Model directory, defaulting to `~/.cache/speakline/models`.
    pub fn resolved_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|d| d.join("speakline").join("models"))
            .ok_or_else(|| SpeakError::Other("Could not determine cache directory".to_string()))
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(SpeakError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(SpeakError::Config(e)) => Err(SpeakError::ConfigParse {
                message: format!("{}: {}", path.display(), e),
            }),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SPEAKLINE_VOICE → speech.voice
    /// - SPEAKLINE_LANGUAGE → speech.language
    /// - SPEAKLINE_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(voice) = std::env::var("SPEAKLINE_VOICE")
            && !voice.is_empty()
        {
            self.speech.voice = voice;
        }

        if let Ok(language) = std::env::var("SPEAKLINE_LANGUAGE")
            && !language.is_empty()
        {
            self.speech.language = language;
        }

        if let Ok(device) = std::env::var("SPEAKLINE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.task_queue == 0 {
            return Err(SpeakError::ConfigInvalidValue {
                key: "pipeline.task_queue".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.pipeline.audio_queue == 0 {
            return Err(SpeakError::ConfigInvalidValue {
                key: "pipeline.audio_queue".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.pipeline.poll_interval_ms == 0 {
            return Err(SpeakError::ConfigInvalidValue {
                key: "pipeline.poll_interval_ms".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(defaults::MIN_SPEED..=defaults::MAX_SPEED).contains(&self.speech.speed) {
            return Err(SpeakError::ConfigInvalidValue {
                key: "speech.speed".to_string(),
                message: format!(
                    "must be between {} and {}, got {}",
                    defaults::MIN_SPEED,
                    defaults::MAX_SPEED,
                    self.speech.speed
                ),
            });
        }
        if self.speech.voice.trim().is_empty() {
            return Err(SpeakError::ConfigInvalidValue {
                key: "speech.voice".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/speakline/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join("speakline").join("config.toml"))
            .ok_or_else(|| SpeakError::Other("Could not determine config directory".to_string()))
    }

    /// Serialize back to TOML, used by `config dump`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SpeakError::ConfigParse {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_speakline_env() {
        remove_env("SPEAKLINE_VOICE");
        remove_env("SPEAKLINE_LANGUAGE");
        remove_env("SPEAKLINE_AUDIO_DEVICE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.speech.voice, "af_heart");
        assert_eq!(config.speech.speed, 0.75);
        assert_eq!(config.speech.language, "en-us");

        assert_eq!(config.pipeline.task_queue, 2);
        assert_eq!(config.pipeline.audio_queue, 5);
        assert_eq!(config.pipeline.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.pipeline.join_timeout(), Duration::from_secs(1));

        assert_eq!(config.audio.device, None);
        assert_eq!(config.log.max_bytes, 1_048_576);
        assert_eq!(config.log.backups, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [speech]
            voice = "bf_emma"
            speed = 1.25
            language = "en-gb"

            [pipeline]
            task_queue = 4
            audio_queue = 8

            [audio]
            device = "pulse"

            [log]
            run_log = "/tmp/speakline-test.log"
            backups = 2
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.speech.voice, "bf_emma");
        assert_eq!(config.speech.speed, 1.25);
        assert_eq!(config.speech.language, "en-gb");
        assert_eq!(config.pipeline.task_queue, 4);
        assert_eq!(config.pipeline.audio_queue, 8);
        assert_eq!(config.pipeline.poll_interval_ms, 10, "unset keep default");
        assert_eq!(config.audio.device, Some("pulse".to_string()));
        assert_eq!(
            config.log.run_log_path(),
            Some(PathBuf::from("/tmp/speakline-test.log"))
        );
        assert_eq!(config.log.backups, 2);
        assert_eq!(config.log.max_bytes, 1_048_576);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[speech]\nvoice = \"am_adam\"\n")
            .unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.speech.voice, "am_adam");
        assert_eq!(config.speech.speed, 0.75);
        assert_eq!(config.pipeline, QueueConfig::default());
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_env_override_voice() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_speakline_env();

        set_env("SPEAKLINE_VOICE", "bm_george");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.speech.voice, "bm_george");
        assert_eq!(config.speech.language, "en-us"); // Not overridden

        clear_speakline_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_speakline_env();

        set_env("SPEAKLINE_VOICE", "af_sky");
        set_env("SPEAKLINE_LANGUAGE", "en-gb");
        set_env("SPEAKLINE_AUDIO_DEVICE", "hw:1,0");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.speech.voice, "af_sky");
        assert_eq!(config.speech.language, "en-gb");
        assert_eq!(config.audio.device, Some("hw:1,0".to_string()));

        clear_speakline_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_speakline_env();

        set_env("SPEAKLINE_VOICE", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.speech.voice, "af_heart");

        clear_speakline_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[speech\nvoice = \"broken\n").unwrap();

        assert!(Config::load(temp_file.path()).is_err());

        let err = Config::load_or_default(temp_file.path()).unwrap_err();
        assert!(
            matches!(err, SpeakError::ConfigParse { .. }),
            "invalid TOML must not fall back to defaults, got: {err:?}"
        );
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_rejects_zero_queue() {
        let mut config = Config::default();
        config.pipeline.audio_queue = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pipeline.audio_queue"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_speed() {
        let mut config = Config::default();
        config.speech.speed = 3.0;
        assert!(config.validate().is_err());
        config.speech.speed = 0.5;
        assert!(config.validate().is_ok(), "bounds are inclusive");
    }

    #[test]
    fn test_toml_dump_round_trips() {
        let mut config = Config::default();
        config.audio.device = Some("pulse".to_string());
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path().unwrap();
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("speakline"));
        assert!(path_str.ends_with("config.toml"));
    }
}
