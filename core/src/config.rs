use crate::transport::TransportKind;
use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_SPEECH_PATH: &str = "/api/ws/speech";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_url: String,
    pub transport: TransportKind,
    pub id_token: Option<String>,
    pub stream: StreamSettings,
    pub speech: SpeechSettings,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub path: String,
    pub chunk_interval: Duration,
    pub sample_rate: u32,
    pub channels: u16,
    pub auth_timeout: Duration,
    pub recorder: RecorderCommand,
}

/// External program that writes raw PCM from the microphone to stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl RecorderCommand {
    pub fn pulse(sample_rate: u32, channels: u16) -> Self {
        Self {
            program: "parec".to_string(),
            args: vec![
                "--format=s16le".to_string(),
                format!("--rate={sample_rate}"),
                format!("--channels={channels}"),
            ],
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            transport: TransportKind::Http,
            id_token: None,
            stream: StreamSettings::default(),
            speech: SpeechSettings::default(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(120),
        }
    }
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_SPEECH_PATH.to_string(),
            chunk_interval: Duration::from_millis(100),
            sample_rate: 16_000,
            channels: 1,
            auth_timeout: Duration::from_secs(10),
            recorder: RecorderCommand::pulse(16_000, 1),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(detail) => format!("Shiori is misconfigured: {detail}. Update shiori.yaml."),
        }
    }
}

impl ClientSettings {
    /// Load settings from the first `shiori.yaml` found, then apply
    /// environment overrides. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = match locate_config_file() {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let mut settings = resolve_settings(file)?;
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        resolve_settings(Some(read_config_file(path)?))
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: ShioriConfig = serde_yaml::from_str(contents)
            .map_err(|err| ConfigError::Invalid(format!("invalid shiori.yaml: {err}")))?;
        resolve_settings(Some(config))
    }

    /// Apply `SHIORI_*` overrides using the given variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SHIORI_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_url = normalize_api_url(&url)?;
        }
        if let Some(token) = lookup("SHIORI_ID_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.id_token = Some(token.trim().to_string());
        }
        if let Some(kind) = lookup("SHIORI_TRANSPORT") {
            self.transport = TransportKind::parse(&kind).ok_or_else(|| {
                ConfigError::Invalid(format!("unknown transport `{kind}` in SHIORI_TRANSPORT"))
            })?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ShioriConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
    })?;
    serde_yaml::from_str(&contents)
        .map_err(|err| ConfigError::Invalid(format!("invalid shiori.yaml: {err}")))
}

fn resolve_settings(config: Option<ShioriConfig>) -> Result<ClientSettings, ConfigError> {
    let mut settings = ClientSettings::default();
    let Some(config) = config else {
        return Ok(settings);
    };

    if let Some(url) = config.api_url {
        settings.api_url = normalize_api_url(&url)?;
    }
    if let Some(kind) = config.transport {
        settings.transport = TransportKind::parse(&kind)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown transport `{kind}`")))?;
    }
    settings.id_token = config
        .id_token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    if let Some(stream) = config.stream {
        if let Some(secs) = stream.idle_timeout_secs {
            if secs == 0 {
                return Err(ConfigError::Invalid(
                    "stream.idle_timeout_secs must be positive".to_string(),
                ));
            }
            settings.stream.idle_timeout = Duration::from_secs(secs);
        }
    }

    if let Some(speech) = config.speech {
        let target = &mut settings.speech;
        if let Some(path) = speech.path {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "speech.path must start with `/`, got `{path}`"
                )));
            }
            target.path = path;
        }
        if let Some(ms) = speech.chunk_interval_ms {
            if ms == 0 {
                return Err(ConfigError::Invalid(
                    "speech.chunk_interval_ms must be positive".to_string(),
                ));
            }
            target.chunk_interval = Duration::from_millis(ms);
        }
        if let Some(rate) = speech.sample_rate {
            target.sample_rate = rate;
        }
        if let Some(channels) = speech.channels {
            target.channels = channels;
        }
        if let Some(secs) = speech.auth_timeout_secs {
            if secs == 0 {
                return Err(ConfigError::Invalid(
                    "speech.auth_timeout_secs must be positive".to_string(),
                ));
            }
            target.auth_timeout = Duration::from_secs(secs);
        }
        target.recorder = match speech.recorder {
            Some(section) => {
                let program = section.program.trim().to_string();
                if program.is_empty() {
                    return Err(ConfigError::Invalid(
                        "speech.recorder.program cannot be empty".to_string(),
                    ));
                }
                RecorderCommand {
                    program,
                    args: section.args,
                }
            }
            None => RecorderCommand::pulse(target.sample_rate, target.channels),
        };
    }

    Ok(settings)
}

fn normalize_api_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed)
        .map_err(|err| ConfigError::Invalid(format!("invalid api_url `{trimmed}`: {err}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(ConfigError::Invalid(format!(
            "api_url must use http or https, got `{other}`"
        ))),
    }
}

fn locate_config_file() -> Option<PathBuf> {
    shiori_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn shiori_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("shiori");
        paths.push(config_dir.join("shiori.yaml"));
        paths.push(config_dir.join("shiori.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".shiori").join("shiori.yaml"));
        paths.push(home_dir.join(".shiori").join("shiori.yml"));
    }
    paths.push(PathBuf::from("shiori.yaml"));
    paths
}

#[derive(Debug, Default, Deserialize)]
struct ShioriConfig {
    api_url: Option<String>,
    transport: Option<String>,
    id_token: Option<String>,
    stream: Option<StreamSection>,
    speech: Option<SpeechSection>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamSection {
    idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeechSection {
    path: Option<String>,
    chunk_interval_ms: Option<u64>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    auth_timeout_secs: Option<u64>,
    recorder: Option<RecorderSection>,
}

#[derive(Debug, Default, Deserialize)]
struct RecorderSection {
    #[serde(default)]
    program: String,
    #[serde(default)]
    args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let settings = resolve_settings(None).expect("defaults");
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.transport, TransportKind::Http);
        assert_eq!(settings.speech.chunk_interval, Duration::from_millis(100));
        assert_eq!(settings.speech.path, DEFAULT_SPEECH_PATH);
        assert_eq!(settings.speech.recorder.program, "parec");
    }

    #[test]
    fn resolves_file_sections() {
        let settings = ClientSettings::from_yaml(
            r#"
api_url: https://api.example.com/
transport: mock
id_token: " abc "
stream:
  idle_timeout_secs: 30
speech:
  chunk_interval_ms: 250
  sample_rate: 48000
  recorder:
    program: arecord
    args: ["-q", "-f", "S16_LE"]
"#,
        )
        .expect("settings");
        assert_eq!(settings.api_url, "https://api.example.com");
        assert_eq!(settings.transport, TransportKind::Mock);
        assert_eq!(settings.id_token.as_deref(), Some("abc"));
        assert_eq!(settings.stream.idle_timeout, Duration::from_secs(30));
        assert_eq!(settings.speech.chunk_interval, Duration::from_millis(250));
        assert_eq!(settings.speech.sample_rate, 48_000);
        assert_eq!(settings.speech.recorder.program, "arecord");
        assert_eq!(settings.speech.recorder.args.len(), 3);
    }

    #[test]
    fn default_recorder_follows_audio_format() {
        let settings = ClientSettings::from_yaml("speech:\n  sample_rate: 8000\n").expect("settings");
        assert!(settings
            .speech
            .recorder
            .args
            .contains(&"--rate=8000".to_string()));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ClientSettings::from_yaml("api_url: ftp://example.com").is_err());
        assert!(ClientSettings::from_yaml("transport: carrier-pigeon").is_err());
        assert!(ClientSettings::from_yaml("speech:\n  chunk_interval_ms: 0\n").is_err());
        assert!(ClientSettings::from_yaml("speech:\n  path: api/ws\n").is_err());
    }

    #[test]
    fn rejects_zero_auth_timeout() {
        let err = ClientSettings::from_yaml("speech:\n  auth_timeout_secs: 0\n")
            .expect_err("zero timeout");
        assert!(err.to_string().contains("auth_timeout_secs"));

        let settings =
            ClientSettings::from_yaml("speech:\n  auth_timeout_secs: 3\n").expect("settings");
        assert_eq!(settings.speech.auth_timeout, Duration::from_secs(3));
    }

    #[test]
    fn env_overrides_win() {
        let mut settings = ClientSettings::from_yaml("api_url: http://file.example").expect("settings");
        let env: HashMap<&str, &str> = [
            ("SHIORI_API_URL", "https://env.example/"),
            ("SHIORI_ID_TOKEN", "env-token"),
            ("SHIORI_TRANSPORT", "MOCK"),
        ]
        .into_iter()
        .collect();
        settings
            .apply_env(|key| env.get(key).map(|value| value.to_string()))
            .expect("overrides");
        assert_eq!(settings.api_url, "https://env.example");
        assert_eq!(settings.id_token.as_deref(), Some("env-token"));
        assert_eq!(settings.transport, TransportKind::Mock);
    }

    #[test]
    fn user_message_mentions_config_file() {
        let err = ConfigError::Invalid("bad api_url".into());
        assert!(err.user_message().contains("shiori.yaml"));
    }
}
