use shiori_core::{ClientSettings, TransportKind};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn settings_load_from_yaml_file() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("shiori.yaml");
    fs::write(
        &path,
        "api_url: https://shiori.example.com/\n\
         transport: mock\n\
         stream:\n  idle_timeout_secs: 30\n\
         speech:\n  sample_rate: 48000\n  channels: 2\n  chunk_interval_ms: 250\n",
    )
    .expect("write config");

    let settings = ClientSettings::from_path(&path).expect("settings");
    assert_eq!(settings.api_url, "https://shiori.example.com");
    assert_eq!(settings.transport, TransportKind::Mock);
    assert_eq!(settings.stream.idle_timeout, Duration::from_secs(30));
    assert_eq!(settings.speech.sample_rate, 48_000);
    assert_eq!(settings.speech.chunk_interval, Duration::from_millis(250));
    assert_eq!(settings.speech.recorder.program, "parec");
    assert!(settings
        .speech
        .recorder
        .args
        .contains(&"--rate=48000".to_string()));
    assert!(settings
        .speech
        .recorder
        .args
        .contains(&"--channels=2".to_string()));
}

#[test]
fn environment_overrides_file_values() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("shiori.yaml");
    fs::write(&path, "api_url: http://localhost:9000\nid_token: from-file\n").expect("write");

    let mut settings = ClientSettings::from_path(&path).expect("settings");
    settings
        .apply_env(|key| match key {
            "SHIORI_API_URL" => Some("https://api.shiori.app".to_string()),
            "SHIORI_ID_TOKEN" => Some("from-env".to_string()),
            _ => None,
        })
        .expect("env");
    assert_eq!(settings.api_url, "https://api.shiori.app");
    assert_eq!(settings.id_token.as_deref(), Some("from-env"));
    assert_eq!(settings.transport, TransportKind::Http);
}

#[test]
fn unreadable_config_is_reported() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("shiori.yaml");
    fs::write(&path, "api_url: [not, a, url]\n").expect("write");

    let err = ClientSettings::from_path(&path).expect_err("invalid");
    assert!(err.user_message().contains("shiori.yaml"));

    let missing = temp_dir.path().join("absent.yaml");
    assert!(ClientSettings::from_path(&missing).is_err());
}
