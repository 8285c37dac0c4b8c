use anyhow::Result;
use grade_reminder::config::SAMPLE_CONFIG;
use grade_reminder::utils::validation::Validate;
use grade_reminder::{AppConfig, ReminderError};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_sample_config_round_trips_through_a_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, SAMPLE_CONFIG)?;

    std::env::set_var("GRADE_COOKIE", "JSESSIONID=sample");
    std::env::set_var("TELEGRAM_TOKEN", "123:abc");
    std::env::set_var("TELEGRAM_CHAT_ID", "42");
    let config = AppConfig::from_file(&path)?;
    std::env::remove_var("GRADE_COOKIE");
    std::env::remove_var("TELEGRAM_TOKEN");
    std::env::remove_var("TELEGRAM_CHAT_ID");

    config.validate()?;
    assert_eq!(config.subjects[0].cookie.as_deref(), Some("JSESSIONID=sample"));
    assert_eq!(
        config.notify.webhook.as_ref().map(|w| w.url.as_str()),
        Some("https://api.telegram.org/bot123:abc/sendMessage?chat_id=42")
    );
    assert_eq!(config.round_delay(), Duration::from_secs(10));
    assert_eq!(config.dispatcher()?.channel_names(), vec!["webhook"]);
    Ok(())
}

#[test]
fn test_broken_toml_is_a_configuration_error() {
    let err = AppConfig::from_toml_str("[source\nrequest_url = 1").unwrap_err();
    assert!(matches!(err, ReminderError::Toml(_)));
    assert_eq!(
        err.category(),
        grade_reminder::utils::error::ErrorCategory::Configuration
    );
}

#[test]
fn test_env_only_configuration_builds_a_runnable_setup() -> Result<()> {
    let vars = [
        ("REQUEST_URL", "https://jw.example.edu.cn/cjcx.html?doType=query"),
        ("STUDENT_IDS", "2021000001"),
        ("COOKIES", "JSESSIONID=abc"),
        ("WEBHOOK_URL", "https://hooks.example.com/notify"),
    ];
    let config = AppConfig::from_env_with(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })?;

    config.validate()?;
    let subjects = config.subjects()?;
    assert_eq!(subjects.len(), 1);
    let url = config.poller_settings().source.url_for(&subjects[0].id)?;
    assert!(url.contains("su=2021000001"));
    Ok(())
}
