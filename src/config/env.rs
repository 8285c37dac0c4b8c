use crate::config::toml_config::{
    AppConfig, DebugConfig, LoggingConfig, NotifyConfig, ScheduleConfig, SourceConfig,
    SubjectConfig, WeComConfig, WebhookConfig,
};
use crate::utils::error::{ReminderError, Result};

impl AppConfig {
    /// 僅由環境變數組成配置，供容器部署使用
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ReminderError::MissingConfig {
                    field: key.to_string(),
                })
        };

        let ids = split_list(&required("STUDENT_IDS")?);
        let cookies = split_list(&required("COOKIES")?);
        if ids.len() != cookies.len() {
            return Err(ReminderError::InvalidConfigValue {
                field: "COOKIES".to_string(),
                value: format!("{} entries", cookies.len()),
                reason: format!("must align with the {} STUDENT_IDS entries", ids.len()),
            });
        }

        let targets = lookup("WECOM_TARGETS").map(|v| split_list(&v)).unwrap_or_default();
        let subjects = ids
            .into_iter()
            .zip(cookies)
            .enumerate()
            .map(|(index, (id, cookie))| SubjectConfig {
                id,
                cookie: Some(cookie),
                cookie_file: None,
                wecom_user: targets.get(index).filter(|t| !t.is_empty()).cloned(),
            })
            .collect();

        let round_delay_ms = match lookup("CHECK_DELAY_MS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                ReminderError::InvalidConfigValue {
                    field: "CHECK_DELAY_MS".to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        let wecom = match lookup("WECOM_CORP_ID").filter(|v| !v.trim().is_empty()) {
            Some(corp_id) => {
                let raw_agent = required("WECOM_AGENT_ID")?;
                let agent_id = raw_agent.trim().parse::<i64>().map_err(|e| {
                    ReminderError::InvalidConfigValue {
                        field: "WECOM_AGENT_ID".to_string(),
                        value: raw_agent.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Some(WeComConfig {
                    corp_id,
                    corp_secret: required("WECOM_CORP_SECRET")?,
                    agent_id,
                    api_base: None,
                    target_type: None,
                    default_target: None,
                    msg_type: None,
                    safe: None,
                    card_url: None,
                    card_button: None,
                    refresh_margin_secs: None,
                })
            }
            None => None,
        };

        let webhook = lookup("WEBHOOK_URL")
            .filter(|v| !v.trim().is_empty())
            .map(|url| WebhookConfig {
                url,
                method: None,
                text_param: None,
            });

        Ok(Self {
            source: SourceConfig {
                request_url: required("REQUEST_URL")?,
                subject_param: None,
                page_size: None,
                user_agent: lookup("USER_AGENT").filter(|v| !v.trim().is_empty()),
                timeout_seconds: None,
                connect_timeout_seconds: None,
                proxy: None,
                ca_cert_path: None,
                headers: None,
                fields: Default::default(),
            },
            schedule: ScheduleConfig {
                round_delay_ms,
                ..Default::default()
            },
            subjects,
            notify: NotifyConfig { webhook, wecom },
            debug: DebugConfig {
                enabled: lookup("DEBUG").is_some_and(|v| is_truthy(&v)),
                dump_dir: None,
            },
            logging: LoggingConfig::default(),
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::validation::Validate;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_env_config() {
        let config = AppConfig::from_env_with(lookup(&[
            ("REQUEST_URL", "https://jw.example.edu.cn/cjcx.html?doType=query"),
            ("STUDENT_IDS", "2021000001, 2021000002"),
            ("COOKIES", "JSESSIONID=a,JSESSIONID=b"),
        ]))
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.subjects.len(), 2);
        assert_eq!(config.subjects[1].id, "2021000002");
        assert_eq!(config.subjects[1].cookie.as_deref(), Some("JSESSIONID=b"));
        assert!(config.notify.webhook.is_none());
        assert!(config.notify.wecom.is_none());
        assert!(!config.debug.enabled);
        assert_eq!(config.round_delay(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_misaligned_cookies_are_rejected() {
        let err = AppConfig::from_env_with(lookup(&[
            ("REQUEST_URL", "https://jw.example.edu.cn/cjcx.html"),
            ("STUDENT_IDS", "1,2"),
            ("COOKIES", "only-one"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ReminderError::InvalidConfigValue { .. }));
    }

    #[test]
    fn test_missing_request_url() {
        let err = AppConfig::from_env_with(lookup(&[("STUDENT_IDS", "1"), ("COOKIES", "c")]))
            .unwrap_err();
        assert!(err.to_string().contains("REQUEST_URL"));
    }

    #[test]
    fn test_channels_and_schedule_from_env() {
        let config = AppConfig::from_env_with(lookup(&[
            ("REQUEST_URL", "https://jw.example.edu.cn/cjcx.html"),
            ("STUDENT_IDS", "1,2"),
            ("COOKIES", "a,b"),
            ("CHECK_DELAY_MS", "30000"),
            ("DEBUG", "true"),
            ("WEBHOOK_URL", "https://api.telegram.org/bot1/sendMessage?chat_id=2"),
            ("WECOM_CORP_ID", "ww123"),
            ("WECOM_CORP_SECRET", "secret"),
            ("WECOM_AGENT_ID", "1000002"),
            ("WECOM_TARGETS", "alice,"),
        ]))
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.round_delay(), Duration::from_millis(30_000));
        assert!(config.debug.enabled);
        assert_eq!(config.subjects[0].wecom_user.as_deref(), Some("alice"));
        assert_eq!(config.subjects[1].wecom_user, None);
        assert_eq!(config.notify.wecom.as_ref().unwrap().agent_id, 1000002);
        assert_eq!(
            config.dispatcher().unwrap().channel_names(),
            vec!["webhook", "wecom"]
        );
    }

    #[test]
    fn test_user_agent_override_from_env() {
        let ua = "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0";
        let config = AppConfig::from_env_with(lookup(&[
            ("REQUEST_URL", "https://jw.example.edu.cn/cjcx.html"),
            ("STUDENT_IDS", "1"),
            ("COOKIES", "a"),
            ("USER_AGENT", ua),
        ]))
        .unwrap();
        assert_eq!(config.source.user_agent.as_deref(), Some(ua));
        assert_eq!(config.http_settings().user_agent, ua);

        let blank = AppConfig::from_env_with(lookup(&[
            ("REQUEST_URL", "https://jw.example.edu.cn/cjcx.html"),
            ("STUDENT_IDS", "1"),
            ("COOKIES", "a"),
            ("USER_AGENT", "  "),
        ]))
        .unwrap();
        assert_eq!(blank.source.user_agent, None);
    }

    #[test]
    fn test_bad_delay_is_rejected() {
        let err = AppConfig::from_env_with(lookup(&[
            ("REQUEST_URL", "https://jw.example.edu.cn/cjcx.html"),
            ("STUDENT_IDS", "1"),
            ("COOKIES", "a"),
            ("CHECK_DELAY_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CHECK_DELAY_MS"));
    }
}
