use crate::adapters::notify::{MessageType, TargetType, WeComNotifier, WeComSettings, WebhookNotifier};
use crate::adapters::{HttpSettings, LocalStorage};
use crate::core::detect::DetectionMode;
use crate::core::dispatch::Dispatcher;
use crate::core::extract::FieldNames;
use crate::core::poller::{PollerSettings, SourceRequest};
use crate::domain::model::{Credential, Subject};
use crate::domain::ports::Method;
use crate::utils::error::{ReminderError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SUBJECT_PARAM: &str = "su";
pub const DEFAULT_PAGE_SIZE: u32 = 5000;
pub const DEFAULT_ROUND_DELAY_MS: u64 = 10_000;
pub const DEFAULT_SUBJECT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_DUMP_DIR: &str = "debug";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub subjects: Vec<SubjectConfig>,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub request_url: String,
    pub subject_param: Option<String>,
    pub page_size: Option<u32>,
    pub user_agent: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub connect_timeout_seconds: Option<u64>,
    pub proxy: Option<String>,
    pub ca_cert_path: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub fields: FieldNames,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub round_delay_ms: Option<u64>,
    pub subject_delay_ms: Option<u64>,
    pub detection: Option<DetectionMode>,
    pub failure_threshold: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectConfig {
    pub id: String,
    pub cookie: Option<String>,
    pub cookie_file: Option<String>,
    pub wecom_user: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook: Option<WebhookConfig>,
    pub wecom: Option<WeComConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub method: Option<String>,
    pub text_param: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeComConfig {
    pub corp_id: String,
    pub corp_secret: String,
    pub agent_id: i64,
    pub api_base: Option<String>,
    pub target_type: Option<TargetType>,
    pub default_target: Option<String>,
    pub msg_type: Option<MessageType>,
    pub safe: Option<u8>,
    pub card_url: Option<String>,
    pub card_button: Option<String>,
    pub refresh_margin_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,
    pub dump_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 每輪記錄行程的 CPU 與記憶體用量
    pub monitor: Option<bool>,
}

impl SubjectConfig {
    pub fn to_subject(&self) -> Result<Subject> {
        let credential = match (&self.cookie, &self.cookie_file) {
            (Some(cookie), None) => Credential::Inline(cookie.clone()),
            (None, Some(path)) => Credential::File(PathBuf::from(path)),
            _ => {
                return Err(ReminderError::InvalidConfigValue {
                    field: format!("subjects[{}]", self.id),
                    value: self.id.clone(),
                    reason: "exactly one of cookie or cookie_file must be set".to_string(),
                })
            }
        };

        Ok(Subject {
            id: self.id.clone(),
            credential,
            recipient: self.wecom_user.clone(),
        })
    }
}

impl WebhookConfig {
    pub fn method(&self) -> Method {
        match self.method.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("get") => Method::Get,
            _ => Method::Post,
        }
    }
}

impl WeComConfig {
    pub fn settings(&self) -> WeComSettings {
        WeComSettings {
            corp_id: self.corp_id.clone(),
            corp_secret: self.corp_secret.clone(),
            agent_id: self.agent_id,
            api_base: self
                .api_base
                .clone()
                .unwrap_or_else(|| crate::adapters::notify::wecom::DEFAULT_API_BASE.to_string()),
            target_type: self.target_type.unwrap_or_default(),
            default_target: self.default_target.clone(),
            msg_type: self.msg_type.unwrap_or_default(),
            safe: self.safe.unwrap_or(0),
            card_url: self.card_url.clone(),
            card_button: self.card_button.clone(),
            refresh_margin: self
                .refresh_margin_secs
                .map(Duration::from_secs)
                .unwrap_or(crate::adapters::notify::token::DEFAULT_REFRESH_MARGIN),
        }
    }
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| ReminderError::Config {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${WECOM_CORP_SECRET})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ReminderError::config(e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                tracing::warn!("⚠️ Environment variable {} is not set", var_name);
                format!("${{{}}}", var_name)
            })
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        // 上游來源
        let source = &self.source;
        validation::validate_url("source.request_url", &source.request_url)?;
        validation::validate_non_empty_string("source.subject_param", &self.subject_param())?;
        if let Some(proxy) = &source.proxy {
            validation::validate_proxy_url("source.proxy", proxy)?;
        }
        if let Some(path) = &source.ca_cert_path {
            validation::validate_path("source.ca_cert_path", path)?;
        }
        if let Some(timeout) = source.timeout_seconds {
            validation::validate_positive_number("source.timeout_seconds", timeout, 1)?;
        }
        if let Some(timeout) = source.connect_timeout_seconds {
            validation::validate_positive_number("source.connect_timeout_seconds", timeout, 1)?;
        }

        // 追蹤對象
        if self.subjects.is_empty() {
            return Err(ReminderError::MissingConfig {
                field: "subjects".to_string(),
            });
        }
        for subject in &self.subjects {
            validation::validate_non_empty_string("subjects.id", &subject.id)?;
            subject.to_subject()?;
            if let Some(cookie) = &subject.cookie {
                validation::validate_non_empty_string(&format!("subjects[{}].cookie", subject.id), cookie)?;
            }
            if let Some(path) = &subject.cookie_file {
                validation::validate_path(&format!("subjects[{}].cookie_file", subject.id), path)?;
            }
        }
        validation::validate_unique("subjects.id", self.subjects.iter().map(|s| s.id.as_str()))?;

        // 通知頻道
        if let Some(webhook) = &self.notify.webhook {
            validation::validate_url("notify.webhook.url", &webhook.url)?;
            if let Some(method) = &webhook.method {
                validation::validate_one_of(
                    "notify.webhook.method",
                    &method.to_ascii_lowercase(),
                    &["get", "post"],
                )?;
            }
            if let Some(param) = &webhook.text_param {
                validation::validate_non_empty_string("notify.webhook.text_param", param)?;
            }
        }

        if let Some(wecom) = &self.notify.wecom {
            validation::validate_non_empty_string("notify.wecom.corp_id", &wecom.corp_id)?;
            validation::validate_non_empty_string("notify.wecom.corp_secret", &wecom.corp_secret)?;
            if let Some(base) = &wecom.api_base {
                validation::validate_url("notify.wecom.api_base", base)?;
            }
            if let Some(safe) = wecom.safe {
                validation::validate_one_of("notify.wecom.safe", &safe.to_string(), &["0", "1"])?;
            }
            if wecom.msg_type == Some(MessageType::TextCard) {
                let url = validation::validate_required_field("notify.wecom.card_url", &wecom.card_url)?;
                validation::validate_url("notify.wecom.card_url", url)?;
            }

            let has_default = wecom
                .default_target
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty());
            for subject in &self.subjects {
                if subject.wecom_user.is_none() && !has_default {
                    tracing::warn!(
                        "⚠️ Subject {} has no wecom_user and notify.wecom.default_target is unset; WeCom delivery will fail for it",
                        subject.id
                    );
                }
            }
        }

        if self.debug.enabled {
            validation::validate_path("debug.dump_dir", &self.dump_dir())?;
        }

        Ok(())
    }

    pub fn subject_param(&self) -> String {
        self.source
            .subject_param
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBJECT_PARAM.to_string())
    }

    pub fn round_delay(&self) -> Duration {
        Duration::from_millis(self.schedule.round_delay_ms.unwrap_or(DEFAULT_ROUND_DELAY_MS))
    }

    pub fn subject_delay(&self) -> Duration {
        Duration::from_millis(
            self.schedule
                .subject_delay_ms
                .unwrap_or(DEFAULT_SUBJECT_DELAY_MS),
        )
    }

    pub fn dump_dir(&self) -> String {
        self.debug
            .dump_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_DUMP_DIR.to_string())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.logging.monitor.unwrap_or(false)
    }

    pub fn http_settings(&self) -> HttpSettings {
        let defaults = HttpSettings::default();
        HttpSettings {
            timeout: self
                .source
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            connect_timeout: self
                .source
                .connect_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            proxy: self.source.proxy.clone(),
            user_agent: self.source.user_agent.clone().unwrap_or(defaults.user_agent),
            ca_certificate: self.source.ca_cert_path.as_ref().map(PathBuf::from),
        }
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            source: SourceRequest {
                request_url: self.source.request_url.clone(),
                subject_param: self.subject_param(),
                page_size_param: "queryModel.showCount".to_string(),
                page_size: self.source.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
                page_param: "queryModel.currentPage".to_string(),
                headers: self.source.headers.clone().unwrap_or_default(),
            },
            fields: self.source.fields.clone(),
            detection: self.schedule.detection.unwrap_or_default(),
            subject_delay: self.subject_delay(),
            round_delay: self.round_delay(),
            debug_dump: self.debug.enabled,
            failure_warning_threshold: self
                .schedule
                .failure_threshold
                .unwrap_or(DEFAULT_FAILURE_THRESHOLD),
        }
    }

    pub fn subjects(&self) -> Result<Vec<Subject>> {
        self.subjects.iter().map(SubjectConfig::to_subject).collect()
    }

    /// 依設定建立通知頻道，順序固定為 webhook 再 wecom
    ///
    /// `source.proxy` 與 `source.ca_cert_path` 只作用於上游，通知頻道直接連線。
    pub fn dispatcher(&self) -> Result<Dispatcher> {
        let http = HttpSettings {
            proxy: None,
            ca_certificate: None,
            ..self.http_settings()
        };
        let mut dispatcher = Dispatcher::default();

        if let Some(webhook) = &self.notify.webhook {
            let text_param = webhook
                .text_param
                .clone()
                .unwrap_or_else(|| crate::adapters::notify::webhook::DEFAULT_TEXT_PARAM.to_string());
            dispatcher.add_channel(Box::new(WebhookNotifier::new(
                &webhook.url,
                webhook.method(),
                text_param,
                &http,
            )?));
        }

        if let Some(wecom) = &self.notify.wecom {
            dispatcher.add_channel(Box::new(WeComNotifier::new(wecom.settings(), &http)?));
        }

        Ok(dispatcher)
    }

    pub fn debug_storage(&self) -> LocalStorage {
        LocalStorage::new(self.dump_dir())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

/// `init` 指令寫出的範例設定檔
pub const SAMPLE_CONFIG: &str = r#"# grade-reminder configuration

[source]
# 成績查詢介面，學號會以 subject_param 附加在查詢字串中
# 也可以在網址中使用 {subject_id} 佔位符
request_url = "https://jw.example.edu.cn/jwglxt/cjcx/cjcx_cxXsgrcj.html?doType=query&gnmkdm=N305005"
subject_param = "su"
page_size = 5000
timeout_seconds = 5
connect_timeout_seconds = 5
# proxy = "socks5h://127.0.0.1:1080"
# ca_cert_path = "./campus-ca.pem"

[source.headers]
# Referer = "https://jw.example.edu.cn/jwglxt/"

[schedule]
round_delay_ms = 10000
subject_delay_ms = 1000
# count 只比較科目數量；signature 在分數被修改時也會通知
detection = "count"
failure_threshold = 3

[[subjects]]
id = "2021000001"
cookie = "${GRADE_COOKIE}"
# cookie_file = "./cookies/2021000001.txt"
# wecom_user = "zhangsan"

[notify.webhook]
url = "https://api.telegram.org/bot${TELEGRAM_TOKEN}/sendMessage?chat_id=${TELEGRAM_CHAT_ID}"
method = "post"
text_param = "text"

# [notify.wecom]
# corp_id = "${WECOM_CORP_ID}"
# corp_secret = "${WECOM_CORP_SECRET}"
# agent_id = 1000002
# target_type = "user"
# default_target = "@all"
# msg_type = "text"

[debug]
enabled = false
dump_dir = "debug"

[logging]
# 日誌等級與格式由命令列參數 --verbose / --json-logs 或 RUST_LOG 控制
monitor = false
"#;
