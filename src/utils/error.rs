use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to parse response: {message}")]
    Parse { message: String },

    #[error("Response contained no items")]
    EmptyPayload,

    #[error("Channel '{channel}' failed: {message}")]
    Channel { channel: String, message: String },

    #[error("Channel '{channel}' temporarily unavailable: {message}")]
    ChannelUnavailable { channel: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfig { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// 錯誤分類，對應輪詢迴圈中的處理邊界
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Parse,
    Channel,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ReminderError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn channel(channel: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Channel {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) | Self::Transport { .. } | Self::Status { .. } => ErrorCategory::Transport,
            Self::Parse { .. } | Self::EmptyPayload => ErrorCategory::Parse,
            Self::Channel { .. } | Self::ChannelUnavailable { .. } => ErrorCategory::Channel,
            Self::Toml(_)
            | Self::Config { .. }
            | Self::MissingConfig { .. }
            | Self::InvalidConfigValue { .. } => ErrorCategory::Configuration,
            Self::Io(_) | Self::Serialization(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Parse if matches!(self, Self::EmptyPayload) => ErrorSeverity::Low,
            ErrorCategory::Transport | ErrorCategory::Parse | ErrorCategory::Channel => {
                ErrorSeverity::Medium
            }
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 可在下一輪自動恢復的錯誤
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::Parse | ErrorCategory::Channel
        )
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::Http(e) if e.is_timeout() => "The upstream is slow; consider raising source.timeout_seconds",
            Self::Http(_) | Self::Transport { .. } => "Check network connectivity and proxy settings",
            Self::Status { status, .. } if *status == 401 || *status == 403 => {
                "The session cookie was rejected; log in again and update the subject's cookie"
            }
            Self::Status { .. } => "The upstream returned an error; it will be retried next round",
            Self::Parse { .. } => {
                "The response was not the expected JSON; the cookie may have expired"
            }
            Self::EmptyPayload => "No grades have been published yet",
            Self::Channel { .. } => "Check the notification channel URL and credentials",
            Self::ChannelUnavailable { .. } => {
                "Check the corp id / secret of the push channel; it will be retried on the next message"
            }
            Self::Toml(_) | Self::Config { .. } | Self::MissingConfig { .. } => {
                "Fix the configuration file and restart"
            }
            Self::InvalidConfigValue { .. } => "Correct the highlighted configuration value",
            Self::Io(_) => "Check file permissions and available disk space",
            Self::Serialization(_) => "Report this as a bug",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Transport => format!("Network problem: {}", self),
            ErrorCategory::Parse => format!("Unexpected data: {}", self),
            ErrorCategory::Channel => format!("Notification problem: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::System => format!("System problem: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReminderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(ReminderError::EmptyPayload.category(), ErrorCategory::Parse);
        assert_eq!(
            ReminderError::Status {
                url: "https://example.com".to_string(),
                status: 502
            }
            .category(),
            ErrorCategory::Transport
        );
        assert_eq!(
            ReminderError::channel("webhook", "boom").category(),
            ErrorCategory::Channel
        );
        assert_eq!(
            ReminderError::MissingConfig {
                field: "subjects".to_string()
            }
            .category(),
            ErrorCategory::Configuration
        );
    }

    #[test]
    fn test_only_runtime_errors_are_recoverable() {
        assert!(ReminderError::parse("bad json").is_recoverable());
        assert!(ReminderError::EmptyPayload.is_recoverable());
        assert!(!ReminderError::config("no subjects").is_recoverable());
    }

    #[test]
    fn test_severity_ordering() {
        assert_eq!(ReminderError::EmptyPayload.severity(), ErrorSeverity::Low);
        assert!(ReminderError::config("x").severity() > ReminderError::parse("x").severity());
    }
}
