use crate::adapters::http::{HttpFetcher, HttpSettings};
use crate::adapters::notify::token::{TokenCache, TokenState};
use crate::domain::model::{Delivery, Notification};
use crate::domain::ports::{FetchRequest, Fetcher, Notifier};
use crate::utils::error::{ReminderError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://qyapi.weixin.qq.com";

/// 表示 access_token 無效或過期的錯誤碼
const INVALID_TOKEN_CODES: [i64; 4] = [40001, 40014, 41001, 42001];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    #[default]
    User,
    Party,
    Tag,
}

impl TargetType {
    pub fn field(&self) -> &'static str {
        match self {
            TargetType::User => "touser",
            TargetType::Party => "toparty",
            TargetType::Tag => "totag",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    TextCard,
}

#[derive(Debug, Clone)]
pub struct WeComSettings {
    pub corp_id: String,
    pub corp_secret: String,
    pub agent_id: i64,
    pub api_base: String,
    pub target_type: TargetType,
    /// 通知本身沒有指定對象時使用，可為 `@all`
    pub default_target: Option<String>,
    pub msg_type: MessageType,
    /// 0 可對外分享，1 保密訊息
    pub safe: u8,
    /// 文字卡片點擊後開啟的網址
    pub card_url: Option<String>,
    pub card_button: Option<String>,
    pub refresh_margin: Duration,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    msgid: Option<String>,
}

enum SendOutcome {
    Sent(Delivery),
    InvalidToken { errcode: i64, errmsg: String },
}

/// 企業微信應用訊息頻道
pub struct WeComNotifier {
    settings: WeComSettings,
    fetcher: HttpFetcher,
    tokens: Mutex<TokenCache>,
}

impl WeComNotifier {
    pub fn new(settings: WeComSettings, http: &HttpSettings) -> Result<Self> {
        let tokens = Mutex::new(TokenCache::new(settings.refresh_margin));
        Ok(Self {
            settings,
            fetcher: HttpFetcher::new(http)?,
            tokens,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.settings.api_base.trim_end_matches('/');
        Url::parse(&format!("{}{}", base, path))
            .map_err(|e| ReminderError::channel(self.name(), format!("invalid API base: {}", e)))
    }

    fn unavailable(&self, message: impl Into<String>) -> ReminderError {
        ReminderError::ChannelUnavailable {
            channel: self.name().to_string(),
            message: message.into(),
        }
    }

    /// 取得可用的 access_token，必要時向伺服器換取新的
    async fn access_token(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;
        let now = Instant::now();
        if let Some(token) = tokens.get(now) {
            return Ok(token.to_string());
        }

        let state = tokens.state(now);
        tracing::debug!("🔑 WeCom token state {:?}, refreshing", state);

        let mut url = self.endpoint("/cgi-bin/gettoken")?;
        url.query_pairs_mut()
            .append_pair("corpid", &self.settings.corp_id)
            .append_pair("corpsecret", &self.settings.corp_secret);

        let response = self
            .fetcher
            .fetch(&FetchRequest::get(url.as_str()))
            .await
            .map_err(|e| self.unavailable(format!("token refresh failed: {}", e)))?;

        let parsed: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| self.unavailable(format!("malformed token response: {}", e)))?;

        if parsed.errcode != 0 {
            return Err(self.unavailable(format!(
                "token refresh rejected (errcode {}): {}",
                parsed.errcode, parsed.errmsg
            )));
        }

        let token = parsed
            .access_token
            .ok_or_else(|| self.unavailable("token response has no access_token"))?;
        let expires_in = Duration::from_secs(parsed.expires_in.unwrap_or(0));

        tokens.store(token.clone(), expires_in, Instant::now());
        if tokens.state(Instant::now()) != TokenState::Valid {
            tracing::warn!(
                "🔑 WeCom token lifetime {:?} is within the refresh margin; it will be refreshed on every send",
                expires_in
            );
        }
        tracing::info!("🔑 WeCom access token refreshed (expires in {:?})", expires_in);

        Ok(token)
    }

    fn payload(&self, target: &str, notification: &Notification) -> serde_json::Value {
        let mut body = serde_json::json!({ "agentid": self.settings.agent_id });
        body[self.settings.target_type.field()] = target.into();

        match self.settings.msg_type {
            MessageType::Text => {
                body["msgtype"] = "text".into();
                body["text"] = serde_json::json!({ "content": notification.text() });
            }
            MessageType::TextCard => {
                body["msgtype"] = "textcard".into();
                let mut card = serde_json::json!({
                    "title": notification.title,
                    "description": notification.body.replace('\n', "<br>"),
                    "url": self.settings.card_url.clone().unwrap_or_default(),
                });
                if let Some(button) = &self.settings.card_button {
                    card["btntxt"] = button.clone().into();
                }
                body["textcard"] = card;
            }
        }

        if self.settings.safe != 0 {
            body["safe"] = self.settings.safe.into();
        }

        body
    }

    async fn post_message(&self, token: &str, payload: &serde_json::Value) -> Result<SendOutcome> {
        let mut url = self.endpoint("/cgi-bin/message/send")?;
        url.query_pairs_mut().append_pair("access_token", token);

        let response = self
            .fetcher
            .fetch(&FetchRequest::post(url.as_str()).json_body(payload))
            .await
            .map_err(|e| ReminderError::channel(self.name(), e))?;

        let parsed: SendResponse = serde_json::from_str(&response.body).map_err(|e| {
            ReminderError::channel(self.name(), format!("malformed send response: {}", e))
        })?;

        if parsed.errcode == 0 {
            return Ok(SendOutcome::Sent(Delivery {
                message_id: parsed.msgid.filter(|id| !id.is_empty()),
                ..Delivery::default()
            }));
        }

        if INVALID_TOKEN_CODES.contains(&parsed.errcode) {
            return Ok(SendOutcome::InvalidToken {
                errcode: parsed.errcode,
                errmsg: parsed.errmsg,
            });
        }

        Err(ReminderError::channel(
            self.name(),
            format!("errcode {}: {}", parsed.errcode, parsed.errmsg),
        ))
    }
}

#[async_trait]
impl Notifier for WeComNotifier {
    fn name(&self) -> &str {
        "wecom"
    }

    async fn send(&self, notification: &Notification) -> Result<Delivery> {
        let target = notification
            .recipient
            .as_deref()
            .or(self.settings.default_target.as_deref())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ReminderError::channel(
                    self.name(),
                    format!("no recipient configured for subject {}", notification.subject_id),
                )
            })?;

        let payload = self.payload(target, notification);

        let token = self.access_token().await?;
        match self.post_message(&token, &payload).await? {
            SendOutcome::Sent(delivery) => Ok(delivery),
            SendOutcome::InvalidToken { errcode, errmsg } => {
                tracing::info!(
                    "🔑 WeCom rejected access token (errcode {}: {}), retrying with a fresh one",
                    errcode,
                    errmsg
                );
                self.tokens.lock().await.invalidate(Instant::now());

                let token = self.access_token().await?;
                match self.post_message(&token, &payload).await? {
                    SendOutcome::Sent(delivery) => Ok(delivery),
                    SendOutcome::InvalidToken { errcode, errmsg } => Err(self.unavailable(format!(
                        "fresh token rejected (errcode {}): {}",
                        errcode, errmsg
                    ))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ErrorCategory;
    use httpmock::prelude::*;

    fn settings(api_base: String) -> WeComSettings {
        WeComSettings {
            corp_id: "ww-corp".to_string(),
            corp_secret: "s3cret".to_string(),
            agent_id: 1000002,
            api_base,
            target_type: TargetType::User,
            default_target: None,
            msg_type: MessageType::Text,
            safe: 0,
            card_url: None,
            card_button: None,
            refresh_margin: Duration::from_secs(60),
        }
    }

    fn notification(recipient: Option<&str>) -> Notification {
        Notification {
            subject_id: "0000000001".to_string(),
            recipient: recipient.map(str::to_string),
            title: "[2026-10-19 08:00:00]".to_string(),
            body: "[Alice]\n95\tCompilers[3]".to_string(),
        }
    }

    #[test]
    fn test_text_payload_shape() {
        let notifier =
            WeComNotifier::new(settings(DEFAULT_API_BASE.to_string()), &HttpSettings::default())
                .unwrap();
        let payload = notifier.payload("alice", &notification(Some("alice")));

        assert_eq!(payload["touser"], "alice");
        assert_eq!(payload["msgtype"], "text");
        assert_eq!(payload["agentid"], 1000002);
        assert_eq!(
            payload["text"]["content"],
            "[2026-10-19 08:00:00]\n[Alice]\n95\tCompilers[3]"
        );
        assert!(payload.get("safe").is_none());
    }

    #[test]
    fn test_textcard_payload_shape() {
        let mut s = settings(DEFAULT_API_BASE.to_string());
        s.msg_type = MessageType::TextCard;
        s.target_type = TargetType::Party;
        s.card_url = Some("https://jw.example.edu.cn".to_string());
        s.card_button = Some("Open".to_string());
        s.safe = 1;
        let notifier = WeComNotifier::new(s, &HttpSettings::default()).unwrap();

        let payload = notifier.payload("2", &notification(None));
        assert_eq!(payload["toparty"], "2");
        assert_eq!(payload["msgtype"], "textcard");
        assert_eq!(payload["textcard"]["description"], "[Alice]<br>95\tCompilers[3]");
        assert_eq!(payload["textcard"]["btntxt"], "Open");
        assert_eq!(payload["safe"], 1);
    }

    #[tokio::test]
    async fn test_token_is_reused_while_valid() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/cgi-bin/gettoken")
                    .query_param("corpid", "ww-corp")
                    .query_param("corpsecret", "s3cret");
                then.status(200).json_body(serde_json::json!({
                    "errcode": 0, "errmsg": "ok", "access_token": "T1", "expires_in": 7200
                }));
            })
            .await;
        let send_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/cgi-bin/message/send")
                    .query_param("access_token", "T1")
                    .json_body_partial(r#"{"touser": "alice", "msgtype": "text", "agentid": 1000002}"#);
                then.status(200).json_body(serde_json::json!({
                    "errcode": 0, "errmsg": "ok", "msgid": "m-1"
                }));
            })
            .await;

        let notifier = WeComNotifier::new(settings(server.base_url()), &HttpSettings::default()).unwrap();

        let first = notifier.send(&notification(Some("alice"))).await.unwrap();
        notifier.send(&notification(Some("alice"))).await.unwrap();

        assert_eq!(first.message_id.as_deref(), Some("m-1"));
        token_mock.assert_hits_async(1).await;
        send_mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_before_sending() {
        let server = MockServer::start_async().await;
        // 有效期短於安全邊界，每次送出前都需要重新取得
        let token_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/cgi-bin/gettoken");
                then.status(200).json_body(serde_json::json!({
                    "errcode": 0, "errmsg": "ok", "access_token": "T1", "expires_in": 30
                }));
            })
            .await;
        let send_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/cgi-bin/message/send");
                then.status(200)
                    .json_body(serde_json::json!({"errcode": 0, "errmsg": "ok"}));
            })
            .await;

        let notifier = WeComNotifier::new(settings(server.base_url()), &HttpSettings::default()).unwrap();
        notifier.send(&notification(Some("alice"))).await.unwrap();
        notifier.send(&notification(Some("alice"))).await.unwrap();

        token_mock.assert_hits_async(2).await;
        send_mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_invalid_token_response_triggers_refresh_and_single_retry() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/cgi-bin/gettoken");
                then.status(200).json_body(serde_json::json!({
                    "errcode": 0, "errmsg": "ok", "access_token": "T1", "expires_in": 7200
                }));
            })
            .await;
        let send_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/cgi-bin/message/send");
                then.status(200).json_body(serde_json::json!({
                    "errcode": 42001, "errmsg": "access_token expired"
                }));
            })
            .await;

        let notifier = WeComNotifier::new(settings(server.base_url()), &HttpSettings::default()).unwrap();
        let err = notifier.send(&notification(Some("alice"))).await.unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Channel);
        token_mock.assert_hits_async(2).await;
        send_mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_token_refresh_failure_degrades_to_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/cgi-bin/gettoken");
                then.status(200).json_body(serde_json::json!({
                    "errcode": 40013, "errmsg": "invalid corpid"
                }));
            })
            .await;
        let send_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/cgi-bin/message/send");
                then.status(200).json_body(serde_json::json!({"errcode": 0}));
            })
            .await;

        let notifier = WeComNotifier::new(settings(server.base_url()), &HttpSettings::default()).unwrap();
        let err = notifier.send(&notification(Some("alice"))).await.unwrap_err();

        assert!(matches!(err, ReminderError::ChannelUnavailable { .. }));
        send_mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_default_target_is_used_without_recipient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/cgi-bin/gettoken");
                then.status(200).json_body(serde_json::json!({
                    "errcode": 0, "access_token": "T1", "expires_in": 7200
                }));
            })
            .await;
        let send_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/cgi-bin/message/send")
                    .json_body_partial(r#"{"touser": "@all"}"#);
                then.status(200).json_body(serde_json::json!({"errcode": 0}));
            })
            .await;

        let mut s = settings(server.base_url());
        s.default_target = Some("@all".to_string());
        let notifier = WeComNotifier::new(s, &HttpSettings::default()).unwrap();
        notifier.send(&notification(None)).await.unwrap();

        send_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_recipient_fails_without_network() {
        let notifier = WeComNotifier::new(
            settings("http://127.0.0.1:9".to_string()),
            &HttpSettings::default(),
        )
        .unwrap();

        let err = notifier.send(&notification(None)).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Channel);
        assert!(err.to_string().contains("no recipient"));
    }
}
