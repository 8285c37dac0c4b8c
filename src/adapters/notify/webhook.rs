use crate::adapters::http::{HttpFetcher, HttpSettings};
use crate::domain::model::{Delivery, Notification};
use crate::domain::ports::{FetchRequest, Fetcher, Method, Notifier};
use crate::utils::error::{ReminderError, Result};
use async_trait::async_trait;
use url::Url;

pub const DEFAULT_TEXT_PARAM: &str = "text";

/// 通用 webhook 頻道：把訊息 URL 編碼後放進查詢參數
///
/// 適用於 Telegram bot 的 `sendMessage?chat_id=...` 這類預先設定好的網址。
pub struct WebhookNotifier {
    name: String,
    url: Url,
    method: Method,
    text_param: String,
    fetcher: HttpFetcher,
}

impl WebhookNotifier {
    pub fn new(
        url: &str,
        method: Method,
        text_param: impl Into<String>,
        settings: &HttpSettings,
    ) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| ReminderError::InvalidConfigValue {
            field: "notify.webhook.url".to_string(),
            value: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name: "webhook".to_string(),
            url,
            method,
            text_param: text_param.into(),
            fetcher: HttpFetcher::new(settings)?,
        })
    }

    fn target_url(&self, text: &str) -> String {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair(&self.text_param, text);
        url.into()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, notification: &Notification) -> Result<Delivery> {
        let url = self.target_url(&notification.text());
        let request = match self.method {
            Method::Get => FetchRequest::get(url),
            Method::Post => FetchRequest::post(url),
        };

        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| ReminderError::channel(&self.name, e))?;

        let mut delivery = Delivery::default();
        delivery
            .metadata
            .insert("status".to_string(), response.status.to_string());
        Ok(delivery)
    }
}
