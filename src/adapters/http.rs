use crate::domain::ports::{FetchRequest, FetchResponse, Fetcher, Method};
use crate::utils::error::{ReminderError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36";

/// 建立 HTTP 客戶端所需的連線設定
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub proxy: Option<String>,
    pub user_agent: String,
    /// 額外信任的根憑證 (PEM)，只作用於此客戶端
    pub ca_certificate: Option<PathBuf>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            ca_certificate: None,
        }
    }
}

impl HttpSettings {
    pub fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout);

        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        if let Some(path) = &self.ca_certificate {
            let pem = std::fs::read(path)?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
            tracing::debug!("Trusting additional CA certificate from {}", path.display());
        }

        Ok(builder.build()?)
    }
}

/// 錯誤訊息中去掉查詢字串，避免洩漏 token 或學號
pub fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        Ok(Self {
            client: settings.build_client()?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        tracing::debug!("📡 {:?} {}", request.method, redact(&request.url));

        let response = builder.send().await.map_err(|e| ReminderError::Transport {
            url: redact(&request.url).to_string(),
            message: describe(&e),
        })?;

        let status = response.status();
        tracing::debug!("📡 Response status: {}", status);

        if !status.is_success() {
            return Err(ReminderError::Status {
                url: redact(&request.url).to_string(),
                status: status.as_u16(),
            });
        }

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();

        // reqwest 的錯誤訊息含完整網址，查詢字串可能帶有 token
        let body = response.text().await.map_err(|e| ReminderError::Transport {
            url: redact(&request.url).to_string(),
            message: describe(&e),
        })?;

        Ok(FetchResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

fn describe(error: &reqwest::Error) -> String {
    let kind = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "connection failed"
    } else if error.is_body() || error.is_decode() {
        "failed to read response body"
    } else if error.is_builder() {
        "invalid request"
    } else {
        "request failed"
    };

    match std::error::Error::source(error) {
        Some(source) => format!("{}: {}", kind, source),
        None => kind.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ErrorCategory;
    use httpmock::prelude::*;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&HttpSettings::default()).unwrap()
    }

    #[test]
    fn test_redact_strips_query() {
        assert_eq!(
            redact("https://qyapi.example.com/cgi-bin/message/send?access_token=SECRET"),
            "https://qyapi.example.com/cgi-bin/message/send"
        );
        assert_eq!(redact("https://example.com/a"), "https://example.com/a");
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_headers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/grades").header("cookie", "JSESSIONID=abc");
                then.status(200)
                    .header("X-Trace", "t-1")
                    .body(r#"{"items":[]}"#);
            })
            .await;

        let request = FetchRequest::post(server.url("/grades")).header("Cookie", "JSESSIONID=abc");
        let response = fetcher().fetch(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"items":[]}"#);
        assert_eq!(response.headers.get("x-trace").map(String::as_str), Some("t-1"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/down");
                then.status(503);
            })
            .await;

        let err = fetcher()
            .fetch(&FetchRequest::get(server.url("/down")))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Transport);
        assert!(matches!(err, ReminderError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_does_not_panic() {
        let settings = HttpSettings {
            connect_timeout: Duration::from_millis(200),
            timeout: Duration::from_millis(500),
            ..HttpSettings::default()
        };
        let fetcher = HttpFetcher::new(&settings).unwrap();

        // 預留埠 9 (discard) 通常沒有服務監聽
        let err = fetcher
            .fetch(&FetchRequest::get("http://127.0.0.1:9/unreachable"))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Transport);
    }

    #[tokio::test]
    async fn test_truncated_body_error_hides_query_string() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            // 宣告 100 bytes 但只送出一部分就關閉連線
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n{\"errcode\"")
                .await;
            let _ = socket.shutdown().await;
        });

        let url = format!(
            "http://{}/cgi-bin/message/send?access_token=SECRET-TOKEN",
            addr
        );
        let err = fetcher().fetch(&FetchRequest::get(url)).await.unwrap_err();

        assert!(matches!(err, ReminderError::Transport { .. }));
        assert!(!err.to_string().contains("SECRET-TOKEN"));
        assert!(err.to_string().contains("/cgi-bin/message/send"));
    }

    #[test]
    fn test_invalid_proxy_is_rejected_at_build_time() {
        let settings = HttpSettings {
            proxy: Some("http://[::1".to_string()),
            ..HttpSettings::default()
        };
        assert!(settings.build_client().is_err());
    }
}
