use std::time::{Duration, Instant};

pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unset,
    Valid,
    Expired,
}

#[derive(Debug, Clone)]
struct IssuedToken {
    value: String,
    usable_until: Instant,
}

/// 短效 access_token 的快取。過期前 `refresh_margin` 即視為過期，頻道回報無效時也會失效
#[derive(Debug, Clone)]
pub struct TokenCache {
    token: Option<IssuedToken>,
    refresh_margin: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_MARGIN)
    }
}

impl TokenCache {
    pub fn new(refresh_margin: Duration) -> Self {
        Self {
            token: None,
            refresh_margin,
        }
    }

    pub fn state(&self, now: Instant) -> TokenState {
        match &self.token {
            None => TokenState::Unset,
            Some(token) if now < token.usable_until => TokenState::Valid,
            Some(_) => TokenState::Expired,
        }
    }

    /// 只在 `Valid` 狀態下回傳 token
    pub fn get(&self, now: Instant) -> Option<&str> {
        match self.state(now) {
            TokenState::Valid => self.token.as_ref().map(|t| t.value.as_str()),
            _ => None,
        }
    }

    pub fn store(&mut self, value: impl Into<String>, expires_in: Duration, issued_at: Instant) {
        // expires_in 不超過安全邊界時視為立即過期
        let usable = expires_in.saturating_sub(self.refresh_margin);
        self.token = Some(IssuedToken {
            value: value.into(),
            usable_until: issued_at + usable,
        });
    }

    /// 頻道回報 token 無效時呼叫，強制下次重新取得
    pub fn invalidate(&mut self, now: Instant) {
        if let Some(token) = &mut self.token {
            token.usable_until = now;
        }
    }
}
