use crate::core::detect::{self, Change, DetectionMode};
use crate::core::dispatch::{DispatchReport, Dispatcher};
use crate::core::extract::{self, FieldNames};
use crate::core::report;
use crate::domain::model::{ObservationSnapshot, Subject, SubjectState};
use crate::domain::ports::{FetchRequest, Fetcher, Storage};
use crate::utils::error::{ErrorCategory, ReminderError, Result};
use crate::utils::monitor::ProcessMonitor;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub const SUBJECT_PLACEHOLDER: &str = "{subject_id}";

/// 上游請求的組成方式
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub request_url: String,
    /// 網址中沒有 `{subject_id}` 時，以此參數附加學號
    pub subject_param: String,
    pub page_size_param: String,
    pub page_size: u32,
    pub page_param: String,
    pub headers: HashMap<String, String>,
}

impl SourceRequest {
    pub fn default_headers() -> HashMap<String, String> {
        [
            ("Accept", "application/json, text/javascript, */*; q=0.01"),
            ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.5"),
            (
                "Content-Type",
                "application/x-www-form-urlencoded;charset=UTF-8",
            ),
            ("X-Requested-With", "XMLHttpRequest"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    pub fn url_for(&self, subject_id: &str) -> Result<String> {
        let templated = self.request_url.contains(SUBJECT_PLACEHOLDER);
        let raw = if templated {
            self.request_url
                .replace(SUBJECT_PLACEHOLDER, &encode_segment(subject_id)?)
        } else {
            self.request_url.clone()
        };

        let mut url = Url::parse(&raw).map_err(|e| ReminderError::InvalidConfigValue {
            field: "source.request_url".to_string(),
            value: self.request_url.clone(),
            reason: e.to_string(),
        })?;

        // 重建查詢字串，避免與網址中既有的同名參數重複
        let replaced = |key: &str| {
            (!templated && key == self.subject_param)
                || (self.page_size > 0 && (key == self.page_size_param || key == self.page_param))
        };
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !replaced(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            if !templated {
                pairs.append_pair(&self.subject_param, subject_id);
            }
            if self.page_size > 0 {
                pairs.append_pair(&self.page_size_param, &self.page_size.to_string());
                pairs.append_pair(&self.page_param, "1");
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url.into())
    }

    pub fn build(&self, subject_id: &str, cookie: &str) -> Result<FetchRequest> {
        Ok(FetchRequest::post(self.url_for(subject_id)?)
            .headers(&Self::default_headers())
            .headers(&self.headers)
            .header("Cookie", cookie))
    }
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub source: SourceRequest,
    pub fields: FieldNames,
    pub detection: DetectionMode,
    pub subject_delay: Duration,
    pub round_delay: Duration,
    /// 是否把解析後的原始資料寫入儲存以便檢查
    pub debug_dump: bool,
    /// 連續失敗達此次數時提示憑證可能過期
    pub failure_warning_threshold: u32,
}

#[derive(Debug, Clone)]
pub enum SubjectOutcome {
    Baseline { count: usize },
    Changed {
        previous: usize,
        current: usize,
        dispatch: DispatchReport,
    },
    Unchanged { count: usize },
    /// 回應中尚無任何成績
    NoData,
    Failed {
        category: ErrorCategory,
        message: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RoundSummary {
    pub round: u64,
    pub outcomes: Vec<(String, SubjectOutcome)>,
}

impl RoundSummary {
    pub fn notified(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SubjectOutcome::Changed { .. }))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SubjectOutcome::Failed { .. }))
            .count()
    }

    pub fn outcome(&self, subject_id: &str) -> Option<&SubjectOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == subject_id)
            .map(|(_, o)| o)
    }
}

/// 輪詢主迴圈：逐一處理對象，抓取、解析、比對、通知
pub struct Poller<F: Fetcher, S: Storage> {
    settings: PollerSettings,
    subjects: Vec<Subject>,
    states: HashMap<String, SubjectState>,
    fetcher: F,
    dispatcher: Dispatcher,
    storage: S,
    monitor: ProcessMonitor,
    round: u64,
}

impl<F: Fetcher, S: Storage> Poller<F, S> {
    pub fn new(
        settings: PollerSettings,
        subjects: Vec<Subject>,
        fetcher: F,
        dispatcher: Dispatcher,
        storage: S,
    ) -> Self {
        let states = subjects
            .iter()
            .map(|s| (s.id.clone(), SubjectState::default()))
            .collect();

        Self {
            settings,
            subjects,
            states,
            fetcher,
            dispatcher,
            storage,
            monitor: ProcessMonitor::default(),
            round: 0,
        }
    }

    pub fn with_monitor(mut self, monitor: ProcessMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn state(&self, subject_id: &str) -> Option<&SubjectState> {
        self.states.get(subject_id)
    }

    /// 持續輪詢直到行程被終止
    pub async fn run_forever(&mut self) {
        loop {
            let summary = self.run_round().await;
            tracing::info!(
                "🔄 Round {} finished: {} subject(s), {} notified, {} failed",
                summary.round,
                summary.outcomes.len(),
                summary.notified(),
                summary.failures()
            );

            let millis = self.settings.round_delay.as_millis();
            println!("{}Wait {}ms{}", "=".repeat(15), millis, "=".repeat(15));
            tokio::time::sleep(self.settings.round_delay).await;
        }
    }

    pub async fn run_round(&mut self) -> RoundSummary {
        self.round += 1;
        let now = Local::now();
        println!("{}", report::timestamp(now));
        tracing::debug!("🔄 Round {} started", self.round);

        let mut summary = RoundSummary {
            round: self.round,
            outcomes: Vec::with_capacity(self.subjects.len()),
        };

        for index in 0..self.subjects.len() {
            if index > 0 {
                tokio::time::sleep(self.settings.subject_delay).await;
            }

            let subject = self.subjects[index].clone();
            let outcome = self.poll_subject(&subject, now).await;
            summary.outcomes.push((subject.id, outcome));
        }

        self.monitor.log_round(self.round);
        summary
    }

    async fn poll_subject(&mut self, subject: &Subject, now: DateTime<Local>) -> SubjectOutcome {
        let observed = self.observe(subject).await;
        let threshold = self.settings.failure_warning_threshold;
        let mode = self.settings.detection;
        let state = self.states.entry(subject.id.clone()).or_default();

        let snapshot = match observed {
            Ok(snapshot) => snapshot,
            Err(ReminderError::EmptyPayload) => {
                state.consecutive_failures = 0;
                println!("No grades yet.");
                tracing::info!("📭 {}: no grades published yet", subject.id);
                return SubjectOutcome::NoData;
            }
            Err(e) => {
                state.consecutive_failures += 1;
                println!("{}", e.user_friendly_message());
                tracing::warn!(
                    "⚠️ {}: {} (failure {} in a row)",
                    subject.id,
                    e,
                    state.consecutive_failures
                );
                if threshold > 0 && state.consecutive_failures == threshold {
                    tracing::warn!("💡 {}: {}", subject.id, e.recovery_suggestion());
                }
                return SubjectOutcome::Failed {
                    category: e.category(),
                    message: e.to_string(),
                };
            }
        };

        print!("{}", report::render(&snapshot));
        state.consecutive_failures = 0;
        state.last_success = Some(now);

        match detect::observe(state, snapshot.baseline(), mode) {
            Change::Baseline { count } => {
                tracing::info!("📌 {}: baseline recorded ({} items)", subject.id, count);
                SubjectOutcome::Baseline { count }
            }
            Change::Unchanged => SubjectOutcome::Unchanged {
                count: snapshot.item_count(),
            },
            Change::Changed { previous, current } => {
                tracing::info!(
                    "🔔 {}: items changed {} -> {}, sending notification",
                    subject.id,
                    previous,
                    current
                );
                let dispatch = self.notify(subject, &snapshot, now).await;
                SubjectOutcome::Changed {
                    previous,
                    current,
                    dispatch,
                }
            }
        }
    }

    async fn notify(
        &self,
        subject: &Subject,
        snapshot: &ObservationSnapshot,
        now: DateTime<Local>,
    ) -> DispatchReport {
        if self.dispatcher.is_empty() {
            tracing::warn!("📪 {}: change detected but no channels are configured", subject.id);
            return DispatchReport::default();
        }

        println!("Push Notification...");
        let notification = report::notification(subject, snapshot, now);
        let dispatch = self.dispatcher.dispatch(&notification).await;
        for outcome in &dispatch.outcomes {
            if let Err(message) = &outcome.result {
                println!("Notification push failed ({}): {}", outcome.channel, message);
            }
        }
        dispatch
    }

    /// 抓取並解析一個對象的資料
    async fn observe(&self, subject: &Subject) -> Result<ObservationSnapshot> {
        let cookie = subject.credential.resolve().await?;
        let request = self.settings.source.build(&subject.id, &cookie)?;
        let response = self.fetcher.fetch(&request).await?;
        let payload = extract::parse_payload(&response.body)?;

        if self.settings.debug_dump {
            self.dump(subject, &payload).await;
        }

        extract::extract_snapshot(&payload, &self.settings.fields)
    }

    async fn dump(&self, subject: &Subject, payload: &serde_json::Value) {
        let file_name = format!("{}.json", sanitize(&subject.id));
        let result = match serde_json::to_vec_pretty(payload) {
            Ok(data) => self.storage.write_file(&file_name, &data).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => tracing::debug!("🐛 {}: payload written to {}", subject.id, file_name),
            Err(e) => tracing::warn!("🐛 {}: failed to write debug dump: {}", subject.id, e),
        }
    }
}

/// 以路徑片段規則編碼：空白為 `%20`，`/` 為 `%2F`
fn encode_segment(value: &str) -> Result<String> {
    let mut scratch = Url::parse("http://localhost/")
        .map_err(|e| ReminderError::config(format!("cannot encode subject id: {}", e)))?;
    scratch
        .path_segments_mut()
        .map_err(|_| ReminderError::config("cannot encode subject id"))?
        .clear()
        .push(value);
    Ok(scratch.path().trim_start_matches('/').to_string())
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
