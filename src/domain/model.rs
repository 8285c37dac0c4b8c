use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// 被追蹤的對象（一個學號）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    pub credential: Credential,
    /// 企業微信推送對象，未設定時使用頻道預設值
    pub recipient: Option<String>,
}

/// 存取憑證。內容對本程式不透明，可能隨時在外部被更換
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Inline(String),
    /// 每輪重新讀取，可在不重啟的情況下更新 cookie
    File(PathBuf),
}

impl Credential {
    pub async fn resolve(&self) -> std::io::Result<String> {
        match self {
            Credential::Inline(value) => Ok(value.clone()),
            Credential::File(path) => Ok(tokio::fs::read_to_string(path).await?.trim().to_string()),
        }
    }
}

/// 變化偵測所比對的上次觀測值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub count: usize,
    pub signature: String,
}

/// 每個對象的可變狀態，只由輪詢器持有與修改
#[derive(Debug, Clone, Default)]
pub struct SubjectState {
    /// `None` 表示尚未有過成功觀測
    pub baseline: Option<Baseline>,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Local>>,
}

impl SubjectState {
    pub fn is_first_observation(&self) -> bool {
        self.baseline.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedItem {
    pub score: f64,
    pub credit: f64,
    pub course: String,
    pub grade_point: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ObservationSnapshot {
    pub display_name: String,
    pub items: Vec<GradedItem>,
    /// Σ(score × credit) / Σ(credit)；總學分為零時無定義
    pub weighted_mean: Option<f64>,
    pub gpa: Option<f64>,
    pub signature: String,
}

impl ObservationSnapshot {
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn baseline(&self) -> Baseline {
        Baseline {
            count: self.items.len(),
            signature: self.signature.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub subject_id: String,
    pub recipient: Option<String>,
    pub title: String,
    pub body: String,
}

impl Notification {
    /// 純文字頻道使用的完整訊息
    pub fn text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }
}

/// 單一頻道成功送達的回執
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Delivery {
    pub message_id: Option<String>,
    pub metadata: HashMap<String, String>,
}
