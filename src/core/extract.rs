use crate::domain::model::{GradedItem, ObservationSnapshot};
use crate::utils::error::{ReminderError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

/// 上游 JSON 中各欄位的名稱
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub items: String,
    pub score: String,
    pub credit: String,
    pub course: String,
    pub name: String,
    pub grade_point: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            items: "items".to_string(),
            score: "bfzcj".to_string(),
            credit: "xf".to_string(),
            course: "kcmc".to_string(),
            name: "xm".to_string(),
            grade_point: "jd".to_string(),
        }
    }
}

/// 解析原始回應。非 JSON 的回應通常是登入頁，代表 cookie 已失效
pub fn parse_payload(body: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        let hint = if body.trim_start().starts_with('<') {
            " (got HTML, the session cookie has probably expired)"
        } else {
            ""
        };
        ReminderError::parse(format!("response is not valid JSON: {}{}", e, hint))
    })?;

    if !value.is_object() {
        return Err(ReminderError::parse("response is not a JSON object"));
    }
    Ok(value)
}

/// 排序：分數高者在前，同分時學分高者在前，再以課程名稱排序
pub fn rank(a: &GradedItem, b: &GradedItem) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.credit.total_cmp(&a.credit))
        .then_with(|| a.course.cmp(&b.course))
}

/// Σ(score × credit) / Σ(credit)，總學分為零時回傳 `None`
pub fn weighted_mean(items: &[GradedItem]) -> Option<f64> {
    weighted_by(items, |item| Some(item.score))
}

/// 以學分加權的績點，任一科目缺少績點時回傳 `None`
pub fn grade_point_average(items: &[GradedItem]) -> Option<f64> {
    weighted_by(items, |item| item.grade_point)
}

fn weighted_by(items: &[GradedItem], value: impl Fn(&GradedItem) -> Option<f64>) -> Option<f64> {
    let mut total_credit = 0.0;
    let mut weighted = 0.0;
    for item in items {
        weighted += value(item)? * item.credit;
        total_credit += item.credit;
    }

    if total_credit == 0.0 {
        return None;
    }
    let mean = weighted / total_credit;
    mean.is_finite().then_some(mean)
}

/// 已排序項目的內容摘要，同一組成績不論回應順序都得到相同結果
pub fn signature(sorted: &[GradedItem]) -> String {
    let mut hasher = Sha256::new();
    for item in sorted {
        hasher.update(format!("{}\t{}\t{}\n", item.course, item.score, item.credit).as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn extract_snapshot(payload: &Value, fields: &FieldNames) -> Result<ObservationSnapshot> {
    let items = payload
        .get(&fields.items)
        .ok_or_else(|| ReminderError::parse(format!("missing '{}' list", fields.items)))?
        .as_array()
        .ok_or_else(|| ReminderError::parse(format!("'{}' is not a list", fields.items)))?;

    if items.is_empty() {
        return Err(ReminderError::EmptyPayload);
    }

    let mut graded = Vec::with_capacity(items.len());
    for (index, raw) in items.iter().enumerate() {
        let object = raw
            .as_object()
            .ok_or_else(|| ReminderError::parse(format!("item {} is not an object", index)))?;

        graded.push(GradedItem {
            score: number(object, &fields.score, index)?,
            credit: number(object, &fields.credit, index)?,
            course: text(object, &fields.course, index)?,
            grade_point: number(object, &fields.grade_point, index).ok(),
        });
    }

    let display_name = items[0]
        .as_object()
        .map(|first| text(first, &fields.name, 0))
        .transpose()?
        .unwrap_or_default();

    graded.sort_by(rank);

    Ok(ObservationSnapshot {
        display_name,
        weighted_mean: weighted_mean(&graded),
        gpa: grade_point_average(&graded),
        signature: signature(&graded),
        items: graded,
    })
}

pub fn extract(body: &str, fields: &FieldNames) -> Result<ObservationSnapshot> {
    extract_snapshot(&parse_payload(body)?, fields)
}

/// 數值欄位可能是數字或數字字串
fn number(object: &Map<String, Value>, key: &str, index: usize) -> Result<f64> {
    let value = object
        .get(key)
        .ok_or_else(|| ReminderError::parse(format!("item {} is missing '{}'", index, key)))?;

    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.filter(|n| n.is_finite()).ok_or_else(|| {
        ReminderError::parse(format!(
            "item {} has non-numeric '{}': {}",
            index, key, value
        ))
    })
}

fn text(object: &Map<String, Value>, key: &str, index: usize) -> Result<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ReminderError::parse(format!("item {} is missing '{}'", index, key)))
}
