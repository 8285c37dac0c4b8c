use crate::domain::model::{Baseline, SubjectState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// 只比較項目數量
    #[default]
    Count,
    /// 比較內容摘要，分數被修改時也會觸發
    Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// 第一次成功觀測，只記錄基準不通知
    Baseline { count: usize },
    Changed { previous: usize, current: usize },
    Unchanged,
}

impl Change {
    pub fn should_notify(&self) -> bool {
        matches!(self, Change::Changed { .. })
    }
}

pub fn detect(previous: Option<&Baseline>, current: &Baseline, mode: DetectionMode) -> Change {
    let Some(previous) = previous else {
        return Change::Baseline {
            count: current.count,
        };
    };

    let changed = match mode {
        DetectionMode::Count => previous.count != current.count,
        DetectionMode::Signature => previous.signature != current.signature,
    };

    if changed {
        Change::Changed {
            previous: previous.count,
            current: current.count,
        }
    } else {
        Change::Unchanged
    }
}

/// 偵測並在需要時更新基準。只應在成功取得非空結果後呼叫
pub fn observe(state: &mut SubjectState, current: Baseline, mode: DetectionMode) -> Change {
    let change = detect(state.baseline.as_ref(), &current, mode);
    match change {
        Change::Baseline { .. } | Change::Changed { .. } => state.baseline = Some(current),
        Change::Unchanged => {}
    }
    change
}
