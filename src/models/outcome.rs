//! 比对结果模型

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::job::ComparisonRecord;

/// 单个比对单元（字段或行）的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictResult {
    Pass,
    Fail,
}

/// 整体结论，`Error` 只出现在结果层面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallResult {
    Pass,
    Fail,
    Error,
}

impl fmt::Display for OverallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallResult::Pass => write!(f, "Pass"),
            OverallResult::Fail => write!(f, "Fail"),
            OverallResult::Error => write!(f, "Error"),
        }
    }
}

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldVerdict {
    pub key: String,
    pub old_value: String,
    pub new_value: String,
    pub result: VerdictResult,
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl FieldVerdict {
    pub fn fail(
        key: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
            result: VerdictResult::Fail,
            group: group.into(),
            y: None,
        }
    }

    pub fn at_y(mut self, y: f64) -> Self {
        self.y = Some(y);
        self
    }

    pub fn is_fail(&self) -> bool {
        self.result == VerdictResult::Fail
    }
}

/// 一次比对的完整结果，生成后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonOutcome {
    pub overall_result: OverallResult,
    pub verdicts: Vec<FieldVerdict>,
    pub execution_time_ms: u64,
    pub old_ref: String,
    pub new_ref: String,
    pub old_file_name: String,
    pub new_file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComparisonOutcome {
    /// 为失败的记录合成一个 Error 结果（明细为空）
    pub fn errored(record: &ComparisonRecord, message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            overall_result: OverallResult::Error,
            verdicts: Vec::new(),
            execution_time_ms,
            old_ref: record.old_ref.clone(),
            new_ref: record.new_ref.clone(),
            old_file_name: record.old_display_name(),
            new_file_name: record.new_display_name(),
            error: Some(message.into()),
        }
    }

    pub fn fail_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.is_fail()).count()
    }
}

/// 持久化后的完整明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonDetail {
    pub id: String,
    #[serde(flatten)]
    pub outcome: ComparisonOutcome,
}

/// 行内摘要，用于批处理结果列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub sequence_number: usize,
    /// 只有成功比对并落盘的结果才有 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub old_file_name: String,
    pub new_file_name: String,
    pub old_ref: String,
    pub new_ref: String,
    pub overall_result: OverallResult,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComparisonSummary {
    pub fn from_outcome(sequence_number: usize, id: Option<String>, outcome: &ComparisonOutcome) -> Self {
        Self {
            sequence_number,
            id,
            old_file_name: outcome.old_file_name.clone(),
            new_file_name: outcome.new_file_name.clone(),
            old_ref: outcome.old_ref.clone(),
            new_ref: outcome.new_ref.clone(),
            overall_result: outcome.overall_result,
            execution_time_ms: outcome.execution_time_ms,
            error: outcome.error.clone(),
        }
    }

    pub fn errored(record: &ComparisonRecord, message: impl Into<String>, execution_time_ms: u64) -> Self {
        let outcome = ComparisonOutcome::errored(record, message, execution_time_ms);
        Self::from_outcome(record.sequence_number, None, &outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errored_outcome_keeps_empty_verdicts() {
        let record = ComparisonRecord::new(3, "a/old.pdf", "b/new.pdf");
        let outcome = ComparisonOutcome::errored(&record, "timeout", 12);
        assert_eq!(outcome.overall_result, OverallResult::Error);
        assert!(outcome.verdicts.is_empty());
        assert_eq!(outcome.old_file_name, "old.pdf");
        assert_eq!(outcome.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn detail_serializes_flat_with_camel_case() {
        let record = ComparisonRecord::new(1, "old.pdf", "new.pdf");
        let detail = ComparisonDetail {
            id: "abc".to_string(),
            outcome: ComparisonOutcome::errored(&record, "boom", 0),
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["overallResult"], "Error");
        assert_eq!(json["verdicts"].as_array().map(Vec::len), Some(0));
        let back: ComparisonDetail = serde_json::from_value(json).unwrap();
        assert_eq!(back, detail);
    }
}
