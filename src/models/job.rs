//! 批处理任务模型

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::outcome::ComparisonSummary;

/// 批处理的最小输入单元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRecord {
    /// 在清单中的序号（从1开始）
    pub sequence_number: usize,
    pub old_ref: String,
    pub new_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
}

impl ComparisonRecord {
    pub fn new(sequence_number: usize, old_ref: impl Into<String>, new_ref: impl Into<String>) -> Self {
        Self {
            sequence_number,
            old_ref: old_ref.into(),
            new_ref: new_ref.into(),
            old_name: None,
            new_name: None,
        }
    }

    pub fn old_display_name(&self) -> String {
        self.old_name.clone().unwrap_or_else(|| base_name(&self.old_ref))
    }

    pub fn new_display_name(&self) -> String {
        self.new_name.clone().unwrap_or_else(|| base_name(&self.new_ref))
    }
}

fn base_name(reference: &str) -> String {
    reference
        .trim_end_matches('/')
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(reference)
        .to_string()
}

/// 任务生命周期：Processing → Completed | Error（单向）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Processing => write!(f, "Processing"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Error => write!(f, "Error"),
        }
    }
}

/// 进度快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
    pub percentage: u8,
}

impl BatchProgress {
    pub fn new(processed: usize, total: usize) -> Self {
        let processed = processed.min(total);
        let percentage = if total == 0 {
            100
        } else {
            ((processed as f64 * 100.0) / total as f64).round() as u8
        };
        Self {
            processed,
            total,
            percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub id: String,
    pub status: JobStatus,
    pub total: usize,
    pub processed: usize,
    pub progress_percent: u8,
    #[serde(default)]
    pub results: Vec<ComparisonSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 任务占用的临时输入文件，清理过期任务时一并删除
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,
}

impl BatchJob {
    pub fn new(id: impl Into<String>, total: usize) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Processing,
            total,
            processed: 0,
            progress_percent: 0,
            results: Vec::new(),
            error: None,
            input_path: None,
        }
    }

    pub fn with_input_path(mut self, path: Option<String>) -> Self {
        self.input_path = path;
        self
    }

    /// 任务创建时间（毫秒时间戳，取自任务ID）
    pub fn created_at_millis(&self) -> Option<i64> {
        parse_job_timestamp(&self.id)
    }

    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            status: self.status,
            processed: self.processed,
            total: self.total,
            progress_percent: self.progress_percent,
            results: if self.status == JobStatus::Completed {
                Some(self.results.clone())
            } else {
                None
            },
            error: self.error.clone(),
        }
    }
}

/// 对外暴露的任务状态查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub status: JobStatus,
    pub processed: usize,
    pub total: usize,
    pub progress_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ComparisonSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 生成任务ID：`job_<毫秒时间戳>_<8位随机十六进制>`
pub fn new_job_id() -> String {
    job_id_at(chrono::Utc::now().timestamp_millis())
}

pub fn job_id_at(created_millis: i64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("job_{}_{}", created_millis, &suffix[..8])
}

pub fn parse_job_timestamp(job_id: &str) -> Option<i64> {
    let mut parts = job_id.split('_');
    match (parts.next(), parts.next()) {
        (Some("job"), Some(ts)) => ts.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_rounds_to_nearest_percent() {
        assert_eq!(BatchProgress::new(1, 3).percentage, 33);
        assert_eq!(BatchProgress::new(2, 3).percentage, 67);
        assert_eq!(BatchProgress::new(12, 12).percentage, 100);
        assert_eq!(BatchProgress::new(0, 0).percentage, 100);
    }

    #[test]
    fn progress_never_exceeds_total() {
        let progress = BatchProgress::new(15, 12);
        assert_eq!(progress.processed, 12);
        assert_eq!(progress.percentage, 100);
    }

    #[test]
    fn job_id_embeds_creation_time() {
        let id = job_id_at(1_700_000_000_123);
        assert!(id.starts_with("job_1700000000123_"));
        assert_eq!(parse_job_timestamp(&id), Some(1_700_000_000_123));
        assert_eq!(parse_job_timestamp("batch-42"), None);
    }

    #[test]
    fn display_names_fall_back_to_reference_basename() {
        let mut record = ComparisonRecord::new(1, "https://api/x/get-pdf-file/INV-001", "INV-002");
        assert_eq!(record.old_display_name(), "INV-001");
        assert_eq!(record.new_display_name(), "INV-002");
        record.old_name = Some("Oud".to_string());
        assert_eq!(record.old_display_name(), "Oud");
    }

    #[test]
    fn results_only_exposed_once_completed() {
        let mut job = BatchJob::new("job_1_abcdef12", 2);
        assert!(job.view().results.is_none());
        job.status = JobStatus::Completed;
        assert_eq!(job.view().results, Some(Vec::new()));
    }
}
