use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::BatchSettings;
use crate::services::comparator::CompareSettings;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时进行的比对数量（信号量上限）
    pub max_concurrent_comparisons: usize,
    /// 每个进度块包含的记录数
    pub chunk_size: usize,
    /// 单个文档下载的墙钟超时（秒）
    pub download_timeout_secs: u64,
    /// 单个文档的最大字节数
    pub max_download_bytes: u64,
    /// 发票 PDF 接口地址，相对引用会拼接在其后
    pub api_base_url: String,
    /// 本地文档目录，设置后从本地读取而不是走 HTTP
    pub local_document_dir: Option<String>,
    /// 结果与任务快照的存放目录
    pub data_dir: String,
    /// 任务状态落盘的合并间隔（毫秒）
    pub status_flush_interval_ms: u64,
    /// 任务保留时长（小时），超过后启动时清理
    pub job_retention_hours: u64,
    // --- 比对参数 ---
    pub line_y_tolerance: f64,
    pub line_group_precision: f64,
    /// 特殊字段规则文件（TOML），为空时使用内置规则
    pub field_rules_file: Option<String>,
    /// 批处理清单（TOML）
    pub batch_manifest: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_comparisons: 5,
            chunk_size: 10,
            download_timeout_secs: 30,
            max_download_bytes: 50 * 1024 * 1024,
            api_base_url: "https://api.kikker.nl/core/api/Invoice/get-pdf-file".to_string(),
            local_document_dir: None,
            data_dir: "parity_data".to_string(),
            status_flush_interval_ms: 1000,
            job_retention_hours: 24,
            line_y_tolerance: 1.0,
            line_group_precision: 0.1,
            field_rules_file: None,
            batch_manifest: "batch.toml".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_comparisons: std::env::var("MAX_CONCURRENT_COMPARISONS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_comparisons),
            chunk_size: std::env::var("CHUNK_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.chunk_size),
            download_timeout_secs: std::env::var("DOWNLOAD_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.download_timeout_secs),
            max_download_bytes: std::env::var("MAX_DOWNLOAD_BYTES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_download_bytes),
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(default.api_base_url),
            local_document_dir: std::env::var("LOCAL_DOCUMENT_DIR").ok().or(default.local_document_dir),
            data_dir: std::env::var("DATA_DIR").unwrap_or(default.data_dir),
            status_flush_interval_ms: std::env::var("STATUS_FLUSH_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.status_flush_interval_ms),
            job_retention_hours: std::env::var("JOB_RETENTION_HOURS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.job_retention_hours),
            line_y_tolerance: std::env::var("LINE_Y_TOLERANCE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.line_y_tolerance),
            line_group_precision: std::env::var("LINE_GROUP_PRECISION").ok().and_then(|v| v.parse().ok()).unwrap_or(default.line_group_precision),
            field_rules_file: std::env::var("FIELD_RULES_FILE").ok().or(default.field_rules_file),
            batch_manifest: std::env::var("BATCH_MANIFEST").unwrap_or(default.batch_manifest),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn status_flush_interval(&self) -> Duration {
        Duration::from_millis(self.status_flush_interval_ms)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_hours * 3600)
    }

    pub fn results_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("results")
    }

    pub fn status_snapshot_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("jobs.json")
    }

    pub fn compare_settings(&self) -> CompareSettings {
        CompareSettings {
            line_y_tolerance: self.line_y_tolerance,
            line_group_precision: self.line_group_precision,
        }
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings::new(self.max_concurrent_comparisons, self.chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_comparisons, 5);
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.download_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_download_bytes, 52_428_800);
        assert_eq!(config.job_retention(), Duration::from_secs(86_400));
    }

    #[test]
    fn derived_paths_live_under_data_dir() {
        let config = Config {
            data_dir: "/tmp/parity".to_string(),
            ..Config::default()
        };
        assert_eq!(config.results_dir(), PathBuf::from("/tmp/parity/results"));
        assert_eq!(
            config.status_snapshot_path(),
            PathBuf::from("/tmp/parity/jobs.json")
        );
    }
}
