//! 应用入口：组装各层并提供命令行使用的操作

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::ConfiguredSource;
use crate::models::field::FieldRuleSet;
use crate::models::job::{ComparisonRecord, JobStatusView};
use crate::models::outcome::{ComparisonDetail, ComparisonSummary, OverallResult};
use crate::models::{load_batch_manifest, load_field_rules};
use crate::orchestrator::BatchOrchestrator;
use crate::services::DocumentRegions;
use crate::stores::{FileResultStore, FileStatusStore, ResultStore, StatusStore};
use crate::utils::logging;
use crate::workflow::ComparisonFlow;

/// 应用主结构
pub struct App {
    config: Config,
    flow: Arc<ComparisonFlow<ConfiguredSource>>,
    orchestrator: BatchOrchestrator<ConfiguredSource>,
    results: Arc<dyn ResultStore>,
    status: Arc<dyn StatusStore>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let settings = config.batch_settings();
        logging::log_startup(settings.max_concurrent, settings.chunk_size);

        let rules = match &config.field_rules_file {
            Some(path) => load_field_rules(Path::new(path)).await?,
            None => {
                info!("📋 使用内置特殊字段规则");
                FieldRuleSet::invoice_defaults()
            }
        };

        let results: Arc<dyn ResultStore> = Arc::new(FileResultStore::open(config.results_dir())?);
        let status: Arc<dyn StatusStore> = Arc::new(
            FileStatusStore::open(
                config.status_snapshot_path(),
                config.status_flush_interval(),
                config.job_retention(),
            )
            .await?,
        );

        let source = Arc::new(ConfiguredSource::from_config(&config)?);
        let flow = Arc::new(ComparisonFlow::from_config(
            &config,
            source,
            Arc::new(rules),
            results.clone(),
        ));
        let orchestrator = BatchOrchestrator::new(settings, flow.clone(), status.clone());

        Ok(Self {
            config,
            flow,
            orchestrator,
            results,
            status,
        })
    }

    /// 运行批处理清单，未指定时使用配置中的清单
    pub async fn run(&self, manifest: Option<PathBuf>) -> Result<Vec<ComparisonSummary>> {
        let manifest = manifest.unwrap_or_else(|| PathBuf::from(&self.config.batch_manifest));
        info!("📁 正在读取清单 {}", manifest.display());
        let records = load_batch_manifest(&manifest).await?;

        if records.is_empty() {
            warn!("⚠️ 清单中没有待比对的记录，程序结束");
            return Ok(Vec::new());
        }

        let total = records.len();
        logging::log_records_loaded(total, self.orchestrator.settings().max_concurrent);

        let handle = self.orchestrator.submit(records, None)?;
        info!("🆔 任务ID: {}", handle.job_id);
        let summaries = handle.wait().await?;

        let count = |result: OverallResult| {
            summaries
                .iter()
                .filter(|s| s.overall_result == result)
                .count()
        };
        logging::print_final_stats(
            count(OverallResult::Pass),
            count(OverallResult::Fail),
            count(OverallResult::Error),
            total,
        );

        if let Err(e) = self.status.flush() {
            warn!("⚠️ 任务快照写入失败: {}", e);
        }

        Ok(summaries)
    }

    /// 比对单组文档
    pub async fn compare_pair(&self, old_ref: &str, new_ref: &str) -> AppResult<ComparisonSummary> {
        self.flow.run(&ComparisonRecord::new(1, old_ref, new_ref)).await
    }

    /// 预览用的差异区域
    pub async fn difference_regions(&self, old_ref: &str, new_ref: &str) -> AppResult<DocumentRegions> {
        self.flow
            .regions(&ComparisonRecord::new(1, old_ref, new_ref))
            .await
    }

    pub fn comparison_detail(&self, id: &str) -> AppResult<ComparisonDetail> {
        self.results.get(id)
    }

    pub fn job_status(&self, job_id: &str) -> AppResult<JobStatusView> {
        self.orchestrator.job_status(job_id)
    }
}
