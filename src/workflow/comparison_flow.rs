//! 单组比对流程 - 流程层
//!
//! 核心职责：定义"一组新旧发票"的完整处理流程
//!
//! 流程顺序：
//! 1. 并发下载新旧文档（带墙钟超时）
//! 2. 在阻塞线程池中解析 PDF、比对并保存完整结果
//! 3. 返回摘要

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult, DownloadError};
use crate::infrastructure::DocumentSource;
use crate::models::field::FieldRuleSet;
use crate::models::job::ComparisonRecord;
use crate::models::outcome::{ComparisonOutcome, ComparisonSummary};
use crate::models::ParsedDocument;
use crate::services::{diff_regions, Comparator, CompareSettings, DocumentExtractor, DocumentRegions};
use crate::stores::ResultStore;
use crate::utils::truncate_text;
use crate::workflow::comparison_ctx::RecordCtx;

/// 单组比对流程
///
/// - 不关心批次和并发，只处理一条记录
/// - 出错直接返回 Err，由编排层在记录边界转换为 Error 结果
pub struct ComparisonFlow<S: DocumentSource> {
    source: Arc<S>,
    extractor: Arc<DocumentExtractor>,
    comparator: Arc<Comparator>,
    results: Arc<dyn ResultStore>,
    fetch_timeout: Duration,
    verbose_logging: bool,
}

impl<S: DocumentSource> ComparisonFlow<S> {
    pub fn new(
        source: Arc<S>,
        rules: Arc<FieldRuleSet>,
        settings: CompareSettings,
        results: Arc<dyn ResultStore>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            extractor: Arc::new(DocumentExtractor::new(rules.clone())),
            comparator: Arc::new(Comparator::new(rules, settings)),
            results,
            fetch_timeout,
            verbose_logging: false,
        }
    }

    pub fn from_config(
        config: &Config,
        source: Arc<S>,
        rules: Arc<FieldRuleSet>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        let mut flow = Self::new(
            source,
            rules,
            config.compare_settings(),
            results,
            config.download_timeout(),
        );
        flow.verbose_logging = config.verbose_logging;
        flow
    }

    pub async fn run(&self, record: &ComparisonRecord) -> AppResult<ComparisonSummary> {
        let ctx = RecordCtx::new(record);
        let started = Instant::now();

        // ========== 步骤 1: 下载 ==========
        let (old_bytes, new_bytes) = self.fetch_pair(record, &ctx).await?;

        // ========== 步骤 2: 解析 + 比对 + 保存 ==========
        let extractor = self.extractor.clone();
        let comparator = self.comparator.clone();
        let results = self.results.clone();
        let old_ref = record.old_ref.clone();
        let new_ref = record.new_ref.clone();
        let old_file_name = ctx.old_name.clone();
        let new_file_name = ctx.new_name.clone();
        let (id, outcome) = tokio::task::spawn_blocking(move || -> AppResult<_> {
            let old = extractor.extract(&old_bytes)?;
            let new = extractor.extract(&new_bytes)?;
            let report = comparator.compare(&old, &new);

            let outcome = ComparisonOutcome {
                overall_result: report.overall_result,
                verdicts: report.verdicts,
                execution_time_ms: started.elapsed().as_millis() as u64,
                old_ref,
                new_ref,
                old_file_name,
                new_file_name,
                error: None,
            };
            let id = results.save(&outcome)?;
            Ok((id, outcome))
        })
        .await??;

        if self.verbose_logging {
            for verdict in outcome.verdicts.iter().filter(|v| v.is_fail()) {
                debug!(
                    "{} ✗ {} | {} → {}",
                    ctx,
                    verdict.key,
                    truncate_text(&verdict.old_value, 40),
                    truncate_text(&verdict.new_value, 40)
                );
            }
        }

        info!(
            "{} ✓ {} ({} 项不一致, {}ms)",
            ctx,
            outcome.overall_result,
            outcome.fail_count(),
            outcome.execution_time_ms
        );

        Ok(ComparisonSummary::from_outcome(
            record.sequence_number,
            Some(id),
            &outcome,
        ))
    }

    /// 计算预览用的差异区域
    pub async fn regions(&self, record: &ComparisonRecord) -> AppResult<DocumentRegions> {
        let ctx = RecordCtx::new(record);
        let (old_bytes, new_bytes) = self.fetch_pair(record, &ctx).await?;
        let extractor = self.extractor.clone();
        let regions = tokio::task::spawn_blocking(move || -> AppResult<_> {
            let old: ParsedDocument = extractor.extract(&old_bytes)?;
            let new: ParsedDocument = extractor.extract(&new_bytes)?;
            Ok(diff_regions(&old, &new))
        })
        .await??;
        Ok(regions)
    }

    async fn fetch_pair(
        &self,
        record: &ComparisonRecord,
        ctx: &RecordCtx,
    ) -> AppResult<(Vec<u8>, Vec<u8>)> {
        debug!("{} 开始下载新旧文档", ctx);
        let (old_bytes, new_bytes) =
            tokio::try_join!(self.fetch(&record.old_ref), self.fetch(&record.new_ref))?;
        debug!(
            "{} 下载完成: {} / {} 字节",
            ctx,
            old_bytes.len(),
            new_bytes.len()
        );
        Ok((old_bytes, new_bytes))
    }

    async fn fetch(&self, reference: &str) -> AppResult<Vec<u8>> {
        match tokio::time::timeout(self.fetch_timeout, self.source.fetch(reference)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Download(DownloadError::Timeout {
                source_ref: reference.to_string(),
                timeout_ms: self.fetch_timeout.as_millis() as u64,
            })),
        }
    }
}
