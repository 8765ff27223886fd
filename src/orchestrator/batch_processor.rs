//! 批量比对处理器 - 编排层
//!
//! ## 职责
//!
//! 1. **任务登记**：为每个批次创建 Processing 状态的任务
//! 2. **并发控制**：使用 Semaphore 限制同时比对的数量
//! 3. **分块处理**：按块调度记录，每块完成后上报一次进度
//! 4. **故障隔离**：单条记录的错误、panic 都在记录边界转换为 Error 结果
//!
//! 不处理单条记录的细节，委托 `ComparisonFlow` 完成。

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::DocumentSource;
use crate::models::job::{new_job_id, BatchJob, BatchProgress, ComparisonRecord, JobStatus, JobStatusView};
use crate::models::outcome::ComparisonSummary;
use crate::stores::StatusStore;
use crate::utils::logging::{log_chunk_complete, log_chunk_start};
use crate::workflow::{ComparisonFlow, RecordCtx};

/// 并发与分块参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// 同时进行的比对数量
    pub max_concurrent: usize,
    /// 每个进度块的记录数
    pub chunk_size: usize,
}

impl BatchSettings {
    /// 0 会被提升为 1
    pub fn new(max_concurrent: usize, chunk_size: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::new(5, 10)
    }
}

/// 已提交批次的句柄
pub struct BatchHandle {
    pub job_id: String,
    join: JoinHandle<Vec<ComparisonSummary>>,
}

impl BatchHandle {
    /// 等待批次结束，返回按输入顺序排列的摘要
    pub async fn wait(self) -> AppResult<Vec<ComparisonSummary>> {
        self.join.await.map_err(AppError::from)
    }
}

/// 批量比对编排器
pub struct BatchOrchestrator<S: DocumentSource> {
    settings: BatchSettings,
    flow: Arc<ComparisonFlow<S>>,
    status: Arc<dyn StatusStore>,
    semaphore: Arc<Semaphore>,
}

impl<S: DocumentSource> Clone for BatchOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings,
            flow: self.flow.clone(),
            status: self.status.clone(),
            semaphore: self.semaphore.clone(),
        }
    }
}

impl<S: DocumentSource> BatchOrchestrator<S> {
    pub fn new(
        settings: BatchSettings,
        flow: Arc<ComparisonFlow<S>>,
        status: Arc<dyn StatusStore>,
    ) -> Self {
        Self {
            settings,
            flow,
            status,
            semaphore: Arc::new(Semaphore::new(settings.max_concurrent)),
        }
    }

    pub fn settings(&self) -> BatchSettings {
        self.settings
    }

    /// 登记任务并在后台开始处理
    pub fn submit(
        &self,
        records: Vec<ComparisonRecord>,
        input_path: Option<String>,
    ) -> AppResult<BatchHandle> {
        let job_id = new_job_id();
        let job = BatchJob::new(&job_id, records.len()).with_input_path(input_path);
        self.status.insert(job)?;
        info!("🆕 已创建任务 {} ({} 组记录)", job_id, records.len());

        let this = self.clone();
        let id = job_id.clone();
        let join = tokio::spawn(async move { this.run_job(&id, records).await });

        Ok(BatchHandle { job_id, join })
    }

    /// 处理一个已登记的任务，结束时将其标记为 Completed
    pub async fn run_job(&self, job_id: &str, records: Vec<ComparisonRecord>) -> Vec<ComparisonSummary> {
        let status = self.status.clone();

        let summaries = self
            .process_records(records, |progress, chunk| {
                if let Err(e) = status.record_progress(job_id, progress, chunk.to_vec()) {
                    error!("❌ 任务 {} 进度更新失败: {}", job_id, e);
                }
                match status.get(job_id) {
                    Ok(job) if job.status == JobStatus::Processing => ControlFlow::Continue(()),
                    Ok(job) => {
                        warn!("⚠️ 任务 {} 已变为 {}，停止调度剩余记录", job_id, job.status);
                        ControlFlow::Break(())
                    }
                    Err(e) => {
                        warn!("⚠️ 无法读取任务 {} 状态，停止调度: {}", job_id, e);
                        ControlFlow::Break(())
                    }
                }
            })
            .await;

        if let Err(e) = self.status.complete(job_id) {
            error!("❌ 任务 {} 无法标记完成: {}", job_id, e);
        }
        summaries
    }

    /// 分块处理所有记录
    ///
    /// 每块结束后调用 `on_chunk(累计进度, 本块摘要)`，返回 `Break` 时不再调度后续块。
    /// 每条被调度的记录恰好产生一条摘要，顺序与输入一致。
    pub async fn process_records<F>(
        &self,
        records: Vec<ComparisonRecord>,
        mut on_chunk: F,
    ) -> Vec<ComparisonSummary>
    where
        F: FnMut(BatchProgress, &[ComparisonSummary]) -> ControlFlow<()>,
    {
        let total = records.len();
        let chunk_size = self.settings.chunk_size;
        let total_chunks = total.div_ceil(chunk_size);
        let mut summaries = Vec::with_capacity(total);

        for (chunk_index, chunk) in records.chunks(chunk_size).enumerate() {
            let chunk_num = chunk_index + 1;
            let chunk_start = chunk_index * chunk_size;
            log_chunk_start(chunk_num, total_chunks, chunk_start + 1, chunk_start + chunk.len(), total);

            let chunk_summaries = self.process_chunk(chunk).await;
            summaries.extend(chunk_summaries.iter().cloned());

            let progress = BatchProgress::new(summaries.len(), total);
            log_chunk_complete(chunk_num, progress.processed, total, progress.percentage);

            if on_chunk(progress, &chunk_summaries).is_break() {
                break;
            }
        }

        summaries
    }

    /// 处理单个块
    async fn process_chunk(&self, chunk: &[ComparisonRecord]) -> Vec<ComparisonSummary> {
        let mut handles = Vec::with_capacity(chunk.len());

        // 为本块创建并发任务
        for record in chunk {
            let started = Instant::now();
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    handles.push((record.clone(), started, None));
                    error!("{} ❌ 无法获取并发许可: {}", RecordCtx::new(record), e);
                    continue;
                }
            };

            let flow = self.flow.clone();
            let task_record = record.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                match flow.run(&task_record).await {
                    Ok(summary) => summary,
                    Err(e) => {
                        error!("{} ❌ 比对失败: {}", RecordCtx::new(&task_record), e);
                        ComparisonSummary::errored(&task_record, e.to_string(), elapsed_ms(started))
                    }
                }
            });
            handles.push((record.clone(), started, Some(handle)));
        }

        // 等待本块所有任务完成，结果保持输入顺序
        join_all(handles.into_iter().map(|(record, started, handle)| async move {
            match handle {
                Some(handle) => match handle.await {
                    Ok(summary) => summary,
                    Err(e) => {
                        error!("{} 任务执行失败: {}", RecordCtx::new(&record), e);
                        let err = AppError::from(e);
                        ComparisonSummary::errored(&record, err.to_string(), elapsed_ms(started))
                    }
                },
                None => ComparisonSummary::errored(
                    &record,
                    AppError::TaskFailed("并发许可已关闭".to_string()).to_string(),
                    elapsed_ms(started),
                ),
            }
        }))
        .await
    }

    /// 管理员重启：只有处理中的任务可以重启
    pub fn restart(&self, job_id: &str) -> AppResult<()> {
        self.status.restart(job_id)?;
        warn!("🔁 任务 {} 已被重启，正在运行的记录不会被中断", job_id);
        Ok(())
    }

    pub fn job_status(&self, job_id: &str) -> AppResult<JobStatusView> {
        self.status.status_view(job_id)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
