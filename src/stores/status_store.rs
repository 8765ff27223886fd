//! 批处理任务状态存储
//!
//! 生命周期只能单向流转：Processing → Completed | Error。
//! 所有状态变更都集中在 [`JobTable`] 中，两种存储实现共用同一套规则。
//!
//! 文件实现会把任务表以 JSON 快照的形式落盘。频繁的进度更新不会逐次写盘，
//! 而是唤醒后台任务，在一个合并间隔后统一写一次。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::job::{BatchJob, BatchProgress, JobStatus, JobStatusView};
use crate::models::outcome::ComparisonSummary;

pub const RESTART_MESSAGE: &str = "restarted by administrator";
pub const INTERRUPTED_MESSAGE: &str = "interrupted by process restart";

const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 3600);

pub trait StatusStore: Send + Sync {
    fn insert(&self, job: BatchJob) -> AppResult<()>;

    fn get(&self, job_id: &str) -> AppResult<BatchJob>;

    fn status_view(&self, job_id: &str) -> AppResult<JobStatusView> {
        self.get(job_id).map(|job| job.view())
    }

    /// 追加一个进度块的结果，计数只增不减
    fn record_progress(
        &self,
        job_id: &str,
        progress: BatchProgress,
        results: Vec<ComparisonSummary>,
    ) -> AppResult<()>;

    fn complete(&self, job_id: &str) -> AppResult<()>;

    fn fail(&self, job_id: &str, message: &str) -> AppResult<()>;

    /// 管理员重启：处理中的任务标记为 Error，其他状态返回 RestartConflict
    fn restart(&self, job_id: &str) -> AppResult<()>;

    /// 清理过期任务，返回被清理的任务
    fn evict_stale(&self, now_millis: i64) -> AppResult<Vec<BatchJob>>;

    fn flush(&self) -> AppResult<()>;
}

/// 任务表：所有生命周期规则的唯一实现
#[derive(Debug, Clone, Default)]
pub struct JobTable {
    jobs: BTreeMap<String, BatchJob>,
}

impl JobTable {
    pub fn from_jobs(jobs: Vec<BatchJob>) -> Self {
        Self {
            jobs: jobs.into_iter().map(|job| (job.id.clone(), job)).collect(),
        }
    }

    pub fn snapshot(&self) -> Vec<BatchJob> {
        self.jobs.values().cloned().collect()
    }

    pub fn insert(&mut self, job: BatchJob) {
        self.jobs.insert(job.id.clone(), job);
    }

    pub fn get(&self, job_id: &str) -> AppResult<&BatchJob> {
        self.jobs.get(job_id).ok_or_else(|| not_found(job_id))
    }

    /// 只对处理中的任务执行变更；终态任务的更新被忽略并返回 false
    fn update_active<F>(&mut self, job_id: &str, action: &str, f: F) -> AppResult<bool>
    where
        F: FnOnce(&mut BatchJob),
    {
        let job = self.jobs.get_mut(job_id).ok_or_else(|| not_found(job_id))?;
        if job.status.is_terminal() {
            warn!(
                "⚠️ 任务 {} 已处于 {} 状态，忽略 {} 操作",
                job_id, job.status, action
            );
            return Ok(false);
        }
        f(job);
        Ok(true)
    }

    pub fn record_progress(
        &mut self,
        job_id: &str,
        progress: BatchProgress,
        results: Vec<ComparisonSummary>,
    ) -> AppResult<bool> {
        self.update_active(job_id, "进度更新", |job| {
            let processed = job.processed.max(progress.processed).min(job.total);
            job.processed = processed;
            job.progress_percent = BatchProgress::new(processed, job.total).percentage;
            job.results.extend(results);
        })
    }

    pub fn complete(&mut self, job_id: &str) -> AppResult<bool> {
        self.update_active(job_id, "完成", |job| {
            job.status = JobStatus::Completed;
            job.processed = job.total;
            job.progress_percent = 100;
        })
    }

    pub fn fail(&mut self, job_id: &str, message: &str) -> AppResult<bool> {
        self.update_active(job_id, "标记失败", |job| {
            job.status = JobStatus::Error;
            job.error = Some(message.to_string());
        })
    }

    pub fn restart(&mut self, job_id: &str) -> AppResult<()> {
        let job = self.jobs.get_mut(job_id).ok_or_else(|| not_found(job_id))?;
        if job.status != JobStatus::Processing {
            return Err(AppError::RestartConflict {
                job_id: job_id.to_string(),
                status: job.status.to_string(),
            });
        }
        job.status = JobStatus::Error;
        job.error = Some(RESTART_MESSAGE.to_string());
        Ok(())
    }

    /// 把所有处理中的任务标记为中断，返回受影响的数量
    pub fn interrupt_processing(&mut self) -> usize {
        let mut count = 0;
        for job in self.jobs.values_mut() {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Error;
                job.error = Some(INTERRUPTED_MESSAGE.to_string());
                count += 1;
            }
        }
        count
    }

    /// 移除创建时间早于保留窗口的任务；无法从ID解析出时间的任务同样视为过期
    pub fn evict_stale(&mut self, now_millis: i64, retention: Duration) -> Vec<BatchJob> {
        let retention_millis = retention.as_millis() as i64;
        let stale: Vec<String> = self
            .jobs
            .values()
            .filter(|job| match job.created_at_millis() {
                Some(created) => now_millis.saturating_sub(created) > retention_millis,
                None => true,
            })
            .map(|job| job.id.clone())
            .collect();

        stale
            .iter()
            .filter_map(|id| self.jobs.remove(id))
            .collect()
    }
}

fn not_found(job_id: &str) -> AppError {
    AppError::JobNotFound {
        job_id: job_id.to_string(),
    }
}

fn lock_table(table: &Mutex<JobTable>) -> MutexGuard<'_, JobTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 删除过期任务遗留的输入文件
fn release_inputs(evicted: &[BatchJob]) {
    for job in evicted {
        let Some(path) = job.input_path.as_deref() else {
            continue;
        };
        match fs::remove_file(path) {
            Ok(()) => debug!("已删除过期任务 {} 的输入文件 {}", job.id, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("⚠️ 删除输入文件 {} 失败: {}", path, e),
        }
    }
}

// ========== 内存实现 ==========

pub struct MemoryStatusStore {
    table: Mutex<JobTable>,
    retention: Duration,
}

impl MemoryStatusStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            table: Mutex::new(JobTable::default()),
            retention,
        }
    }
}

impl Default for MemoryStatusStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl StatusStore for MemoryStatusStore {
    fn insert(&self, job: BatchJob) -> AppResult<()> {
        lock_table(&self.table).insert(job);
        Ok(())
    }

    fn get(&self, job_id: &str) -> AppResult<BatchJob> {
        lock_table(&self.table).get(job_id).cloned()
    }

    fn record_progress(
        &self,
        job_id: &str,
        progress: BatchProgress,
        results: Vec<ComparisonSummary>,
    ) -> AppResult<()> {
        lock_table(&self.table).record_progress(job_id, progress, results)?;
        Ok(())
    }

    fn complete(&self, job_id: &str) -> AppResult<()> {
        lock_table(&self.table).complete(job_id)?;
        Ok(())
    }

    fn fail(&self, job_id: &str, message: &str) -> AppResult<()> {
        lock_table(&self.table).fail(job_id, message)?;
        Ok(())
    }

    fn restart(&self, job_id: &str) -> AppResult<()> {
        lock_table(&self.table).restart(job_id)
    }

    fn evict_stale(&self, now_millis: i64) -> AppResult<Vec<BatchJob>> {
        let evicted = lock_table(&self.table).evict_stale(now_millis, self.retention);
        release_inputs(&evicted);
        Ok(evicted)
    }

    fn flush(&self) -> AppResult<()> {
        Ok(())
    }
}

// ========== 文件实现 ==========

struct SnapshotFile {
    path: PathBuf,
    table: Mutex<JobTable>,
    dirty: AtomicBool,
    notify: Notify,
    writes: AtomicUsize,
}

impl SnapshotFile {
    fn mutate<T>(&self, f: impl FnOnce(&mut JobTable) -> AppResult<T>) -> AppResult<T> {
        let value = {
            let mut table = lock_table(&self.table);
            f(&mut table)?
        };
        self.dirty.store(true, Ordering::SeqCst);
        self.notify.notify_one();
        Ok(value)
    }

    /// 有未落盘的变更时写一次快照
    fn write_if_dirty(&self) -> AppResult<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let snapshot = lock_table(&self.table).snapshot();
        if let Err(e) = self.write_snapshot(&snapshot) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write_snapshot(&self, jobs: &[BatchJob]) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::store_io(parent.display().to_string(), e))?;
        }
        let json = serde_json::to_vec_pretty(jobs)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| AppError::store_io(tmp.display().to_string(), e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| AppError::store_io(self.path.display().to_string(), e))?;
        debug!("任务快照已写入 {} ({} 个任务)", self.path.display(), jobs.len());
        Ok(())
    }

    fn flush_logged(&self) {
        if let Err(e) = self.write_if_dirty() {
            error!("❌ 任务快照写入失败，将在下次合并时重试: {}", e);
        }
    }
}

/// 在阻塞线程池中写快照，不占用异步工作线程
async fn flush_in_background(inner: &Arc<SnapshotFile>) {
    let inner = inner.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || inner.flush_logged()).await {
        error!("❌ 快照写盘任务异常退出: {}", e);
    }
}

/// 以 JSON 快照持久化的任务状态存储
pub struct FileStatusStore {
    inner: Arc<SnapshotFile>,
    retention: Duration,
    flusher: JoinHandle<()>,
}

impl FileStatusStore {
    /// 打开快照文件，恢复任务并清理过期项
    ///
    /// 需要在 tokio 运行时内调用（会启动后台落盘任务）
    pub async fn open(
        path: impl Into<PathBuf>,
        flush_interval: Duration,
        retention: Duration,
    ) -> AppResult<Self> {
        let path = path.into();
        let mut table = JobTable::from_jobs(read_snapshot(&path).await);

        let interrupted = table.interrupt_processing();
        if interrupted > 0 {
            warn!("⚠️ {} 个任务在上次运行中被中断，已标记为 Error", interrupted);
        }

        let evicted = table.evict_stale(chrono::Utc::now().timestamp_millis(), retention);
        if !evicted.is_empty() {
            info!("🧹 启动时清理 {} 个过期任务", evicted.len());
            release_inputs(&evicted);
        }

        let inner = Arc::new(SnapshotFile {
            path,
            table: Mutex::new(table),
            dirty: AtomicBool::new(interrupted > 0 || !evicted.is_empty()),
            notify: Notify::new(),
            writes: AtomicUsize::new(0),
        });
        flush_in_background(&inner).await;

        let flusher = tokio::spawn(run_flusher(inner.clone(), flush_interval));

        Ok(Self {
            inner,
            retention,
            flusher,
        })
    }

    /// 快照实际写盘次数
    pub fn snapshot_writes(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }
}

async fn run_flusher(inner: Arc<SnapshotFile>, interval: Duration) {
    loop {
        inner.notify.notified().await;
        tokio::time::sleep(interval).await;
        flush_in_background(&inner).await;
    }
}

async fn read_snapshot(path: &Path) -> Vec<BatchJob> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            error!("❌ 无法读取任务快照 {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    match serde_json::from_slice::<Vec<BatchJob>>(&bytes) {
        Ok(jobs) => {
            info!("📂 从 {} 恢复 {} 个任务", path.display(), jobs.len());
            jobs
        }
        Err(e) => {
            error!("❌ 任务快照 {} 已损坏，以空表启动: {}", path.display(), e);
            Vec::new()
        }
    }
}

impl StatusStore for FileStatusStore {
    fn insert(&self, job: BatchJob) -> AppResult<()> {
        self.inner.mutate(|table| {
            table.insert(job);
            Ok(())
        })
    }

    fn get(&self, job_id: &str) -> AppResult<BatchJob> {
        lock_table(&self.inner.table).get(job_id).cloned()
    }

    fn record_progress(
        &self,
        job_id: &str,
        progress: BatchProgress,
        results: Vec<ComparisonSummary>,
    ) -> AppResult<()> {
        self.inner
            .mutate(|table| table.record_progress(job_id, progress, results))?;
        Ok(())
    }

    fn complete(&self, job_id: &str) -> AppResult<()> {
        self.inner.mutate(|table| table.complete(job_id))?;
        Ok(())
    }

    fn fail(&self, job_id: &str, message: &str) -> AppResult<()> {
        self.inner.mutate(|table| table.fail(job_id, message))?;
        Ok(())
    }

    fn restart(&self, job_id: &str) -> AppResult<()> {
        self.inner.mutate(|table| table.restart(job_id))
    }

    fn evict_stale(&self, now_millis: i64) -> AppResult<Vec<BatchJob>> {
        let evicted = self
            .inner
            .mutate(|table| Ok(table.evict_stale(now_millis, self.retention)))?;
        release_inputs(&evicted);
        Ok(evicted)
    }

    fn flush(&self) -> AppResult<()> {
        self.inner.write_if_dirty()
    }
}

impl Drop for FileStatusStore {
    fn drop(&mut self) {
        self.flusher.abort();
        self.inner.flush_logged();
    }
}
