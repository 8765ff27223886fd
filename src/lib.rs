//! # Invoice Parity
//!
//! 批量比对新旧两版发票 PDF，检查重新生成的发票与原发票是否一致
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 只暴露"取文档字节"的能力
//! - `DocumentSource` - HTTP / 本地目录两种实现，带超时和大小上限
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 只处理一份或一组文档
//! - `DocumentExtractor` - PDF → 带坐标的片段 + 特殊字段定位
//! - `Comparator` - 页面对齐 → 特殊字段 → 剩余行
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一组新旧发票"的完整处理流程
//! - `ComparisonFlow` - 下载 → 解析 → 比对 → 保存
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 分块、并发控制、进度上报
//!
//! ### 存储（Stores）
//! - `ResultStore` - 不可变的比对明细
//! - `StatusStore` - 批处理任务状态，合并写盘、可恢复

pub mod app;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod stores;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{ConfiguredSource, DocumentSource, FileDocumentSource, HttpDocumentSource};
pub use models::{
    BatchJob, BatchProgress, ComparisonDetail, ComparisonRecord, ComparisonSummary, FieldRuleSet,
    JobStatus, JobStatusView, OverallResult, ParsedDocument,
};
pub use orchestrator::{BatchHandle, BatchOrchestrator, BatchSettings};
pub use services::{Comparator, CompareSettings, DocumentExtractor};
pub use stores::{FileResultStore, FileStatusStore, MemoryResultStore, MemoryStatusStore, ResultStore, StatusStore};
pub use workflow::ComparisonFlow;
