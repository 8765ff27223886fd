//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度：
//!
//! - 为批次登记任务并上报进度
//! - 控制并发数量（Semaphore）
//! - 把单条记录的失败隔离在记录边界
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<ComparisonRecord>)
//!     ↓
//! workflow::ComparisonFlow (处理单组新旧文档)
//!     ↓
//! services (能力层：extractor / comparator / field_rules)
//!     ↓
//! infrastructure (基础设施：DocumentSource)
//! ```

pub mod batch_processor;

pub use batch_processor::{BatchHandle, BatchOrchestrator, BatchSettings};
