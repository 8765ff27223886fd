//! 业务能力层（Services Layer）
//!
//! 每个服务只做一件事，不关心批处理和持久化：
//!
//! - `extractor`：PDF 字节 → 带坐标的片段 + 特殊字段定位
//! - `line_assembler`：片段 → 逻辑行
//! - `field_rules`：单个特殊字段的策略判定
//! - `comparator`：整份文档的比对
//! - `regions`：预览用的差异矩形

pub mod comparator;
pub mod extractor;
pub mod field_rules;
pub mod line_assembler;
pub mod regions;

pub use comparator::{CompareSettings, Comparator, ComparisonReport};
pub use extractor::DocumentExtractor;
pub use field_rules::evaluate_field;
pub use line_assembler::assemble_lines;
pub use regions::{diff_regions, DocumentRegions, Region, RegionKind};
