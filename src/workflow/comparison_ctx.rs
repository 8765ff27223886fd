//! 比对上下文
//!
//! 封装"我正在处理清单中的第几组文档"这一信息，只用于日志前缀

use std::fmt::Display;

use crate::models::job::ComparisonRecord;

#[derive(Debug, Clone)]
pub struct RecordCtx {
    /// 清单序号（从1开始）
    pub sequence_number: usize,
    pub old_name: String,
    pub new_name: String,
}

impl RecordCtx {
    pub fn new(record: &ComparisonRecord) -> Self {
        Self {
            sequence_number: record.sequence_number,
            old_name: record.old_display_name(),
            new_name: record.new_display_name(),
        }
    }
}

impl Display for RecordCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[记录 #{} {} ⇄ {}]",
            self.sequence_number, self.old_name, self.new_name
        )
    }
}
