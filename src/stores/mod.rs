//! 存储层：比对结果与批处理任务状态

pub mod result_store;
pub mod status_store;

pub use result_store::{FileResultStore, MemoryResultStore, ResultStore};
pub use status_store::{FileStatusStore, JobTable, MemoryStatusStore, StatusStore};
