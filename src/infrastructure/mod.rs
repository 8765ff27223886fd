//! 基础设施层：只暴露"取文档字节"的能力

pub mod fetcher;

pub use fetcher::{ConfiguredSource, DocumentSource, FileDocumentSource, HttpDocumentSource};
