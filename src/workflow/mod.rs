pub mod comparison_ctx;
pub mod comparison_flow;

pub use comparison_ctx::RecordCtx;
pub use comparison_flow::ComparisonFlow;
