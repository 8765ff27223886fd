pub mod document;
pub mod field;
pub mod job;
pub mod loaders;
pub mod outcome;

pub use document::{FieldMatch, Line, Page, ParsedDocument, Token};
pub use field::{FieldPolicy, FieldRuleSet, PredicateId, SpecialFieldDefinition};
pub use job::{BatchJob, BatchProgress, ComparisonRecord, JobStatus, JobStatusView};
pub use loaders::{load_batch_manifest, load_field_rules};
pub use outcome::{
    ComparisonDetail, ComparisonOutcome, ComparisonSummary, FieldVerdict, OverallResult,
    VerdictResult,
};
