pub mod catalog;
pub mod config;
pub mod job;
pub mod wire;

pub use catalog::{CatalogEntry, CatalogPage, CatalogQuery, ClearCategory};
pub use config::ClientConfig;
pub use job::{
    EmbeddingResult, ExecutionId, Job, JobIds, JobKind, JobResult, JobSource, JobStatus,
    Observation, ProgressMeta, RecordId, SearchHit, SearchResult,
};
