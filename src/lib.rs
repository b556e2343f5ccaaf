//! Client-side orchestration for asynchronous embedding jobs: submission,
//! status polling, a reconciled job registry, notifications and catalog
//! management, plus the `ejobs` command line front end.

pub mod api;
pub mod cli;
pub mod clock;
pub mod coalesce;
pub mod errors;
pub mod events;
pub mod models;
pub mod notify;
pub mod poller;
pub mod registry;
pub mod service;
pub mod submit;

pub use api::{ApiError, HttpJobsApi, JobsApi};
pub use errors::JobError;
pub use events::RegistryEvent;
pub use registry::{JobFilter, JobRegistry};
pub use service::{JobService, TrackedJob};
pub use submit::SubmitPayload;
