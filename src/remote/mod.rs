// ABOUTME: Content service job lifecycle: submission, status decoding, polling and aggregation
// ABOUTME: Every server-executed operation goes through JobClient

pub mod client;
pub mod decode;
pub mod integration;
pub mod kind;
pub mod models;
pub mod reports;

pub use client::{JobClient, JobObserver, JobRun, Terminal};
pub use decode::{decode_columnar, decode_progress, decode_status, decode_status_as};
pub use kind::{JobKind, PublishTarget, Resource};
pub use models::{ArchiveRef, Job, Operation, Progress, StatusSnapshot, Submission};
pub use reports::{extract_reports, extract_validation, ValidationReport};
