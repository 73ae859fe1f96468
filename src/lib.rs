// ABOUTME: Client library for long-running content service jobs and the pipelines that chain them
// ABOUTME: Submission, polling, decoding and aggregation live in remote; compound operations in pipeline

pub mod config;
pub mod connector;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod session;
pub mod transport;

pub use config::Config;
pub use error::{JobError, Result};
pub use pipeline::{Outcome, PipelineContext, PipelineReport};
pub use remote::{JobClient, JobKind, Operation, Progress};
pub use session::Session;
pub use transport::{ReqwestTransport, Transport};
