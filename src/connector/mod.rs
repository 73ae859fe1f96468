// ABOUTME: Bridge to externally hosted translation connector services
// ABOUTME: Separate lifecycle and authentication from content service jobs

pub mod client;
pub mod models;
pub mod record;

pub use client::{ConnectorClient, ConnectorWait};
pub use models::{ConnectorConnection, ConnectorJob, ConnectorStatus};
pub use record::{file_stem, ConnectorJobRecord, RecordStatus, RecordStore};
