/// Monitoring engine module - the endpoint health-check engine
///
/// This module is responsible for:
/// - Probing RPC and REST API endpoints
/// - Classifying transport failures into stable error codes
/// - Computing block staleness
/// - Running batches and scheduling them
pub mod block_time;
pub mod checker;
pub mod classify;
pub mod executor;
pub mod runner;
pub mod scheduler;
pub mod types;

pub use executor::ProbeExecutor;
pub use runner::{BatchReport, BatchRunner, RunnerSettings};
pub use scheduler::{BatchJob, Scheduler, SchedulerState};
pub use types::{EndpointKind, EndpointTarget, ProbeError, ProbeResult};
