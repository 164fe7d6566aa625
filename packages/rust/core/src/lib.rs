//! Pipeline orchestration for lexpipe.
//!
//! Ties the stage crates together: the [`PipelineRunner`] sequences
//! acquire → segment → extract → validate → publish for one jurisdiction
//! (with concurrent multi-jurisdiction fan-out), and the batch processor
//! drives persisted jobs through the same stages under a bounded worker
//! pool with retry and progress reporting.

pub mod batch;
mod fetch;
pub mod pipeline;
pub mod publish;

pub use batch::{
    BatchItem, BatchOptions, BatchReport, ErrorKind, ItemOutcome, ItemResult, JobWorker,
    enqueue_and_process, process_batch,
};
pub use pipeline::{PipelineRunner, RunOptions, RunStatus, RunSummary, Stage, StageResult};
pub use publish::{Notifier, PublishOptions, PublishOutcome, publish};
