//! Pipeline core: stage trait, run context, matching, enrichment, and
//! delivery task handling.

pub mod aggregation;
pub mod assemble;
pub mod context;
pub mod filter;
pub mod hierarchy;
pub mod matching;
pub mod runner;
pub mod tasks;

use async_trait::async_trait;
use thiserror::Error;

use crate::repository::RepositoryError;
use crate::transport::TransportError;

pub use aggregation::AggregationHistoryStage;
pub use assemble::{AssembleStage, EventListDocument, JsonRenderer, PayloadRenderer};
pub use context::PipelineContext;
pub use filter::FilterStage;
pub use hierarchy::{CommissioningExpandStage, CommissioningFetchStage};
pub use runner::{PauseStage, PipelineRunner, RunSettings};
pub use tasks::{deliver_task, spawn_delivery, DeliveryTask, DispatchStage, TaskStatus, TaskStore};

/// Errors that abort a pipeline run.
///
/// Configuration and protocol-level failures are fatal for the run;
/// per-event structural anomalies are handled inside the stages with a
/// warning so the rest of the batch keeps moving.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no events found in the inbound document")]
    EmptyInput,

    #[error("expected context value missing: {0}")]
    MissingContext(&'static str),

    #[error("unsupported event in {stage}: {reason}")]
    UnsupportedEvent { stage: &'static str, reason: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to render outbound payload: {0}")]
    Render(#[source] anyhow::Error),
}

/// One stage of a pipeline run. Stages execute sequentially and
/// communicate exclusively through the shared [`PipelineContext`].
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Stage name, used in logs and error reports.
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError>;
}
