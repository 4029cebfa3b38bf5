//! Sequential pipeline execution over one shared context.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, instrument};

use crate::config::ForwardingConfig;
use crate::domain::Document;
use crate::repository::{EventRepository, EventSink, InMemoryRepository};
use crate::transport::{DispatchOptions, DispatchRouter, RouterConfig};

use super::{
    AggregationHistoryStage, AssembleStage, CommissioningExpandStage, DispatchStage, FilterStage,
    JsonRenderer, PipelineContext, PipelineError, PipelineStage, TaskStore,
};

/// Longest pause a composed [`PauseStage`] will honor.
const MAX_PAUSE_SECS: u64 = 10;

/// Runs an ordered list of stages against one inbound document. The first
/// stage error aborts the run; the partially populated context is
/// discarded with it.
pub struct PipelineRunner {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl PipelineRunner {
    pub fn new(stages: Vec<Box<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    #[instrument(skip(self, document), fields(stages = self.stages.len()))]
    pub async fn run(&self, document: Document) -> Result<PipelineContext, PipelineError> {
        let mut ctx = PipelineContext::new(document);
        info!(run = %ctx.run_id, events = ctx.document.events.len(), "pipeline run started");

        for stage in &self.stages {
            if let Err(err) = stage.execute(&mut ctx).await {
                error!(run = %ctx.run_id, stage = stage.name(), error = %err, "stage failed");
                return Err(err);
            }
        }

        info!(run = %ctx.run_id, task = ?ctx.created_task, "pipeline run finished");
        Ok(ctx)
    }
}

/// Everything needed to compose the standard forwarding pipeline.
pub struct RunSettings {
    pub config: Arc<ForwardingConfig>,
    pub criteria: String,
    pub repository: Arc<InMemoryRepository>,
    pub store: Arc<TaskStore>,
    pub router: Arc<DispatchRouter>,
    pub options: DispatchOptions,
    pub run_immediately: bool,
    pub skip_ingest: bool,
}

impl RunSettings {
    pub fn new(config: Arc<ForwardingConfig>, criteria: impl Into<String>) -> Self {
        Self {
            config,
            criteria: criteria.into(),
            repository: Arc::new(InMemoryRepository::new()),
            store: Arc::new(TaskStore::new()),
            router: Arc::new(DispatchRouter::new(RouterConfig::default())),
            options: DispatchOptions::default(),
            run_immediately: true,
            skip_ingest: false,
        }
    }

    /// The standard five-stage pipeline: filter, hierarchy expansion,
    /// aggregation history, assembly, dispatch.
    pub fn standard(self) -> PipelineRunner {
        let repository: Arc<dyn EventRepository> = self.repository.clone();
        let sink: Arc<dyn EventSink> = self.repository;
        PipelineRunner::new(vec![
            Box::new(
                FilterStage::new(self.config.clone(), self.criteria)
                    .with_sink(sink)
                    .skip_ingest(self.skip_ingest),
            ),
            Box::new(CommissioningExpandStage::new(repository.clone())),
            Box::new(AggregationHistoryStage::new(repository)),
            Box::new(AssembleStage::new(Arc::new(JsonRenderer))),
            Box::new(
                DispatchStage::new(self.store, self.config, self.router)
                    .options(self.options)
                    .run_immediately(self.run_immediately),
            ),
        ])
    }
}

/// Sleeps for a bounded number of seconds. Useful when a downstream
/// system needs inbound data to settle before the forwarded copy lands.
pub struct PauseStage {
    seconds: u64,
}

impl PauseStage {
    /// Seconds above the cap are clamped, not rejected.
    pub fn new(seconds: u64) -> Self {
        Self {
            seconds: seconds.min(MAX_PAUSE_SECS),
        }
    }
}

#[async_trait]
impl PipelineStage for PauseStage {
    fn name(&self) -> &'static str {
        "pause"
    }

    async fn execute(&self, _ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        tokio::time::sleep(Duration::from_secs(self.seconds)).await;
        Ok(())
    }
}
