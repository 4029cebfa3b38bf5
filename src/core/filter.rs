//! The filter stage: output determination for an inbound document.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ForwardingConfig;
use crate::repository::EventSink;

use super::matching::{matches_event, matches_header};
use super::{PipelineContext, PipelineError, PipelineStage};

/// Evaluates every inbound event (and the header, if present) against one
/// named criteria record, collecting matches on the context in encounter
/// order.
///
/// The resolved criteria is always published to the context first, so
/// downstream stages can reach the endpoint and credential even when
/// nothing matched. Each event is also recorded to the ingestion sink
/// unless the stage runs in match-only mode.
pub struct FilterStage {
    config: Arc<ForwardingConfig>,
    criteria_name: String,
    sink: Option<Arc<dyn EventSink>>,
    skip_ingest: bool,
}

impl FilterStage {
    pub fn new(config: Arc<ForwardingConfig>, criteria_name: impl Into<String>) -> Self {
        Self {
            config,
            criteria_name: criteria_name.into(),
            sink: None,
            skip_ingest: false,
        }
    }

    /// Record inbound events to the given sink as a side effect of
    /// filtering.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Match-only mode: skip the ingestion side effect entirely.
    pub fn skip_ingest(mut self, skip: bool) -> Self {
        self.skip_ingest = skip;
        self
    }
}

#[async_trait]
impl PipelineStage for FilterStage {
    fn name(&self) -> &'static str {
        "filter"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let resolved = self.config.resolve(&self.criteria_name).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "criteria {} could not be found",
                self.criteria_name
            ))
        })?;
        debug!(criteria = %resolved.criteria.name, endpoint = %resolved.endpoint.name,
               "resolved output criteria");
        ctx.matched_criteria = Some(resolved.clone());

        if ctx.document.events.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        if let Some(header) = &ctx.document.header {
            if matches_header(header, &resolved.criteria) {
                debug!("document header matched");
                ctx.header_matched = true;
            }
        }

        for event in &ctx.document.events {
            if !self.skip_ingest {
                if let Some(sink) = &self.sink {
                    sink.record(event).await?;
                }
            }
            if matches_event(event, &resolved.criteria) {
                ctx.filtered_events.push(event.clone());
            }
        }

        info!(
            matched = ctx.filtered_events.len(),
            total = ctx.document.events.len(),
            header_matched = ctx.header_matched,
            "filtering complete"
        );
        Ok(())
    }
}
