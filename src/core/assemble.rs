//! Outbound payload assembly.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::EpcisEvent;

use super::{PipelineContext, PipelineError, PipelineStage};

/// The outbound document shape: a creation timestamp and a flat event
/// list combining commissioning, aggregation history, and the filtered
/// events themselves.
#[derive(Debug, Clone, Serialize)]
pub struct EventListDocument {
    pub creation_date: DateTime<Utc>,
    pub events: Vec<EpcisEvent>,
}

impl EventListDocument {
    pub fn new(events: Vec<EpcisEvent>) -> Self {
        Self {
            creation_date: Utc::now(),
            events,
        }
    }
}

/// Renders an assembled document into the wire representation.
pub trait PayloadRenderer: Send + Sync {
    fn render(&self, document: &EventListDocument) -> anyhow::Result<String>;

    /// MIME type of the rendered payload.
    fn content_type(&self) -> &'static str;
}

/// Pretty-printed JSON rendering.
pub struct JsonRenderer;

impl PayloadRenderer for JsonRenderer {
    fn render(&self, document: &EventListDocument) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(document)?)
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

/// Combines the enrichment results and the filtered events into one
/// outbound document and renders it onto the context.
///
/// Commissioning events come first, then the aggregation history, then
/// (by default) the filtered events appended at the end. Disabling
/// `append_filtered` drops the filtered events from the document
/// entirely; `prepend_filtered` only applies while appending is enabled.
/// When nothing at all was collected the stage produces no payload and
/// later stages see `outbound_payload` unset.
pub struct AssembleStage {
    renderer: Arc<dyn PayloadRenderer>,
    append_filtered: bool,
    prepend_filtered: bool,
    only_filtered: bool,
}

impl AssembleStage {
    pub fn new(renderer: Arc<dyn PayloadRenderer>) -> Self {
        Self {
            renderer,
            append_filtered: true,
            prepend_filtered: false,
            only_filtered: false,
        }
    }

    /// Whether the filtered events are included in the document at all.
    pub fn append_filtered(mut self, append: bool) -> Self {
        self.append_filtered = append;
        self
    }

    /// Put the filtered events at the front instead of the end. Has no
    /// effect when `append_filtered` is disabled.
    pub fn prepend_filtered(mut self, prepend: bool) -> Self {
        self.prepend_filtered = prepend;
        self
    }

    /// Render only the filtered events, ignoring enrichment results.
    pub fn only_filtered(mut self, only: bool) -> Self {
        self.only_filtered = only;
        self
    }
}

#[async_trait]
impl PipelineStage for AssembleStage {
    fn name(&self) -> &'static str {
        "assemble"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let mut events: Vec<EpcisEvent> = Vec::new();

        if self.only_filtered {
            events.extend(ctx.filtered_events.iter().cloned());
        } else if self.append_filtered {
            if self.prepend_filtered {
                events.extend(ctx.filtered_events.iter().cloned());
            }
            events.extend(ctx.object_events.iter().cloned());
            events.extend(ctx.aggregation_events.iter().cloned());
            if !self.prepend_filtered {
                events.extend(ctx.filtered_events.iter().cloned());
            }
        } else {
            events.extend(ctx.object_events.iter().cloned());
            events.extend(ctx.aggregation_events.iter().cloned());
        }

        if events.is_empty() {
            debug!("nothing to assemble; no outbound payload produced");
            ctx.outbound_payload = None;
            return Ok(());
        }

        let document = EventListDocument::new(events);
        let payload = self
            .renderer
            .render(&document)
            .map_err(PipelineError::Render)?;
        info!(
            events = document.events.len(),
            bytes = payload.len(),
            "outbound payload assembled"
        );
        ctx.outbound_payload = Some(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, Document, EventBase, ObjectEvent};
    use chrono::Utc;

    fn object(epc: &str) -> EpcisEvent {
        EpcisEvent::Object(ObjectEvent {
            base: EventBase {
                event_time: Utc::now(),
                biz_step: None,
                disposition: None,
                read_point: None,
                biz_location: None,
                source_list: vec![],
                destination_list: vec![],
            },
            action: Action::Add,
            epc_list: vec![epc.to_string()],
        })
    }

    #[tokio::test]
    async fn test_filtered_events_appended_last_by_default() {
        let stage = AssembleStage::new(Arc::new(JsonRenderer));
        let mut ctx = PipelineContext::new(Document::new(vec![]));
        ctx.object_events = vec![object("commissioned")];
        ctx.aggregation_events = vec![object("history")];
        ctx.filtered_events = vec![object("shipped")];

        stage.execute(&mut ctx).await.unwrap();
        let payload = ctx.outbound_payload.unwrap();
        let commissioned = payload.find("commissioned").unwrap();
        let history = payload.find("history").unwrap();
        let shipped = payload.find("shipped").unwrap();
        assert!(commissioned < history && history < shipped);
    }

    #[tokio::test]
    async fn test_prepend_puts_filtered_events_first() {
        let stage = AssembleStage::new(Arc::new(JsonRenderer)).prepend_filtered(true);
        let mut ctx = PipelineContext::new(Document::new(vec![]));
        ctx.object_events = vec![object("commissioned")];
        ctx.filtered_events = vec![object("shipped")];

        stage.execute(&mut ctx).await.unwrap();
        let payload = ctx.outbound_payload.unwrap();
        let commissioned = payload.find("commissioned").unwrap();
        let shipped = payload.find("shipped").unwrap();
        assert!(shipped < commissioned);
    }

    #[tokio::test]
    async fn test_append_disabled_drops_filtered_even_with_prepend() {
        // Prepend is subordinate to append: with appending off the
        // filtered events stay out of the document entirely.
        let stage = AssembleStage::new(Arc::new(JsonRenderer))
            .append_filtered(false)
            .prepend_filtered(true);
        let mut ctx = PipelineContext::new(Document::new(vec![]));
        ctx.object_events = vec![object("commissioned")];
        ctx.aggregation_events = vec![object("history")];
        ctx.filtered_events = vec![object("shipped")];

        stage.execute(&mut ctx).await.unwrap();
        let payload = ctx.outbound_payload.unwrap();
        assert!(payload.contains("commissioned"));
        assert!(payload.contains("history"));
        assert!(!payload.contains("shipped"));
    }

    #[tokio::test]
    async fn test_only_filtered_ignores_enrichment() {
        let stage = AssembleStage::new(Arc::new(JsonRenderer)).only_filtered(true);
        let mut ctx = PipelineContext::new(Document::new(vec![]));
        ctx.object_events = vec![object("commissioned")];
        ctx.filtered_events = vec![object("shipped")];

        stage.execute(&mut ctx).await.unwrap();
        let payload = ctx.outbound_payload.unwrap();
        assert!(payload.contains("shipped"));
        assert!(!payload.contains("commissioned"));
    }

    #[tokio::test]
    async fn test_empty_run_produces_no_payload() {
        let stage = AssembleStage::new(Arc::new(JsonRenderer));
        let mut ctx = PipelineContext::new(Document::new(vec![]));

        stage.execute(&mut ctx).await.unwrap();
        assert!(ctx.outbound_payload.is_none());
    }
}
