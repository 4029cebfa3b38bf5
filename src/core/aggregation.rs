//! Pack/unpack history lookup for the filtered events.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::{Epc, EpcisEvent};
use crate::repository::EventRepository;

use super::{PipelineContext, PipelineError, PipelineStage};

/// Collects the full aggregation history (every pack and unpack event)
/// touching the EPCs named in the filtered events, in event-time order.
///
/// Seeding follows the same rule as commissioning expansion: object and
/// transaction events contribute their EPCs (and transaction parent);
/// aggregation and transformation events are skipped with a warning.
pub struct AggregationHistoryStage {
    repository: Arc<dyn EventRepository>,
}

impl AggregationHistoryStage {
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl PipelineStage for AggregationHistoryStage {
    fn name(&self) -> &'static str {
        "aggregation-history"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let mut seen = HashSet::new();
        let mut seeds: Vec<Epc> = Vec::new();
        for event in &ctx.filtered_events {
            match event {
                EpcisEvent::Aggregation(_) | EpcisEvent::Transformation(_) => {
                    warn!(
                        stage = self.name(),
                        event_type = %event.event_type(),
                        "skipping event: only transaction and object events can seed this stage"
                    );
                }
                EpcisEvent::Object(object) => {
                    for epc in &object.epc_list {
                        if seen.insert(epc.clone()) {
                            seeds.push(epc.clone());
                        }
                    }
                }
                EpcisEvent::Transaction(transaction) => {
                    for epc in transaction
                        .epc_list
                        .iter()
                        .chain(transaction.parent_id.iter())
                    {
                        if seen.insert(epc.clone()) {
                            seeds.push(epc.clone());
                        }
                    }
                }
            }
        }

        if seeds.is_empty() {
            debug!("no seed EPCs; no aggregation history to collect");
            ctx.aggregation_events.clear();
            return Ok(());
        }

        let history = self.repository.aggregation_history(&seeds).await?;
        debug!(seeds = seeds.len(), events = history.len(), "aggregation history collected");
        ctx.aggregation_events = history;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Action, AggregationEvent, Document, EventBase, ObjectEvent, TransactionEvent,
    };
    use crate::repository::{EventSink, InMemoryRepository};
    use chrono::{Duration, Utc};

    fn base_at(offset: i64) -> EventBase {
        EventBase {
            event_time: Utc::now() + Duration::seconds(offset),
            biz_step: None,
            disposition: None,
            read_point: None,
            biz_location: None,
            source_list: vec![],
            destination_list: vec![],
        }
    }

    #[tokio::test]
    async fn test_history_includes_pack_and_unpack_in_time_order() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.record(&EpcisEvent::Object(ObjectEvent {
            base: base_at(0),
            action: Action::Add,
            epc_list: vec!["item1".to_string(), "case1".to_string()],
        }))
        .await
        .unwrap();
        repo.record(&EpcisEvent::Aggregation(AggregationEvent {
            base: base_at(10),
            action: Action::Add,
            parent_id: Some("case1".to_string()),
            child_epcs: vec!["item1".to_string()],
        }))
        .await
        .unwrap();
        repo.record(&EpcisEvent::Aggregation(AggregationEvent {
            base: base_at(20),
            action: Action::Delete,
            parent_id: Some("case1".to_string()),
            child_epcs: vec!["item1".to_string()],
        }))
        .await
        .unwrap();

        let stage = AggregationHistoryStage::new(repo);
        let mut ctx = PipelineContext::new(Document::new(vec![]));
        ctx.filtered_events = vec![EpcisEvent::Transaction(TransactionEvent {
            base: base_at(30),
            action: Action::Add,
            parent_id: None,
            epc_list: vec!["item1".to_string()],
        })];

        stage.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.aggregation_events.len(), 2);
        assert_eq!(ctx.aggregation_events[0].action(), Some(Action::Add));
        assert_eq!(ctx.aggregation_events[1].action(), Some(Action::Delete));
    }

    #[tokio::test]
    async fn test_no_seeds_leaves_history_empty() {
        let repo = Arc::new(InMemoryRepository::new());
        let stage = AggregationHistoryStage::new(repo);
        let mut ctx = PipelineContext::new(Document::new(vec![]));

        stage.execute(&mut ctx).await.unwrap();
        assert!(ctx.aggregation_events.is_empty());
    }
}
