//! Commissioning provenance lookup.
//!
//! Two stages share this module. `CommissioningExpandStage` computes the
//! full ancestor/descendant closure over the packing hierarchy so the
//! outbound payload carries the commissioning event of every EPC related
//! to the filtered events. `CommissioningFetchStage` is the cheap variant
//! that looks up commissioning events for exactly the EPCs named in the
//! filtered events, with no hierarchy traversal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::{Action, Entry, Epc, EpcisEvent, EventType};
use crate::repository::EventRepository;

use super::{PipelineContext, PipelineError, PipelineStage};

/// Collect hierarchy seeds from the filtered events. Only object and
/// transaction events contribute; aggregation and transformation events
/// cannot trigger commissioning expansion and are skipped with a warning.
fn collect_seeds(events: &[EpcisEvent], stage: &str) -> Vec<Epc> {
    let mut seen = HashSet::new();
    let mut seeds = Vec::new();
    let mut push = |epc: &Epc| {
        if seen.insert(epc.clone()) {
            seeds.push(epc.clone());
        }
    };

    for event in events {
        match event {
            EpcisEvent::Aggregation(_) | EpcisEvent::Transformation(_) => {
                warn!(
                    stage,
                    event_type = %event.event_type(),
                    "skipping event: only transaction and object events can seed this stage"
                );
            }
            EpcisEvent::Object(object) => {
                object.epc_list.iter().for_each(&mut push);
            }
            EpcisEvent::Transaction(transaction) => {
                transaction.epc_list.iter().for_each(&mut push);
                if let Some(parent) = &transaction.parent_id {
                    push(parent);
                }
            }
        }
    }
    seeds
}

/// Computes the commissioning event set for the filtered events by
/// expanding the packing hierarchy in both directions: up to each seed's
/// hierarchy root, then down through every descendant.
pub struct CommissioningExpandStage {
    repository: Arc<dyn EventRepository>,
    select_for_update: bool,
}

impl CommissioningExpandStage {
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self {
            repository,
            select_for_update: false,
        }
    }

    /// Request row-level locking on entry queries, for repositories that
    /// run the pipeline inside a larger write transaction.
    pub fn select_for_update(mut self, lock: bool) -> Self {
        self.select_for_update = lock;
        self
    }

    /// Iterative closure over the parent/child graph starting from the
    /// given parent entries. A visited set guards against malformed
    /// cyclic data: a revisited entry is reported and not followed again.
    async fn expand(&self, parents: &[Entry]) -> Result<Vec<Entry>, PipelineError> {
        let mut visited: HashSet<Epc> =
            parents.iter().map(|p| p.identifier.clone()).collect();
        let mut frontier: Vec<Entry> = parents.to_vec();
        let mut discovered = Vec::new();

        while !frontier.is_empty() {
            let children = self
                .repository
                .entries_by_parents(&frontier, self.select_for_update)
                .await?;

            let mut next = Vec::new();
            for child in children {
                if !visited.insert(child.identifier.clone()) {
                    warn!(
                        epc = %child.identifier,
                        "entry revisited during hierarchy expansion; packing data may be cyclic"
                    );
                    continue;
                }
                if child.is_parent {
                    next.push(child.clone());
                }
                discovered.push(child);
            }
            frontier = next;
        }
        Ok(discovered)
    }
}

#[async_trait]
impl PipelineStage for CommissioningExpandStage {
    fn name(&self) -> &'static str {
        "commissioning-expand"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let seeds = collect_seeds(&ctx.filtered_events, self.name());
        if seeds.is_empty() {
            debug!("no seed EPCs; nothing to expand");
            ctx.object_events.clear();
            return Ok(());
        }

        // Roots of the hierarchies the seeds belong to. Resolving roots
        // first makes the result independent of which subset of a
        // hierarchy appeared in the seed set.
        let tops = self
            .repository
            .top_entries(&seeds, self.select_for_update)
            .await?;
        let top_ids: HashSet<&str> = tops.iter().map(|t| t.identifier.as_str()).collect();

        let remaining: Vec<Epc> = seeds
            .iter()
            .filter(|epc| !top_ids.contains(epc.as_str()))
            .cloned()
            .collect();

        let descendants = self
            .repository
            .entries_by_tops(&tops, self.select_for_update)
            .await?;
        let parents = self
            .repository
            .parent_entries(&remaining, self.select_for_update)
            .await?;
        let closure = self.expand(&parents).await?;

        // Union keyed by identifier: descendants, the expanded closure,
        // the parent entries themselves, and the roots.
        let mut commissioning_set: HashMap<Epc, Entry> = HashMap::new();
        for entry in descendants
            .into_iter()
            .chain(closure)
            .chain(parents)
            .chain(tops)
        {
            commissioning_set.insert(entry.identifier.clone(), entry);
        }
        let entries: Vec<Entry> = commissioning_set.into_values().collect();

        let events = self
            .repository
            .events_by_entries(&entries, EventType::Object)
            .await?;

        let mut seen = HashSet::new();
        let mut commissioning: Vec<EpcisEvent> = events
            .into_iter()
            .filter(|event| event.action() == Some(Action::Add))
            .filter(|event| seen.insert(event.clone()))
            .collect();
        commissioning.sort_by_key(|event| event.event_time());

        info!(
            seeds = seeds.len(),
            entries = entries.len(),
            commissioning = commissioning.len(),
            "hierarchy expansion complete"
        );
        ctx.object_events = commissioning;
        Ok(())
    }
}

/// Looks up commissioning events for exactly the unique EPCs named in the
/// filtered events, without walking the hierarchy. Aggregation events
/// contribute their children and parent; transformation events are not
/// supported here and fail the stage.
pub struct CommissioningFetchStage {
    repository: Arc<dyn EventRepository>,
}

impl CommissioningFetchStage {
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl PipelineStage for CommissioningFetchStage {
    fn name(&self) -> &'static str {
        "commissioning-fetch"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let mut epcs: HashSet<Epc> = HashSet::new();
        for event in &ctx.filtered_events {
            match event {
                EpcisEvent::Transformation(_) => {
                    return Err(PipelineError::UnsupportedEvent {
                        stage: self.name(),
                        reason: "commissioning lookup for transformation events is not supported"
                            .to_string(),
                    });
                }
                _ => {
                    epcs.extend(event.epcs().iter().cloned());
                    if let Some(parent) = event.parent_id() {
                        epcs.insert(parent.clone());
                    }
                }
            }
        }

        let epcs: Vec<Epc> = epcs.into_iter().collect();
        let mut events = self.repository.object_events_by_epcs(&epcs).await?;
        events.sort_by_key(|event| event.event_time());
        debug!(epcs = epcs.len(), events = events.len(), "commissioning lookup complete");
        ctx.object_events = events;
        Ok(())
    }
}
