//! In-memory repository backend.
//!
//! Maintains the entry graph and event history from recorded events.
//! Intended for tests, demos, and single-process deployments; production
//! systems implement `EventRepository` over their own store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::{Action, Entry, Epc, EpcisEvent, EventType};

use super::{EventRepository, EventSink, RepositoryError};

#[derive(Debug, Default)]
struct State {
    entries: HashMap<Epc, Entry>,
    events: Vec<EpcisEvent>,
}

impl State {
    /// Walk the parent chain of an EPC up to its hierarchy root. A cycle
    /// in the stored graph is reported and the walk stops at the revisit.
    fn root_of(&self, epc: &Epc) -> Option<&Entry> {
        let mut current = self.entries.get(epc)?;
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(&current.identifier);

        while let Some(parent_id) = &current.parent_identifier {
            if !visited.insert(parent_id) {
                warn!(epc = %epc, parent = %parent_id, "cycle detected in entry graph");
                break;
            }
            match self.entries.get(parent_id) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Some(current)
    }

    fn refresh_top_flag(&mut self, epc: &Epc) {
        if let Some(entry) = self.entries.get_mut(epc) {
            entry.is_top = entry.is_parent && entry.parent_identifier.is_none();
        }
    }
}

/// A thread-safe in-memory event store and entry graph.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded events.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Snapshot of one entry, if known.
    pub async fn entry(&self, epc: &str) -> Option<Entry> {
        self.state.read().await.entries.get(epc).cloned()
    }
}

#[async_trait]
impl EventSink for InMemoryRepository {
    async fn record(&self, event: &EpcisEvent) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.events.push(event.clone());

        match event {
            EpcisEvent::Object(object) => {
                if object.action == Action::Add {
                    for epc in &object.epc_list {
                        state
                            .entries
                            .entry(epc.clone())
                            .or_insert_with(|| Entry::new(epc.clone()));
                    }
                }
            }
            EpcisEvent::Aggregation(aggregation) => {
                let Some(parent_id) = aggregation.parent_id.clone() else {
                    return Ok(());
                };
                state
                    .entries
                    .entry(parent_id.clone())
                    .or_insert_with(|| Entry::new(parent_id.clone()));

                match aggregation.action {
                    Action::Add => {
                        for child in &aggregation.child_epcs {
                            let entry = state
                                .entries
                                .entry(child.clone())
                                .or_insert_with(|| Entry::new(child.clone()));
                            entry.parent_identifier = Some(parent_id.clone());
                            entry.is_top = false;
                        }
                        if let Some(parent) = state.entries.get_mut(&parent_id) {
                            parent.is_parent = true;
                        }
                    }
                    Action::Delete => {
                        for child in &aggregation.child_epcs {
                            if let Some(entry) = state.entries.get_mut(child) {
                                entry.parent_identifier = None;
                            }
                        }
                        let still_parent = state
                            .entries
                            .values()
                            .any(|e| e.parent_identifier.as_deref() == Some(&parent_id));
                        if let Some(parent) = state.entries.get_mut(&parent_id) {
                            parent.is_parent = still_parent;
                        }
                    }
                    Action::Observe => {}
                }
                state.refresh_top_flag(&parent_id);
            }
            // Transaction and transformation events carry no packing
            // structure.
            EpcisEvent::Transaction(_) | EpcisEvent::Transformation(_) => {}
        }

        Ok(())
    }
}

#[async_trait]
impl EventRepository for InMemoryRepository {
    async fn top_entries(
        &self,
        epcs: &[Epc],
        _for_update: bool,
    ) -> Result<Vec<Entry>, RepositoryError> {
        let state = self.state.read().await;
        let mut seen = HashSet::new();
        let mut tops = Vec::new();
        for epc in epcs {
            if let Some(root) = state.root_of(epc) {
                if seen.insert(root.identifier.clone()) {
                    tops.push(root.clone());
                }
            }
        }
        Ok(tops)
    }

    async fn entries_by_tops(
        &self,
        tops: &[Entry],
        _for_update: bool,
    ) -> Result<Vec<Entry>, RepositoryError> {
        let state = self.state.read().await;
        let top_ids: HashSet<&str> = tops.iter().map(|t| t.identifier.as_str()).collect();
        let descendants = state
            .entries
            .values()
            .filter(|entry| {
                if top_ids.contains(entry.identifier.as_str()) {
                    return false;
                }
                state
                    .root_of(&entry.identifier)
                    .is_some_and(|root| top_ids.contains(root.identifier.as_str()))
            })
            .cloned()
            .collect();
        Ok(descendants)
    }

    async fn parent_entries(
        &self,
        epcs: &[Epc],
        _for_update: bool,
    ) -> Result<Vec<Entry>, RepositoryError> {
        let state = self.state.read().await;
        Ok(epcs
            .iter()
            .filter_map(|epc| state.entries.get(epc))
            .filter(|entry| entry.is_parent)
            .cloned()
            .collect())
    }

    async fn entries_by_parents(
        &self,
        parents: &[Entry],
        _for_update: bool,
    ) -> Result<Vec<Entry>, RepositoryError> {
        let state = self.state.read().await;
        let parent_ids: HashSet<&str> = parents.iter().map(|p| p.identifier.as_str()).collect();
        Ok(state
            .entries
            .values()
            .filter(|entry| {
                entry
                    .parent_identifier
                    .as_deref()
                    .is_some_and(|parent| parent_ids.contains(parent))
            })
            .cloned()
            .collect())
    }

    async fn events_by_entries(
        &self,
        entries: &[Entry],
        event_type: EventType,
    ) -> Result<Vec<EpcisEvent>, RepositoryError> {
        let state = self.state.read().await;
        let ids: HashSet<&str> = entries.iter().map(|e| e.identifier.as_str()).collect();
        Ok(state
            .events
            .iter()
            .filter(|event| event.event_type() == event_type)
            .filter(|event| event.epcs().iter().any(|epc| ids.contains(epc.as_str())))
            .cloned()
            .collect())
    }

    async fn aggregation_history(&self, epcs: &[Epc]) -> Result<Vec<EpcisEvent>, RepositoryError> {
        let state = self.state.read().await;
        let ids: HashSet<&str> = epcs.iter().map(String::as_str).collect();
        let mut history: Vec<EpcisEvent> = state
            .events
            .iter()
            .filter(|event| matches!(event, EpcisEvent::Aggregation(_)))
            .filter(|event| {
                event.epcs().iter().any(|epc| ids.contains(epc.as_str()))
                    || event
                        .parent_id()
                        .is_some_and(|parent| ids.contains(parent.as_str()))
            })
            .cloned()
            .collect();
        history.sort_by_key(|event| event.event_time());
        Ok(history)
    }

    async fn object_events_by_epcs(
        &self,
        epcs: &[Epc],
    ) -> Result<Vec<EpcisEvent>, RepositoryError> {
        let state = self.state.read().await;
        let ids: HashSet<&str> = epcs.iter().map(String::as_str).collect();
        Ok(state
            .events
            .iter()
            .filter(|event| matches!(event, EpcisEvent::Object(_)))
            .filter(|event| event.epcs().iter().any(|epc| ids.contains(epc.as_str())))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AggregationEvent, EventBase, ObjectEvent};
    use chrono::Utc;

    fn base() -> EventBase {
        EventBase {
            event_time: Utc::now(),
            biz_step: None,
            disposition: None,
            read_point: None,
            biz_location: None,
            source_list: vec![],
            destination_list: vec![],
        }
    }

    fn commission(epcs: &[&str]) -> EpcisEvent {
        EpcisEvent::Object(ObjectEvent {
            base: base(),
            action: Action::Add,
            epc_list: epcs.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn pack(parent: &str, children: &[&str]) -> EpcisEvent {
        EpcisEvent::Aggregation(AggregationEvent {
            base: base(),
            action: Action::Add,
            parent_id: Some(parent.to_string()),
            child_epcs: children.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[tokio::test]
    async fn test_pack_builds_hierarchy() {
        let repo = InMemoryRepository::new();
        repo.record(&commission(&["item1", "item2"])).await.unwrap();
        repo.record(&commission(&["case1"])).await.unwrap();
        repo.record(&pack("case1", &["item1", "item2"])).await.unwrap();

        let case = repo.entry("case1").await.unwrap();
        assert!(case.is_parent);
        assert!(case.is_top);

        let item = repo.entry("item1").await.unwrap();
        assert_eq!(item.parent_identifier.as_deref(), Some("case1"));
        assert!(!item.is_top);
    }

    #[tokio::test]
    async fn test_top_entries_walk_to_root() {
        let repo = InMemoryRepository::new();
        repo.record(&commission(&["item1"])).await.unwrap();
        repo.record(&commission(&["case1"])).await.unwrap();
        repo.record(&commission(&["pallet1"])).await.unwrap();
        repo.record(&pack("case1", &["item1"])).await.unwrap();
        repo.record(&pack("pallet1", &["case1"])).await.unwrap();

        let tops = repo
            .top_entries(&["item1".to_string()], false)
            .await
            .unwrap();
        assert_eq!(tops.len(), 1);
        assert_eq!(tops[0].identifier, "pallet1");

        let descendants = repo.entries_by_tops(&tops, false).await.unwrap();
        let mut ids: Vec<&str> = descendants.iter().map(|e| e.identifier.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, ["case1", "item1"]);
    }

    #[tokio::test]
    async fn test_unpack_clears_parent() {
        let repo = InMemoryRepository::new();
        repo.record(&commission(&["item1"])).await.unwrap();
        repo.record(&commission(&["case1"])).await.unwrap();
        repo.record(&pack("case1", &["item1"])).await.unwrap();

        let unpack = EpcisEvent::Aggregation(AggregationEvent {
            base: base(),
            action: Action::Delete,
            parent_id: Some("case1".to_string()),
            child_epcs: vec!["item1".to_string()],
        });
        repo.record(&unpack).await.unwrap();

        let item = repo.entry("item1").await.unwrap();
        assert_eq!(item.parent_identifier, None);
        let case = repo.entry("case1").await.unwrap();
        assert!(!case.is_parent);
    }

    #[tokio::test]
    async fn test_aggregation_history_includes_unpack() {
        let repo = InMemoryRepository::new();
        repo.record(&commission(&["item1"])).await.unwrap();
        repo.record(&commission(&["case1"])).await.unwrap();
        repo.record(&pack("case1", &["item1"])).await.unwrap();
        let unpack = EpcisEvent::Aggregation(AggregationEvent {
            base: base(),
            action: Action::Delete,
            parent_id: Some("case1".to_string()),
            child_epcs: vec!["item1".to_string()],
        });
        repo.record(&unpack).await.unwrap();

        let history = repo
            .aggregation_history(&["item1".to_string()])
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
    }
}
