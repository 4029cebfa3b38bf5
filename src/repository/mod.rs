//! The repository seam between the pipeline and event storage.
//!
//! The pipeline only reads: it queries the parent/child entry graph and
//! historical events. Ingestion persistence is a separate, optional seam
//! (`EventSink`) so the filter stage can run in a match-only "dry" mode.
//!
//! The `for_update` flag on entry queries requests row-level locking when
//! the backing store runs the pipeline inside a larger write transaction.
//! Backends without that notion ignore it.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Entry, Epc, EpcisEvent, EventType};

pub use memory::InMemoryRepository;

/// Errors surfaced by a repository backend.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository backend error: {0}")]
    Backend(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read operations the pipeline depends on.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// The root entries of the hierarchies containing the given EPCs.
    /// An EPC that belongs to no hierarchy resolves to its own entry.
    async fn top_entries(
        &self,
        epcs: &[Epc],
        for_update: bool,
    ) -> Result<Vec<Entry>, RepositoryError>;

    /// Every entry (excluding the roots themselves) whose hierarchy root
    /// is one of the given top entries.
    async fn entries_by_tops(
        &self,
        tops: &[Entry],
        for_update: bool,
    ) -> Result<Vec<Entry>, RepositoryError>;

    /// The entries among the given EPCs that currently have children.
    async fn parent_entries(
        &self,
        epcs: &[Epc],
        for_update: bool,
    ) -> Result<Vec<Entry>, RepositoryError>;

    /// The direct children of the given parent entries.
    async fn entries_by_parents(
        &self,
        parents: &[Entry],
        for_update: bool,
    ) -> Result<Vec<Entry>, RepositoryError>;

    /// Events of the given kind that reference any of the given entries.
    async fn events_by_entries(
        &self,
        entries: &[Entry],
        event_type: EventType,
    ) -> Result<Vec<EpcisEvent>, RepositoryError>;

    /// The complete, time-ordered pack/unpack history touching any of the
    /// given EPCs, not merely the most recent state.
    async fn aggregation_history(&self, epcs: &[Epc]) -> Result<Vec<EpcisEvent>, RepositoryError>;

    /// Object events that reference any of the given EPCs directly.
    async fn object_events_by_epcs(&self, epcs: &[Epc])
        -> Result<Vec<EpcisEvent>, RepositoryError>;
}

/// Ingestion persistence seam used by the filter stage.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Record one inbound event, updating the entry graph as needed.
    async fn record(&self, event: &EpcisEvent) -> Result<(), RepositoryError>;
}
