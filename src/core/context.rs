//! The shared, run-scoped pipeline context.
//!
//! One context is created per inbound document and threaded through every
//! stage of that run. Runs never share a context; the only collaborator
//! shared between concurrent runs is the repository.

use uuid::Uuid;

use crate::config::ResolvedCriteria;
use crate::domain::{Document, EpcisEvent};

/// Typed, named slots the stages read and write during one run.
#[derive(Debug)]
pub struct PipelineContext {
    /// Run identifier, present in every log line for the run
    pub run_id: Uuid,

    /// Short name used for delivery file naming when no task exists yet
    pub task_name: String,

    /// The inbound document under evaluation
    pub document: Document,

    /// Events that matched the criteria, in encounter order
    pub filtered_events: Vec<EpcisEvent>,

    /// Whether the document header matched the criteria. Stands in for
    /// the header's membership in the filtered set: headers are never
    /// appended to `filtered_events` because enrichment and rendering
    /// operate on events only; the flag's sole downstream effect is to
    /// qualify the document for forward-data dispatch.
    pub header_matched: bool,

    /// The criteria record (with endpoint/credential resolved) driving
    /// this run; published by the filter stage
    pub matched_criteria: Option<ResolvedCriteria>,

    /// Full pack/unpack history for the filtered events
    pub aggregation_events: Vec<EpcisEvent>,

    /// Commissioning provenance for the filtered events
    pub object_events: Vec<EpcisEvent>,

    /// Rendered outbound payload, if any stage produced one
    pub outbound_payload: Option<String>,

    /// Name of the delivery task created for this run, if any
    pub created_task: Option<String>,
}

impl PipelineContext {
    pub fn new(document: Document) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            task_name: format!("run-{}", &run_id.simple().to_string()[..12]),
            document,
            filtered_events: Vec::new(),
            header_matched: false,
            matched_criteria: None,
            aggregation_events: Vec::new(),
            object_events: Vec::new(),
            outbound_payload: None,
            created_task: None,
        }
    }

    /// The resolved criteria, or a `MissingContext` error for stages that
    /// cannot run without it.
    pub fn require_criteria(&self) -> Result<&ResolvedCriteria, super::PipelineError> {
        self.matched_criteria
            .as_ref()
            .ok_or(super::PipelineError::MissingContext("matched_criteria"))
    }
}
