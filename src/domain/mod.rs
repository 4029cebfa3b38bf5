//! Data structures shared across the pipeline: events, headers, entries.

pub mod entry;
pub mod event;

pub use entry::Entry;
pub use event::{
    Action, AggregationEvent, Document, Epc, EpcisEvent, EventBase, EventType, Header,
    ObjectEvent, Partner, PartnerType, TransactionEvent, TransformationEvent, TypedId,
};
