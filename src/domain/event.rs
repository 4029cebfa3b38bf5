//! Traceability event types.
//!
//! Inbound events arrive as a closed, tagged union over the four EPCIS
//! event kinds. The decoder that produces them from wire formats lives
//! outside this crate; everything here operates on the parsed shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An EPC identifier URN for a physical item, lot, or case.
pub type Epc = String;

/// The four event kinds, used both as the event discriminant and as the
/// `event_type` value on a criteria record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Object,
    Aggregation,
    Transaction,
    Transformation,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventType::Object => "Object",
            EventType::Aggregation => "Aggregation",
            EventType::Transaction => "Transaction",
            EventType::Transformation => "Transformation",
        };
        f.write_str(name)
    }
}

/// EPCIS event action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Add,
    Observe,
    Delete,
}

/// A typed `(type, id)` pair from an event's source or destination list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypedId {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

/// Fields shared by every event variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventBase {
    /// When the event occurred
    pub event_time: DateTime<Utc>,

    /// Business step URN (CBV or custom)
    #[serde(default)]
    pub biz_step: Option<String>,

    /// Disposition URN
    #[serde(default)]
    pub disposition: Option<String>,

    /// Read point URN, typically a sub-site
    #[serde(default)]
    pub read_point: Option<String>,

    /// Business location URN, typically a site
    #[serde(default)]
    pub biz_location: Option<String>,

    /// Source parties
    #[serde(default)]
    pub source_list: Vec<TypedId>,

    /// Destination parties
    #[serde(default)]
    pub destination_list: Vec<TypedId>,
}

/// An object event: items observed, commissioned (ADD) or decommissioned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectEvent {
    #[serde(flatten)]
    pub base: EventBase,
    pub action: Action,
    #[serde(default)]
    pub epc_list: Vec<Epc>,
}

/// An aggregation event: children packed into (ADD) or out of (DELETE)
/// a parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationEvent {
    #[serde(flatten)]
    pub base: EventBase,
    pub action: Action,
    #[serde(default)]
    pub parent_id: Option<Epc>,
    #[serde(default)]
    pub child_epcs: Vec<Epc>,
}

/// A transaction event: items associated with a business transaction,
/// e.g. a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionEvent {
    #[serde(flatten)]
    pub base: EventBase,
    pub action: Action,
    #[serde(default)]
    pub parent_id: Option<Epc>,
    #[serde(default)]
    pub epc_list: Vec<Epc>,
}

/// A transformation event: inputs consumed to produce outputs. Carries no
/// action attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformationEvent {
    #[serde(flatten)]
    pub base: EventBase,
    #[serde(default)]
    pub parent_id: Option<Epc>,
    #[serde(default)]
    pub input_epc_list: Vec<Epc>,
    #[serde(default)]
    pub output_epc_list: Vec<Epc>,
}

/// The closed union of traceability events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EpcisEvent {
    #[serde(rename = "ObjectEvent")]
    Object(ObjectEvent),
    #[serde(rename = "AggregationEvent")]
    Aggregation(AggregationEvent),
    #[serde(rename = "TransactionEvent")]
    Transaction(TransactionEvent),
    #[serde(rename = "TransformationEvent")]
    Transformation(TransformationEvent),
}

impl EpcisEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            EpcisEvent::Object(_) => EventType::Object,
            EpcisEvent::Aggregation(_) => EventType::Aggregation,
            EpcisEvent::Transaction(_) => EventType::Transaction,
            EpcisEvent::Transformation(_) => EventType::Transformation,
        }
    }

    /// The event's action, if the variant carries one. Transformation
    /// events have no action attribute.
    pub fn action(&self) -> Option<Action> {
        match self {
            EpcisEvent::Object(e) => Some(e.action),
            EpcisEvent::Aggregation(e) => Some(e.action),
            EpcisEvent::Transaction(e) => Some(e.action),
            EpcisEvent::Transformation(_) => None,
        }
    }

    pub fn base(&self) -> &EventBase {
        match self {
            EpcisEvent::Object(e) => &e.base,
            EpcisEvent::Aggregation(e) => &e.base,
            EpcisEvent::Transaction(e) => &e.base,
            EpcisEvent::Transformation(e) => &e.base,
        }
    }

    pub fn event_time(&self) -> DateTime<Utc> {
        self.base().event_time
    }

    pub fn biz_step(&self) -> Option<&str> {
        self.base().biz_step.as_deref()
    }

    pub fn disposition(&self) -> Option<&str> {
        self.base().disposition.as_deref()
    }

    pub fn read_point(&self) -> Option<&str> {
        self.base().read_point.as_deref()
    }

    pub fn biz_location(&self) -> Option<&str> {
        self.base().biz_location.as_deref()
    }

    pub fn sources(&self) -> &[TypedId] {
        &self.base().source_list
    }

    pub fn destinations(&self) -> &[TypedId] {
        &self.base().destination_list
    }

    /// The primary EPC list for the variant: `epc_list` for object and
    /// transaction events, `child_epcs` for aggregation events, the input
    /// list for transformation events.
    pub fn epcs(&self) -> &[Epc] {
        match self {
            EpcisEvent::Object(e) => &e.epc_list,
            EpcisEvent::Aggregation(e) => &e.child_epcs,
            EpcisEvent::Transaction(e) => &e.epc_list,
            EpcisEvent::Transformation(e) => &e.input_epc_list,
        }
    }

    /// The parent EPC, for variants that carry one.
    pub fn parent_id(&self) -> Option<&Epc> {
        match self {
            EpcisEvent::Object(_) => None,
            EpcisEvent::Aggregation(e) => e.parent_id.as_ref(),
            EpcisEvent::Transaction(e) => e.parent_id.as_ref(),
            EpcisEvent::Transformation(e) => e.parent_id.as_ref(),
        }
    }
}

/// Role of a partner named in a document header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartnerType {
    Sender,
    Receiver,
}

/// One partner entry from the document header envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub partner_type: PartnerType,
    pub partner_id: String,
}

/// Document-level envelope naming sender and receiver partners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub partners: Vec<Partner>,
}

/// One inbound message: an optional header plus its events, with the raw
/// text retained for forward-data dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub header: Option<Header>,
    #[serde(default)]
    pub events: Vec<EpcisEvent>,
    #[serde(skip)]
    pub raw: Option<String>,
}

impl Document {
    pub fn new(events: Vec<EpcisEvent>) -> Self {
        Self {
            header: None,
            events,
            raw: None,
        }
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.header = Some(header);
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    /// Parse a document from JSON, retaining the raw text.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let mut document: Document = serde_json::from_str(raw)?;
        document.raw = Some(raw.to_string());
        Ok(document)
    }
}
