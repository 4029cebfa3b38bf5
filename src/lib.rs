//! tracegate - Traceability event filtering and forwarding
//!
//! Evaluates inbound supply-chain event documents against configured
//! criteria and forwards the matches, enriched with commissioning and
//! packing provenance, to trading-partner endpoints.
//!
//! # Architecture
//!
//! A run is one sequential pipeline over one inbound document:
//! - `filter` selects the events (and header) matching one criteria record
//! - `hierarchy` expands the packing graph to collect commissioning events
//! - `aggregation` collects the pack/unpack history
//! - `assemble` renders the combined outbound document
//! - `dispatch` creates a delivery task and hands it to the transport
//!   router (http/https, sftp, mailto, socket)
//!
//! # Modules
//!
//! - `config`: criteria, endpoint, and credential records
//! - `domain`: event and hierarchy-entry data structures
//! - `repository`: event storage behind the `EventRepository` trait
//! - `core`: the pipeline stages and runner
//! - `transport`: the protocol dispatch router
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Forward a document through the "shipping" criteria
//! tracegate run shipping --config tracegate.yaml --input events.json
//!
//! # Check a configuration file
//! tracegate validate --config tracegate.yaml
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod repository;
pub mod transport;

pub use crate::config::{Criteria, Endpoint, ForwardingConfig};
pub use crate::core::{PipelineContext, PipelineError, PipelineRunner, RunSettings};
pub use crate::domain::{Document, EpcisEvent};
pub use crate::transport::{DispatchOptions, DispatchRouter, RouterConfig, TransportError};
