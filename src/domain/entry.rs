//! Entry records describing the stored parent/child EPC graph.

use serde::{Deserialize, Serialize};

use super::event::Epc;

/// One repository row for an EPC known to the system.
///
/// `parent_identifier` points at the EPC this one is currently packed
/// into, if any. `is_parent` marks entries that currently have children;
/// `is_top` marks hierarchy roots (a parent with no parent of its own).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub identifier: Epc,

    #[serde(default)]
    pub parent_identifier: Option<Epc>,

    #[serde(default)]
    pub is_parent: bool,

    #[serde(default)]
    pub is_top: bool,
}

impl Entry {
    pub fn new(identifier: impl Into<Epc>) -> Self {
        Self {
            identifier: identifier.into(),
            parent_identifier: None,
            is_parent: false,
            is_top: false,
        }
    }
}
