//! The criteria matching engine.
//!
//! Pure predicates over one event or one header and a criteria record.
//! Every configured field must match exactly (case-sensitive, no
//! wildcards); an unconfigured field always passes. A criteria that
//! configures no event-relevant field at all is header-only and never
//! matches events, and vice versa for headers.

use crate::config::Criteria;
use crate::domain::{EpcisEvent, Header, PartnerType};

/// Whether an event satisfies every configured field of the criteria.
pub fn matches_event(event: &EpcisEvent, criteria: &Criteria) -> bool {
    if !criteria.has_event_fields() {
        return false;
    }

    check_event_type(event, criteria)
        && check_action(event, criteria)
        && check_field(event.biz_location(), criteria.biz_location.as_deref())
        && check_field(event.disposition(), criteria.disposition.as_deref())
        && check_field(event.biz_step(), criteria.biz_step.as_deref())
        && check_field(event.read_point(), criteria.read_point.as_deref())
        && check_source(event, criteria)
        && check_destination(event, criteria)
}

/// Whether a header satisfies the configured sender/receiver identifiers.
pub fn matches_header(header: &Header, criteria: &Criteria) -> bool {
    if !criteria.has_header_fields() {
        return false;
    }

    let sender_ok = match criteria.sender_identifier.as_deref() {
        None => true,
        Some(expected) => header
            .partners
            .iter()
            .any(|p| p.partner_type == PartnerType::Sender && p.partner_id == expected),
    };
    let receiver_ok = match criteria.receiver_identifier.as_deref() {
        None => true,
        Some(expected) => header
            .partners
            .iter()
            .any(|p| p.partner_type == PartnerType::Receiver && p.partner_id == expected),
    };

    sender_ok && receiver_ok
}

fn check_event_type(event: &EpcisEvent, criteria: &Criteria) -> bool {
    match criteria.event_type {
        None => true,
        Some(expected) => event.event_type() == expected,
    }
}

/// A configured action filter fails against variants with no action
/// attribute (transformation events) rather than passing. Kept as is;
/// changing it would change visible match outcomes.
fn check_action(event: &EpcisEvent, criteria: &Criteria) -> bool {
    match criteria.action {
        None => true,
        Some(expected) => event.action() == Some(expected),
    }
}

fn check_field(event_value: Option<&str>, criteria_value: Option<&str>) -> bool {
    match criteria_value {
        None => true,
        Some(expected) => event_value == Some(expected),
    }
}

fn check_source(event: &EpcisEvent, criteria: &Criteria) -> bool {
    match (&criteria.source_type, &criteria.source_id) {
        (Some(kind), Some(id)) => event
            .sources()
            .iter()
            .any(|s| &s.kind == kind && &s.id == id),
        // Validation guarantees the pair is configured together.
        _ => true,
    }
}

fn check_destination(event: &EpcisEvent, criteria: &Criteria) -> bool {
    match (&criteria.destination_type, &criteria.destination_id) {
        (Some(kind), Some(id)) => event
            .destinations()
            .iter()
            .any(|d| &d.kind == kind && &d.id == id),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Action, EventBase, EventType, ObjectEvent, Partner, TransactionEvent,
        TransformationEvent, TypedId,
    };
    use chrono::Utc;

    fn criteria() -> Criteria {
        Criteria {
            name: "test".to_string(),
            event_type: None,
            action: None,
            biz_step: None,
            disposition: None,
            read_point: None,
            biz_location: None,
            source_type: None,
            source_id: None,
            destination_type: None,
            destination_id: None,
            sender_identifier: None,
            receiver_identifier: None,
            endpoint: "ep".to_string(),
            credential: None,
        }
    }

    fn base() -> EventBase {
        EventBase {
            event_time: Utc::now(),
            biz_step: Some("urn:epcglobal:cbv:bizstep:shipping".to_string()),
            disposition: Some("urn:epcglobal:cbv:disp:in_transit".to_string()),
            read_point: Some("urn:epc:id:sgln:1.1.1".to_string()),
            biz_location: Some("urn:epc:id:sgln:1.1.0".to_string()),
            source_list: vec![TypedId {
                kind: "urn:epcglobal:cbv:sdt:possessing_party".to_string(),
                id: "urn:epc:id:sgln:2.1.0".to_string(),
            }],
            destination_list: vec![],
        }
    }

    fn object_event() -> EpcisEvent {
        EpcisEvent::Object(ObjectEvent {
            base: base(),
            action: Action::Add,
            epc_list: vec!["urn:epc:id:sgtin:1.1.1".to_string()],
        })
    }

    fn transformation_event() -> EpcisEvent {
        EpcisEvent::Transformation(TransformationEvent {
            base: base(),
            parent_id: None,
            input_epc_list: vec!["urn:epc:id:sgtin:1.1.1".to_string()],
            output_epc_list: vec![],
        })
    }

    #[test]
    fn test_no_event_fields_never_matches() {
        // An empty criteria is header-only, not match-everything.
        let criteria = criteria();
        assert!(!matches_event(&object_event(), &criteria));
    }

    #[test]
    fn test_single_field_equality() {
        let mut criteria = criteria();
        criteria.biz_step = Some("urn:epcglobal:cbv:bizstep:shipping".to_string());
        assert!(matches_event(&object_event(), &criteria));

        criteria.biz_step = Some("urn:epcglobal:cbv:bizstep:receiving".to_string());
        assert!(!matches_event(&object_event(), &criteria));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let mut criteria = criteria();
        criteria.biz_step = Some("urn:epcglobal:cbv:bizstep:SHIPPING".to_string());
        assert!(!matches_event(&object_event(), &criteria));
    }

    #[test]
    fn test_all_configured_fields_must_pass() {
        let mut criteria = criteria();
        criteria.event_type = Some(EventType::Object);
        criteria.action = Some(Action::Add);
        criteria.biz_step = Some("urn:epcglobal:cbv:bizstep:shipping".to_string());
        criteria.disposition = Some("urn:epcglobal:cbv:disp:in_transit".to_string());
        assert!(matches_event(&object_event(), &criteria));

        criteria.disposition = Some("urn:epcglobal:cbv:disp:active".to_string());
        assert!(!matches_event(&object_event(), &criteria));
    }

    #[test]
    fn test_event_type_mismatch_fails() {
        let mut criteria = criteria();
        criteria.event_type = Some(EventType::Transaction);
        assert!(!matches_event(&object_event(), &criteria));
    }

    #[test]
    fn test_action_filter_fails_for_transformation() {
        // Transformation events carry no action; a configured action
        // filter must fail, not pass as unconfigured.
        let mut criteria = criteria();
        criteria.action = Some(Action::Add);
        criteria.event_type = Some(EventType::Transformation);
        assert!(!matches_event(&transformation_event(), &criteria));
    }

    #[test]
    fn test_transformation_matches_without_action_filter() {
        let mut criteria = criteria();
        criteria.event_type = Some(EventType::Transformation);
        assert!(matches_event(&transformation_event(), &criteria));
    }

    #[test]
    fn test_source_pair_existential() {
        let mut criteria = criteria();
        criteria.source_type = Some("urn:epcglobal:cbv:sdt:possessing_party".to_string());
        criteria.source_id = Some("urn:epc:id:sgln:2.1.0".to_string());
        assert!(matches_event(&object_event(), &criteria));

        criteria.source_id = Some("urn:epc:id:sgln:9.9.9".to_string());
        assert!(!matches_event(&object_event(), &criteria));
    }

    #[test]
    fn test_destination_configured_but_list_empty_fails() {
        let mut criteria = criteria();
        criteria.destination_type = Some("urn:epcglobal:cbv:sdt:owning_party".to_string());
        criteria.destination_id = Some("urn:epc:id:sgln:3.1.0".to_string());
        assert!(!matches_event(&object_event(), &criteria));
    }

    #[test]
    fn test_transaction_with_parent_matches() {
        let mut criteria = criteria();
        criteria.event_type = Some(EventType::Transaction);
        criteria.action = Some(Action::Add);

        let event = EpcisEvent::Transaction(TransactionEvent {
            base: base(),
            action: Action::Add,
            parent_id: Some("urn:epc:id:sscc:1.1".to_string()),
            epc_list: vec!["urn:epc:id:sgtin:1.1.1".to_string()],
        });
        assert!(matches_event(&event, &criteria));
    }

    #[test]
    fn test_header_requires_configured_identifier() {
        let header = Header {
            partners: vec![Partner {
                partner_type: PartnerType::Sender,
                partner_id: "urn:epc:id:sgln:1.1.0".to_string(),
            }],
        };
        // No sender/receiver configured: header-only gate fails.
        assert!(!matches_header(&header, &criteria()));
    }

    #[test]
    fn test_header_sender_match() {
        let header = Header {
            partners: vec![
                Partner {
                    partner_type: PartnerType::Sender,
                    partner_id: "urn:epc:id:sgln:1.1.0".to_string(),
                },
                Partner {
                    partner_type: PartnerType::Receiver,
                    partner_id: "urn:epc:id:sgln:2.1.0".to_string(),
                },
            ],
        };

        let mut criteria = criteria();
        criteria.sender_identifier = Some("urn:epc:id:sgln:1.1.0".to_string());
        assert!(matches_header(&header, &criteria));

        // Both configured: both must match.
        criteria.receiver_identifier = Some("urn:epc:id:sgln:9.9.9".to_string());
        assert!(!matches_header(&header, &criteria));

        criteria.receiver_identifier = Some("urn:epc:id:sgln:2.1.0".to_string());
        assert!(matches_header(&header, &criteria));
    }

    #[test]
    fn test_header_role_is_respected() {
        // A receiver partner never satisfies a sender identifier.
        let header = Header {
            partners: vec![Partner {
                partner_type: PartnerType::Receiver,
                partner_id: "urn:epc:id:sgln:1.1.0".to_string(),
            }],
        };
        let mut criteria = criteria();
        criteria.sender_identifier = Some("urn:epc:id:sgln:1.1.0".to_string());
        assert!(!matches_header(&header, &criteria));
    }
}
