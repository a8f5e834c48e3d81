//! Shipment identity, carrier and the location/delay history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Sources;
use crate::extract;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingFields {
    pub shipment_id: Option<String>,
    pub return_shipment_id: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub shipment_status: Option<String>,
    pub last_tracking_update: Option<DateTime<Utc>>,
    pub location_history: Vec<TrackingEvent>,
    pub delay_events: Vec<TrackingEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackingEvent {
    pub status: Option<String>,
    pub substatus: Option<String>,
    pub location: Option<String>,
    pub at: Option<DateTime<Utc>>,
}

impl TrackingEvent {
    fn from_payload(raw: &Value) -> Self {
        let raw = Some(raw);
        Self {
            status: extract::get_opt(raw, "status"),
            substatus: extract::get_opt(raw, "substatus"),
            location: extract::first_present(&[
                (raw, "location"),
                (raw, "location.city"),
                (raw, "location.description"),
                (raw, "checkpoint"),
            ]),
            at: extract::first_present(&[(raw, "date"), (raw, "date_created"), (raw, "at")]),
        }
    }

    pub fn is_delay(&self) -> bool {
        [&self.status, &self.substatus]
            .into_iter()
            .flatten()
            .any(|s| s.to_ascii_lowercase().contains("delay"))
    }
}

/// Shipment history events, oldest first.
pub fn events(src: &Sources<'_>) -> Vec<TrackingEvent> {
    let history = src.shipment_history;
    let mut events: Vec<TrackingEvent> = extract::first_array(&[
        (history, "history"),
        (history, "events"),
        (history, "results"),
        (history, ""),
    ])
    .iter()
    .map(TrackingEvent::from_payload)
    .collect();
    events.sort_by_key(|e| e.at);
    events
}

pub fn map(src: &Sources<'_>) -> TrackingFields {
    let history = src.shipment_history;
    let events = events(src);
    let delay_events = events.iter().filter(|e| e.is_delay()).cloned().collect();

    TrackingFields {
        shipment_id: extract::first_present(&[
            (src.order, "shipping.id"),
            (src.order, "shipment_id"),
        ]),
        return_shipment_id: extract::first_present(&[
            (src.return_details, "shipments.0.shipment_id"),
            (src.return_details, "shipments.0.id"),
        ]),
        tracking_number: extract::first_present(&[
            (src.return_details, "shipments.0.tracking_number"),
            (history, "tracking_number"),
            (src.order, "shipping.tracking_number"),
        ]),
        carrier: extract::first_present(&[
            (src.return_details, "shipments.0.carrier"),
            (history, "carrier"),
            (history, "tracking_method"),
        ]),
        shipment_status: extract::first_present(&[
            (src.return_details, "shipments.0.status"),
            (history, "status"),
            (src.order, "shipping.status"),
        ]),
        last_tracking_update: events.iter().filter_map(|e| e.at).max(),
        location_history: events,
        delay_events,
    }
}
