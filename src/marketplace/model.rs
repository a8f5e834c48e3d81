//! Typed slices of marketplace payloads that drive control flow.
//!
//! Only the fields the pipeline branches on are modelled here; the full
//! payloads travel untouched alongside them.

use serde_json::Value;

use crate::extract::{first_array, first_present, get};

/// Identity of a listed claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSummary {
    pub id: String,
    pub order_id: Option<String>,
    pub reason_id: Option<String>,
}

impl ClaimSummary {
    /// `None` when the payload carries no claim id.
    pub fn from_payload(claim: &Value) -> Option<Self> {
        let id = get::<String>(claim, "id")?;
        let order_id = match get::<String>(claim, "resource").as_deref() {
            Some("order") | None => get(claim, "resource_id"),
            Some(_) => None,
        };
        Some(Self {
            id,
            order_id,
            reason_id: get(claim, "reason_id"),
        })
    }
}

/// Return-details facts used by the activity filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReturnSummary {
    pub id: Option<String>,
    pub status: Option<String>,
    pub shipment_count: usize,
    pub order_id: Option<String>,
}

impl ReturnSummary {
    pub fn from_payload(ret: &Value) -> Self {
        let root = Some(ret);
        Self {
            id: first_present(&[(root, "id"), (root, "return_id")]),
            status: get(ret, "status"),
            shipment_count: first_array(&[(root, "shipments")]).len(),
            order_id: first_present(&[(root, "orders.0.order_id"), (root, "resource_id")]),
        }
    }

    /// A return is active when it has an id, or has left the pending state
    /// with at least one shipment.
    pub fn is_active(&self) -> bool {
        if self.id.is_some() {
            return true;
        }
        let pending = self
            .status
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case("pending"));
        !pending && self.shipment_count > 0
    }
}

/// Dependent-resource identifiers carried by an order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderRefs {
    pub item_id: Option<String>,
    pub shipment_id: Option<String>,
}

impl OrderRefs {
    pub fn from_payload(order: &Value) -> Self {
        let root = Some(order);
        Self {
            item_id: first_present(&[(root, "order_items.0.item.id"), (root, "items.0.id")]),
            shipment_id: first_present(&[(root, "shipping.id"), (root, "shipment_id")]),
        }
    }
}

/// One page of the claim search endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClaimPage {
    pub results: Vec<Value>,
    pub total: Option<i64>,
}

impl ClaimPage {
    pub fn from_payload(page: &Value) -> Self {
        let root = Some(page);
        Self {
            results: first_array(&[(root, "data"), (root, "results"), (root, "")]).to_vec(),
            total: first_present(&[(root, "paging.total"), (root, "total")]),
        }
    }
}
