//! Unmodified source payloads, kept for audit only.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Sources;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawPayloads {
    pub raw_claim: Value,
    pub raw_order: Option<Value>,
    pub raw_messages: Option<Value>,
    pub raw_return: Option<Value>,
}

pub fn map(src: &Sources<'_>) -> RawPayloads {
    RawPayloads {
        raw_claim: src.claim.clone(),
        raw_order: src.order.cloned(),
        raw_messages: src.messages.cloned(),
        raw_return: src.return_details.cloned(),
    }
}
