//! Message thread statistics and the last word of each party.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Sources;
use crate::extract;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunicationFields {
    /// `null` when the thread could not be fetched.
    pub message_count: Option<u32>,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Messages to the seller not yet read.
    pub unread_count: Option<u32>,
    pub attachment_count: Option<u32>,
    pub buyer_attachment_count: Option<u32>,
    pub last_buyer_message: Option<String>,
    pub last_seller_message: Option<String>,
    pub last_mediator_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Buyer,
    Seller,
    Mediator,
    Unknown,
}

/// One message of the thread, read from its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub party: Party,
    pub text: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read: bool,
    pub attachments: usize,
}

impl Message {
    fn from_payload(raw: &Value) -> Self {
        let role: Option<String> = extract::first_present(&[
            (Some(raw), "sender_role"),
            (Some(raw), "from.role"),
            (Some(raw), "role"),
        ]);
        let party = match role.as_deref() {
            Some("complainant") | Some("buyer") => Party::Buyer,
            Some("respondent") | Some("seller") => Party::Seller,
            Some("mediator") => Party::Mediator,
            _ => Party::Unknown,
        };
        Self {
            party,
            text: extract::first_present(&[(Some(raw), "message"), (Some(raw), "text")]),
            sent_at: extract::first_present(&[
                (Some(raw), "date_created"),
                (Some(raw), "message_date.created"),
            ]),
            read: extract::lookup(raw, "date_read").is_some(),
            attachments: extract::first_array(&[(Some(raw), "attachments")]).len(),
        }
    }
}

/// The thread in chronological order; `None` when it was not fetched.
/// Undated messages keep their relative position ahead of dated ones.
pub fn thread(src: &Sources<'_>) -> Option<Vec<Message>> {
    let payload = src.messages?;
    let mut messages: Vec<Message> = extract::first_array(&[
        (Some(payload), "messages"),
        (Some(payload), "results"),
        (Some(payload), ""),
    ])
    .iter()
    .map(Message::from_payload)
    .collect();
    messages.sort_by_key(|m| m.sent_at);
    Some(messages)
}

pub fn message_count(src: &Sources<'_>) -> Option<u32> {
    thread(src).map(|t| t.len() as u32)
}

pub fn map(src: &Sources<'_>) -> CommunicationFields {
    let Some(thread) = thread(src) else {
        return CommunicationFields {
            message_count: None,
            last_message_at: None,
            unread_count: None,
            attachment_count: None,
            buyer_attachment_count: None,
            last_buyer_message: None,
            last_seller_message: None,
            last_mediator_message: None,
        };
    };

    let last_from = |party: Party| {
        thread
            .iter()
            .rev()
            .filter(|m| m.party == party)
            .find_map(|m| m.text.clone())
    };
    let attachments = |party: Option<Party>| {
        thread
            .iter()
            .filter(|m| party.map_or(true, |p| m.party == p))
            .map(|m| m.attachments as u32)
            .sum::<u32>()
    };

    CommunicationFields {
        message_count: Some(thread.len() as u32),
        last_message_at: thread.iter().filter_map(|m| m.sent_at).max(),
        unread_count: Some(
            thread
                .iter()
                .filter(|m| m.party != Party::Seller && !m.read)
                .count() as u32,
        ),
        attachment_count: Some(attachments(None)),
        buyer_attachment_count: Some(attachments(Some(Party::Buyer))),
        last_buyer_message: last_from(Party::Buyer),
        last_seller_message: last_from(Party::Seller),
        last_mediator_message: last_from(Party::Mediator),
    }
}
