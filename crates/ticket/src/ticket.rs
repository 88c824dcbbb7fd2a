//! The ticket value and its canonical payload.
//!
//! The payload is `millis:subject` followed by `;scope` for every scope in ascending order.
//! Parsing accepts exactly that form: no empty scopes, no duplicates, no unsorted lists.

use crate::error::TicketError;
use serde::Serialize;
use std::collections::BTreeSet;

const PROPERTY_DELIMITER: char = ':';
const SCOPE_DELIMITER: char = ';';

/// A signed ticket as handed out to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketTicket {
    #[serde(skip)]
    subject: String,
    #[serde(rename = "creationTime")]
    issued_at: u64,
    #[serde(rename = "secret")]
    token: String,
    scopes: BTreeSet<String>,
}

impl WebSocketTicket {
    pub(crate) fn new(subject: String, issued_at: u64, scopes: BTreeSet<String>, token: String) -> Self {
        Self { subject, issued_at, token, scopes }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Milliseconds since the unix epoch.
    pub fn issued_at(&self) -> u64 {
        self.issued_at
    }

    /// Empty for an unrestricted ticket.
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

pub(crate) fn encode_payload(issued_at: u64, subject: &str, scopes: &BTreeSet<String>) -> String {
    let mut payload = format!("{issued_at}{PROPERTY_DELIMITER}{subject}");
    for scope in scopes {
        payload.push(SCOPE_DELIMITER);
        payload.push_str(scope);
    }
    payload
}

pub(crate) fn parse_payload(payload: &str) -> Result<(u64, String, BTreeSet<String>), TicketError> {
    let (millis, rest) = payload.split_once(PROPERTY_DELIMITER).ok_or_else(|| TicketError::malformed("missing subject"))?;
    if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TicketError::malformed("creation time is not a number"));
    }
    let issued_at = millis.parse().map_err(|_e| TicketError::malformed("creation time out of range"))?;

    let mut parts = rest.split(SCOPE_DELIMITER);
    let subject = parts.next().filter(|subject| !subject.is_empty()).ok_or_else(|| TicketError::malformed("empty subject"))?;

    let mut scopes = BTreeSet::new();
    for scope in parts {
        if scope.is_empty() {
            return Err(TicketError::malformed("empty scope"));
        }
        if scopes.last().is_some_and(|last: &String| last.as_str() >= scope) {
            return Err(TicketError::malformed("scopes are not in canonical order"));
        }
        scopes.insert(scope.to_owned());
    }

    Ok((issued_at, subject.to_owned(), scopes))
}

pub(crate) fn valid_subject(subject: &str) -> bool {
    !subject.is_empty() && !subject.contains(SCOPE_DELIMITER)
}

pub(crate) fn valid_scope(scope: &str) -> bool {
    !scope.is_empty() && !scope.contains(SCOPE_DELIMITER)
}
