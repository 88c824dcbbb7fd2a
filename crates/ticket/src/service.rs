//! Issuing and verifying tickets.
//!
//! A token is `base64(payload) + "." + hex(hmac_sha256(base64(payload)))`. Validity is
//! computed from the token itself; the only state is the replay guard remembering consumed
//! tokens until they expire.

use crate::clock::{Clock, SystemClock};
use crate::config::TicketConfig;
use crate::error::TicketError;
use crate::key::TicketKey;
use crate::ticket::{WebSocketTicket, encode_payload, parse_payload, valid_scope, valid_subject};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hmac::Mac;
use nimbus_web::auth::{ADMIN_SCOPE, RestUser};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

const SIGNATURE_DELIMITER: char = '.';

pub struct TicketService {
    key: TicketKey,
    ttl_millis: u64,
    clock: Arc<dyn Clock>,
    /// consumed token -> expiry in epoch millis
    consumed: DashMap<String, u64>,
}

impl fmt::Debug for TicketService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketService")
            .field("ttl_millis", &self.ttl_millis)
            .field("clock", &self.clock)
            .field("consumed", &self.consumed.len())
            .finish_non_exhaustive()
    }
}

impl TicketService {
    pub fn new(key: TicketKey, ttl: Duration) -> Self {
        Self { key, ttl_millis: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX), clock: Arc::new(SystemClock), consumed: DashMap::new() }
    }

    pub fn from_config(key: TicketKey, config: &TicketConfig) -> Self {
        Self::new(key, config.ttl())
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_millis)
    }

    /// Issues a ticket for `user` restricted to `requested`. Every requested scope must be
    /// held by the user; the admin scope holds all of them. An empty request issues an
    /// unrestricted ticket.
    pub fn issue(&self, user: &dyn RestUser, requested: &BTreeSet<String>) -> Result<WebSocketTicket, TicketError> {
        if !valid_subject(user.id()) {
            return Err(TicketError::malformed("subject contains a scope delimiter"));
        }

        let is_admin = user.has_scope(ADMIN_SCOPE);
        let denied: Vec<String> =
            requested.iter().filter(|scope| !valid_scope(scope) || !(is_admin || user.has_scope(scope))).cloned().collect();
        if !denied.is_empty() {
            debug!(subject = user.id(), denied = ?denied, "refused ticket with invalid scopes");
            return Err(TicketError::InvalidScopes { denied });
        }

        let issued_at = self.clock.now_millis();
        let token = self.sign(&encode_payload(issued_at, user.id(), requested));
        trace!(subject = user.id(), scopes = ?requested, "issued websocket ticket");
        Ok(WebSocketTicket::new(user.id().to_owned(), issued_at, requested.clone(), token))
    }

    /// Checks signature, subject and age of `token`. `subject` is not checked when `None`.
    pub fn validate(&self, token: &str, subject: Option<&str>) -> Result<WebSocketTicket, TicketError> {
        let (encoded, signature) = token.split_once(SIGNATURE_DELIMITER).ok_or_else(|| TicketError::malformed("missing signature"))?;
        let signature = hex::decode(signature).map_err(|_e| TicketError::malformed("signature is not hex"))?;

        let mut mac = self.key.mac();
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature).map_err(|_e| TicketError::SignatureMismatch)?;

        let payload = STANDARD.decode(encoded).map_err(|_e| TicketError::malformed("payload is not base64"))?;
        let payload = String::from_utf8(payload).map_err(|_e| TicketError::malformed("payload is not utf-8"))?;
        let (issued_at, ticket_subject, scopes) = parse_payload(&payload)?;

        if subject.is_some_and(|subject| subject != ticket_subject) {
            return Err(TicketError::SubjectMismatch);
        }
        if self.clock.now_millis() > issued_at.saturating_add(self.ttl_millis) {
            return Err(TicketError::Expired);
        }

        Ok(WebSocketTicket::new(ticket_subject, issued_at, scopes, token.to_owned()))
    }

    pub fn verify(&self, token: &str, subject: &str) -> bool {
        self.validate(token, Some(subject)).is_ok()
    }

    /// Validates `token` and marks it used. A second call with the same token fails with
    /// [`TicketError::Replayed`] for as long as the ticket would otherwise be valid.
    pub fn consume(&self, token: &str) -> Result<WebSocketTicket, TicketError> {
        let ticket = self.validate(token, None)?;

        let now = self.clock.now_millis();
        self.consumed.retain(|_, expiry| *expiry >= now);

        match self.consumed.entry(token.to_owned()) {
            Entry::Occupied(_) => Err(TicketError::Replayed),
            Entry::Vacant(entry) => {
                entry.insert(ticket.issued_at().saturating_add(self.ttl_millis));
                Ok(ticket)
            }
        }
    }

    fn sign(&self, payload: &str) -> String {
        let encoded = STANDARD.encode(payload.as_bytes());
        let mut mac = self.key.mac();
        mac.update(encoded.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{encoded}{SIGNATURE_DELIMITER}{signature}")
    }
}
