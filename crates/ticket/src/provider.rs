use crate::service::TicketService;
use async_trait::async_trait;
use nimbus_web::HttpContext;
use nimbus_web::auth::{AuthProvider, AuthResult, ScopedRestUser, UserStore};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Name the ticket provider is registered under.
pub const TICKET_PROVIDER: &str = "websocket";

/// Query parameter carrying the ticket.
pub const TICKET_PARAM: &str = "ticket";

/// Authenticates a request by the ticket in its query. Every ticket is accepted once; the
/// user is narrowed to the scopes the ticket was issued for.
pub struct TicketAuthProvider {
    service: Arc<TicketService>,
    users: Arc<dyn UserStore>,
}

impl fmt::Debug for TicketAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketAuthProvider").field("service", &self.service).finish_non_exhaustive()
    }
}

impl TicketAuthProvider {
    pub fn new(service: Arc<TicketService>, users: Arc<dyn UserStore>) -> Self {
        Self { service, users }
    }
}

#[async_trait]
impl AuthProvider for TicketAuthProvider {
    async fn authenticate(&self, ctx: &HttpContext) -> AuthResult {
        let Some(token) = ctx.query_param(TICKET_PARAM) else {
            return AuthResult::NoCredentials;
        };

        let ticket = match self.service.consume(token) {
            Ok(ticket) => ticket,
            Err(e) => {
                debug!(cause = %e, path = ctx.path(), "rejected websocket ticket");
                return AuthResult::InvalidCredentials;
            }
        };
        let Some(user) = self.users.find_user(ticket.subject()) else {
            debug!(subject = ticket.subject(), "websocket ticket for unknown user");
            return AuthResult::InvalidCredentials;
        };

        AuthResult::Authenticated(Arc::new(ScopedRestUser::new(user, ticket.scopes().clone())))
    }
}
