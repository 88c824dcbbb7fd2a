use crate::error::TicketError;
use crate::service::TicketService;
use async_trait::async_trait;
use http::{Response, StatusCode};
use nimbus_web::{BoundParams, Endpoint, HandlerDescriptor, HandlerError, HttpContext, ParamSource, ProblemDetails, ResponseBody, json_response};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const TICKET_PATH: &str = "/api/v3/websocket/ticket";

/// Scope needed to request tickets.
pub const TICKET_SCOPE: &str = "cloudnet_rest:websocket_ticket";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TicketRequest {
    scopes: BTreeSet<String>,
}

/// Issues a ticket for the authenticated user.
#[derive(Debug)]
pub struct IssueTicket {
    service: Arc<TicketService>,
}

impl IssueTicket {
    pub fn new(service: Arc<TicketService>) -> Self {
        Self { service }
    }

    /// `POST` [`TICKET_PATH`], authenticated by `providers` with [`TICKET_SCOPE`].
    pub fn descriptor<P, S>(service: Arc<TicketService>, providers: P) -> HandlerDescriptor
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HandlerDescriptor::post(TICKET_PATH)
            .authenticate(providers, [TICKET_SCOPE])
            .param(ParamSource::user())
            .param(ParamSource::body::<TicketRequest>())
            .handler(Self::new(service))
    }
}

#[async_trait]
impl Endpoint for IssueTicket {
    async fn handle(&self, _ctx: &mut HttpContext, mut params: BoundParams) -> Result<Response<ResponseBody>, HandlerError> {
        let user = params.user(0).ok_or_else(|| ProblemDetails::new(StatusCode::UNAUTHORIZED, "missing-authentication"))?;
        let request: TicketRequest = params.take(1).unwrap_or_default();

        match self.service.issue(user.as_ref(), &request.scopes) {
            Ok(ticket) => Ok(json_response(StatusCode::OK, &ticket)),
            Err(TicketError::InvalidScopes { denied }) => Err(ProblemDetails::new(StatusCode::FORBIDDEN, "websocket-ticket-creation-invalid-scopes")
                .title("WebSocket Ticket Creation Requested Invalid Scopes")
                .detail(format!("the scopes {denied:?} may not be requested for websocket tickets"))
                .into()),
            Err(e) => Err(ProblemDetails::bad_request("websocket-ticket-creation-failed", e.to_string()).into()),
        }
    }
}
