//! Short lived, HMAC signed tickets authenticating WebSocket upgrades.
//!
//! Browsers cannot set headers on a WebSocket handshake, so a client first requests a
//! ticket over a regular authenticated call and then passes it as the `ticket` query
//! parameter of the upgrade. A ticket names its subject, its creation time and optionally
//! the scopes it is restricted to, is valid for [`config::DEFAULT_TTL`] and authenticates a
//! single upgrade.
//!
//! ```no_run
//! use nimbus_ticket::{IssueTicket, TicketAuthProvider, TicketConfig, TicketService, TICKET_PROVIDER};
//! use nimbus_web::auth::{BASIC_PROVIDER, BasicAuthProvider, UserStore};
//! use nimbus_web::{Server, ServerConfig};
//! use std::sync::Arc;
//!
//! # fn users() -> Arc<dyn UserStore> { unimplemented!() }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TicketConfig::default();
//! let service = Arc::new(TicketService::from_config(config.load_key()?, &config));
//!
//! let server = Server::new(ServerConfig::default())?;
//! server.auth_providers().register(BASIC_PROVIDER, BasicAuthProvider::new(users()));
//! server.auth_providers().register(TICKET_PROVIDER, TicketAuthProvider::new(Arc::clone(&service), users()));
//! server.register(IssueTicket::descriptor(service, [BASIC_PROVIDER]))?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
mod endpoint;
pub mod error;
mod key;
mod provider;
mod service;
mod ticket;

pub use config::TicketConfig;
pub use endpoint::{IssueTicket, TICKET_PATH, TICKET_SCOPE};
pub use error::{KeyError, TicketError};
pub use key::{KEY_LEN, TicketKey};
pub use provider::{TICKET_PARAM, TICKET_PROVIDER, TicketAuthProvider};
pub use service::TicketService;
pub use ticket::WebSocketTicket;
