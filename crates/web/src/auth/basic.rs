use crate::auth::{AuthProvider, AuthResult, UserStore};
use crate::context::HttpContext;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::AUTHORIZATION;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Name the basic provider is registered under by default.
pub const BASIC_PROVIDER: &str = "basic";

/// `Authorization: Basic base64(user:password)` checked against a [`UserStore`].
pub struct BasicAuthProvider {
    store: Arc<dyn UserStore>,
}

impl fmt::Debug for BasicAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthProvider").finish_non_exhaustive()
    }
}

impl BasicAuthProvider {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

fn credentials(ctx: &HttpContext) -> Option<Option<(String, String)>> {
    let value = ctx.header(AUTHORIZATION)?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok().and_then(|bytes| String::from_utf8(bytes).ok());
    Some(decoded.and_then(|decoded| decoded.split_once(':').map(|(user, password)| (user.to_owned(), password.to_owned()))))
}

#[async_trait]
impl AuthProvider for BasicAuthProvider {
    async fn authenticate(&self, ctx: &HttpContext) -> AuthResult {
        let Some(credentials) = credentials(ctx) else {
            return AuthResult::NoCredentials;
        };
        let Some((id, password)) = credentials else {
            trace!("malformed basic authorization header");
            return AuthResult::InvalidCredentials;
        };

        match self.store.find_user(&id) {
            Some(user) if self.store.check_password(&id, &password) => AuthResult::Authenticated(user),
            _ => AuthResult::InvalidCredentials,
        }
    }
}
