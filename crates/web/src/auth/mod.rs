//! Authentication: named providers turning request credentials into a [`RestUser`], and
//! the pre-processor that enforces a handler's [`AuthRequirement`].

mod basic;
mod user;

pub use basic::{BASIC_PROVIDER, BasicAuthProvider};
pub use user::{ADMIN_SCOPE, RestUser, ScopedRestUser, SimpleRestUser, satisfies};

use crate::context::HttpContext;
use crate::descriptor::AuthRequirement;
use crate::error::HandlerError;
use crate::interceptor::{Flow, PreProcessor};
use crate::problem::ProblemDetails;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use http::StatusCode;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a provider made of the request.
#[derive(Debug, Clone)]
pub enum AuthResult {
    Authenticated(Arc<dyn RestUser>),
    /// The request carries no credentials this provider understands.
    NoCredentials,
    InvalidCredentials,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, ctx: &HttpContext) -> AuthResult;
}

/// Looks users up for the credential based providers.
#[cfg_attr(test, mockall::automock)]
pub trait UserStore: Send + Sync {
    fn find_user(&self, id: &str) -> Option<Arc<dyn RestUser>>;

    fn check_password(&self, id: &str, password: &str) -> bool;
}

/// Providers by name. Lookups read a snapshot; registration swaps in a new map.
#[derive(Default)]
pub struct AuthProviderRegistry {
    providers: ArcSwap<HashMap<String, Arc<dyn AuthProvider>>>,
}

impl fmt::Debug for AuthProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers = self.providers.load();
        f.debug_struct("AuthProviderRegistry").field("providers", &providers.keys().collect::<Vec<_>>()).finish()
    }
}

impl AuthProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` under `name`, replacing a previous one of the same name.
    pub fn register(&self, name: impl Into<String>, provider: impl AuthProvider + 'static) {
        let name = name.into();
        let provider: Arc<dyn AuthProvider> = Arc::new(provider);
        self.providers.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(name.clone(), Arc::clone(&provider));
            next
        });
    }

    pub fn unregister(&self, name: &str) -> bool {
        let previous = self.providers.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(name);
            next
        });
        previous.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AuthProvider>> {
        self.providers.load().get(name).cloned()
    }

    /// Tries the providers of `requirement` in order and checks the scopes of the user.
    pub async fn authenticate(&self, ctx: &HttpContext, requirement: &AuthRequirement) -> Result<Arc<dyn RestUser>, ProblemDetails> {
        for name in requirement.providers() {
            let Some(provider) = self.get(name) else {
                warn!(provider = %name, "handler requires an unknown authentication provider");
                continue;
            };

            match provider.authenticate(ctx).await {
                AuthResult::Authenticated(user) => {
                    if !satisfies(user.as_ref(), requirement.scopes()) {
                        debug!(user = user.id(), path = ctx.path(), "user lacks the required scopes");
                        return Err(ProblemDetails::new(StatusCode::FORBIDDEN, "missing-scopes")
                            .detail(format!("one of the scopes {:?} is required", requirement.scopes())));
                    }
                    return Ok(user);
                }
                AuthResult::InvalidCredentials => {
                    return Err(ProblemDetails::new(StatusCode::UNAUTHORIZED, "invalid-credentials")
                        .detail(format!("the credentials for {name} authentication are invalid")));
                }
                AuthResult::NoCredentials => {}
            }
        }

        Err(ProblemDetails::new(StatusCode::UNAUTHORIZED, "missing-authentication").detail("the request carries no usable credentials"))
    }
}

/// Runs first for every handler with an [`AuthRequirement`] and stores the user on the
/// context.
pub struct AuthenticationPreProcessor {
    providers: Arc<AuthProviderRegistry>,
    requirement: AuthRequirement,
}

impl fmt::Debug for AuthenticationPreProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationPreProcessor").field("requirement", &self.requirement).finish_non_exhaustive()
    }
}

impl AuthenticationPreProcessor {
    pub fn new(providers: Arc<AuthProviderRegistry>, requirement: AuthRequirement) -> Self {
        Self { providers, requirement }
    }
}

#[async_trait]
impl PreProcessor for AuthenticationPreProcessor {
    async fn pre_process(&self, ctx: &mut HttpContext) -> Result<Flow, HandlerError> {
        match self.providers.authenticate(ctx, &self.requirement).await {
            Ok(user) => {
                ctx.set_user(user);
                Ok(Flow::Continue)
            }
            Err(problem) => Ok(Flow::Handled(problem.into_response())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;

    fn context() -> HttpContext {
        HttpContext::from_request(Request::builder().uri("/api/v3/node").body(Bytes::new()).unwrap())
    }

    fn provider(result: AuthResult) -> MockAuthProvider {
        let mut provider = MockAuthProvider::new();
        provider.expect_authenticate().returning(move |_| result.clone());
        provider
    }

    fn user(scopes: &[&str]) -> Arc<dyn RestUser> {
        Arc::new(SimpleRestUser::new("alice", scopes.iter().copied()))
    }

    #[tokio::test]
    async fn providers_are_tried_in_order() {
        let registry = AuthProviderRegistry::new();
        registry.register("first", provider(AuthResult::NoCredentials));
        registry.register("second", provider(AuthResult::Authenticated(user(&["node_read"]))));

        let requirement = AuthRequirement::new(["unknown", "first", "second"], ["node_read"]);
        let authenticated = registry.authenticate(&context(), &requirement).await.unwrap();
        assert_eq!(authenticated.id(), "alice");
    }

    #[tokio::test]
    async fn failure_statuses() {
        let registry = AuthProviderRegistry::new();
        registry.register("none", provider(AuthResult::NoCredentials));
        registry.register("invalid", provider(AuthResult::InvalidCredentials));
        registry.register("weak", provider(AuthResult::Authenticated(user(&["node_read"]))));

        let missing = registry.authenticate(&context(), &AuthRequirement::new(["none"], Vec::<String>::new())).await.unwrap_err();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let invalid = registry.authenticate(&context(), &AuthRequirement::new(["invalid", "weak"], ["node_read"])).await.unwrap_err();
        assert_eq!(invalid.kind(), "invalid-credentials");

        let forbidden = registry.authenticate(&context(), &AuthRequirement::new(["weak"], ["node_write"])).await.unwrap_err();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn pre_processor_stores_the_user() {
        let registry = Arc::new(AuthProviderRegistry::new());
        registry.register("static", provider(AuthResult::Authenticated(user(&[ADMIN_SCOPE]))));
        let processor = AuthenticationPreProcessor::new(Arc::clone(&registry), AuthRequirement::new(["static"], ["node_write"]));

        let mut ctx = context();
        assert!(matches!(processor.pre_process(&mut ctx).await.unwrap(), Flow::Continue));
        assert_eq!(ctx.user().unwrap().id(), "alice");

        assert!(registry.unregister("static"));
        let mut ctx = context();
        assert!(matches!(processor.pre_process(&mut ctx).await.unwrap(), Flow::Handled(ref response) if response.status() == StatusCode::UNAUTHORIZED));
        assert!(ctx.user().is_none());
    }
}
