use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Holding this scope satisfies every scope requirement.
pub const ADMIN_SCOPE: &str = "global:admin";

/// An authenticated principal.
pub trait RestUser: fmt::Debug + Send + Sync {
    fn id(&self) -> &str;

    fn has_scope(&self, scope: &str) -> bool;

    fn scopes(&self) -> BTreeSet<String>;
}

/// Whether `user` may call a handler requiring `required`.
///
/// An empty requirement admits everyone, the admin scope admits everything, otherwise any one
/// of the required scopes is enough.
pub fn satisfies(user: &dyn RestUser, required: &BTreeSet<String>) -> bool {
    required.is_empty() || user.has_scope(ADMIN_SCOPE) || required.iter().any(|scope| user.has_scope(scope))
}

/// A user with a fixed scope set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleRestUser {
    id: String,
    scopes: BTreeSet<String>,
}

impl SimpleRestUser {
    pub fn new<I, S>(id: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { id: id.into(), scopes: scopes.into_iter().map(Into::into).collect() }
    }
}

impl RestUser for SimpleRestUser {
    fn id(&self) -> &str {
        &self.id
    }

    fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    fn scopes(&self) -> BTreeSet<String> {
        self.scopes.clone()
    }
}

/// Narrows a user to a subset of its scopes. An empty subset keeps every scope of the
/// delegate.
#[derive(Debug, Clone)]
pub struct ScopedRestUser {
    delegate: Arc<dyn RestUser>,
    scopes: BTreeSet<String>,
}

impl ScopedRestUser {
    pub fn new(delegate: Arc<dyn RestUser>, scopes: BTreeSet<String>) -> Self {
        Self { delegate, scopes }
    }
}

impl RestUser for ScopedRestUser {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn has_scope(&self, scope: &str) -> bool {
        (self.scopes.is_empty() || self.scopes.contains(scope)) && (self.delegate.has_scope(scope) || self.delegate.has_scope(ADMIN_SCOPE))
    }

    fn scopes(&self) -> BTreeSet<String> {
        let delegated = self.delegate.scopes();
        if self.scopes.is_empty() {
            delegated
        } else if delegated.contains(ADMIN_SCOPE) {
            self.scopes.clone()
        } else {
            delegated.intersection(&self.scopes).cloned().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required(scopes: &[&str]) -> BTreeSet<String> {
        scopes.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn scope_requirements() {
        let user = SimpleRestUser::new("alice", ["cloudnet_rest:node_read"]);

        assert!(satisfies(&user, &required(&[])));
        assert!(satisfies(&user, &required(&["cloudnet_rest:node_read", "cloudnet_rest:node_write"])));
        assert!(!satisfies(&user, &required(&["cloudnet_rest:node_write"])));

        let admin = SimpleRestUser::new("root", [ADMIN_SCOPE]);
        assert!(satisfies(&admin, &required(&["anything"])));
    }

    #[test]
    fn scoped_user_intersects() {
        let delegate: Arc<dyn RestUser> = Arc::new(SimpleRestUser::new("alice", ["a", "b"]));
        let scoped = ScopedRestUser::new(Arc::clone(&delegate), required(&["b", "c"]));

        assert_eq!(scoped.id(), "alice");
        assert!(!scoped.has_scope("a"));
        assert!(scoped.has_scope("b"));
        assert!(!scoped.has_scope("c"));
        assert_eq!(scoped.scopes(), required(&["b"]));

        let unrestricted = ScopedRestUser::new(delegate, BTreeSet::new());
        assert!(unrestricted.has_scope("a"));
        assert_eq!(unrestricted.scopes(), required(&["a", "b"]));
    }

    #[test]
    fn scoped_admin_keeps_requested_scopes() {
        let admin: Arc<dyn RestUser> = Arc::new(SimpleRestUser::new("root", [ADMIN_SCOPE]));
        let scoped = ScopedRestUser::new(admin, required(&["node:read"]));

        assert!(scoped.has_scope("node:read"));
        assert!(!scoped.has_scope("node:write"));
        assert!(!satisfies(&scoped, &required(&["node:write"])));
        assert_eq!(scoped.scopes(), required(&["node:read"]));
    }
}
