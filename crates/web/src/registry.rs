use crate::auth::{AuthProviderRegistry, AuthenticationPreProcessor};
use crate::descriptor::{HandlerDescriptor, RegisteredHandler, UPGRADE};
use crate::error::RegistrationError;
use crate::params::ParamSource;
use crate::tree::{HandlerTree, NodeId, PathNode, SegmentKind};
use arc_swap::ArcSwap;
use http::Method;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type Tree = HandlerTree<Arc<RegisteredHandler>>;

/// The handlers registered on the node a request path resolved to.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    template: String,
    params: Vec<(String, String)>,
    handlers: Vec<Arc<RegisteredHandler>>,
}

impl RouteMatch {
    /// The registered path template, e.g. `/api/v3/service/{name}`.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn into_params(self) -> Vec<(String, String)> {
        self.params
    }

    pub fn handlers(&self) -> &[Arc<RegisteredHandler>] {
        &self.handlers
    }

    /// The handler for `method`. Upgrade requests prefer an [`UPGRADE`] handler over `GET`,
    /// `HEAD` falls back to `GET`.
    pub fn handler(&self, method: &Method, upgrade: bool) -> Option<&Arc<RegisteredHandler>> {
        let exact = |method: &Method| self.handlers.iter().find(|handler| handler.method() == method);

        if upgrade
            && method == Method::GET
            && let Some(handler) = exact(&*UPGRADE)
        {
            return Some(handler);
        }
        exact(method).or_else(|| exact(&Method::GET).filter(|_| method == Method::HEAD))
    }
}

/// All registered handlers, organized as a dispatch tree.
///
/// Readers load the current tree without locking. Writers serialize on a mutex, mutate a
/// copy and swap it in.
pub struct HandlerRegistry {
    tree: ArcSwap<Tree>,
    writer: Mutex<()>,
    auth: Arc<AuthProviderRegistry>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry").field("tree", &self.tree.load()).finish_non_exhaustive()
    }
}

impl HandlerRegistry {
    pub fn new(auth: Arc<AuthProviderRegistry>) -> Self {
        Self { tree: ArcSwap::from_pointee(Tree::new()), writer: Mutex::new(()), auth }
    }

    pub fn auth_providers(&self) -> &Arc<AuthProviderRegistry> {
        &self.auth
    }

    pub fn register(&self, descriptor: HandlerDescriptor) -> Result<(), RegistrationError> {
        let (path, mut handler) = descriptor.into_parts();
        if let Some(requirement) = handler.config.authentication.clone() {
            let processor = AuthenticationPreProcessor::new(Arc::clone(&self.auth), requirement);
            handler.config.processors.pre.insert(0, Arc::new(processor));
        }

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut tree = Tree::clone(&self.tree.load());

        let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
        let mut current = tree.root();
        let mut template_params = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            let invalid = || RegistrationError::InvalidSegment { path: path.clone(), segment: (*segment).to_owned() };
            let node = PathNode::parse(segment).ok_or_else(invalid)?;

            if node.consumes_remaining_path() && index + 1 != segments.len() {
                return Err(RegistrationError::WildcardNotLast { path });
            }
            if node.kind() != SegmentKind::Static
                && let Some(existing) = tree
                    .children(current)
                    .iter()
                    .filter_map(|&child| tree.path_node(child))
                    .find(|existing| existing.kind() == node.kind() && existing.path_id() != node.path_id())
            {
                return Err(RegistrationError::AmbiguousSegment { path: path.clone(), segment: node.display_name(), existing: existing.display_name() });
            }

            if node.kind() != SegmentKind::Static {
                template_params.push(node.path_id().to_owned());
            }
            current = tree.register_child_node(current, node).ok_or_else(invalid)?;
        }

        let unknown = handler.config.params.iter().find_map(|source| match source {
            ParamSource::Path(name) if !template_params.contains(name) => Some(name.clone()),
            _ => None,
        });
        if let Some(name) = unknown {
            return Err(RegistrationError::UnknownPathParameter { path, name });
        }

        let Some(node) = tree.path_node_mut(current) else {
            return Err(RegistrationError::InvalidSegment { path, segment: String::new() });
        };
        if node.handlers().iter().any(|registered| registered.method == handler.method) {
            return Err(RegistrationError::DuplicateHandler { path, method: handler.method });
        }

        debug!(path = %path, method = %handler.method, "registered handler");
        node.handlers_mut().push(Arc::new(handler));
        self.tree.store(Arc::new(tree));
        Ok(())
    }

    /// Removes the handler for `method` on the template `path`, pruning nodes left without
    /// handlers and children.
    pub fn unregister(&self, path: &str, method: &Method) -> bool {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut tree = Tree::clone(&self.tree.load());

        let Some(mut current) = locate(&tree, path) else {
            return false;
        };
        let Some(node) = tree.path_node_mut(current) else {
            return false;
        };
        let before = node.handlers().len();
        node.handlers_mut().retain(|handler| handler.method() != method);
        if node.handlers().len() == before {
            return false;
        }

        while let Some(parent) = tree.parent_node(current) {
            let prunable = tree.children(current).is_empty() && tree.path_node(current).is_some_and(|node| !node.any_handler_registered());
            if !prunable {
                break;
            }
            tree.unregister_child_node(parent, current);
            current = parent;
        }

        debug!(path, %method, "unregistered handler");
        self.tree.store(Arc::new(tree));
        true
    }

    /// Resolves a raw request path. Paths ending on a node without handlers are misses.
    pub fn find(&self, path: &str) -> Option<RouteMatch> {
        let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
        self.find_segments(&segments)
    }

    /// Resolves already decoded path segments.
    pub fn find_segments<S: AsRef<str>>(&self, segments: &[S]) -> Option<RouteMatch> {
        let tree = self.tree.load();
        let found = tree.find_segments(segments)?;
        let handlers = tree.path_node(found.node)?.handlers().to_vec();
        if handlers.is_empty() {
            return None;
        }
        Some(RouteMatch { template: tree.display_path(found.node), params: found.params, handlers })
    }

    /// Every registered (template, method) pair in breadth first order.
    pub fn handlers(&self) -> Vec<(String, Method)> {
        let tree = self.tree.load();
        let mut handlers = Vec::new();
        tree.visit_full_tree(tree.root(), |id, node| {
            for handler in node.handlers() {
                handlers.push((tree.display_path(id), handler.method().clone()));
            }
        });
        handlers
    }
}

/// The node registered for the template `path`, compared structurally.
fn locate(tree: &Tree, path: &str) -> Option<NodeId> {
    let mut current = tree.root();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        let node: PathNode<Arc<RegisteredHandler>> = PathNode::parse(segment)?;
        current = tree.children(current).iter().copied().find(|&child| tree.path_node(child) == Some(&node))?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::endpoint_fn;
    use crate::problem::json_response;
    use http::StatusCode;

    fn descriptor(method: Method, path: &str) -> HandlerDescriptor {
        let name = format!("{method} {path}");
        HandlerDescriptor::builder(method, path).handler(endpoint_fn(move |_ctx, _params| {
            let name = name.clone();
            Box::pin(async move { Ok(json_response(StatusCode::OK, &name)) })
        }))
    }

    fn registry() -> HandlerRegistry {
        HandlerRegistry::new(Arc::new(AuthProviderRegistry::new()))
    }

    #[test]
    fn two_methods_share_one_node() {
        let registry = registry();
        registry.register(descriptor(Method::GET, "/api/v3/node")).unwrap();
        registry.register(descriptor(Method::POST, "/api/v3/node")).unwrap();

        let found = registry.find("/api/v3/node").unwrap();
        assert_eq!(found.template(), "/api/v3/node");
        assert_eq!(found.handlers().len(), 2);
        assert!(found.handler(&Method::POST, false).is_some());
        assert!(found.handler(&Method::DELETE, false).is_none());
        assert_eq!(found.handler(&Method::HEAD, false).unwrap().method(), Method::GET);
    }

    #[test]
    fn rejects_conflicts() {
        let registry = registry();
        registry.register(descriptor(Method::GET, "/api/v3/group/{name}")).unwrap();

        assert!(matches!(registry.register(descriptor(Method::GET, "/api/v3/group/{name}")), Err(RegistrationError::DuplicateHandler { .. })));
        assert!(matches!(registry.register(descriptor(Method::GET, "/api/v3/group/{id}")), Err(RegistrationError::AmbiguousSegment { .. })));
        assert!(matches!(registry.register(descriptor(Method::GET, "/files/{*rest}/meta")), Err(RegistrationError::WildcardNotLast { .. })));
        assert!(matches!(registry.register(descriptor(Method::GET, "/api/{}")), Err(RegistrationError::InvalidSegment { .. })));

        registry.register(descriptor(Method::DELETE, "/api/v3/group/{name}")).unwrap();
        registry.register(descriptor(Method::GET, "/api/v3/group/{name}/{*rest}")).unwrap();
        assert!(matches!(registry.register(descriptor(Method::GET, "/api/v3/group/{name}/{*other}")), Err(RegistrationError::AmbiguousSegment { .. })));
    }

    #[test]
    fn path_params_must_name_a_template_segment() {
        let registry = registry();
        let with_param = |path: &str, name: &str| {
            HandlerDescriptor::get(path)
                .param(ParamSource::path(name))
                .handler(endpoint_fn(|_ctx, _params| Box::pin(async { Ok(json_response(StatusCode::OK, "found")) })))
        };

        let result = registry.register(with_param("/api/v3/x/{a}", "typo"));
        assert!(matches!(result, Err(RegistrationError::UnknownPathParameter { ref name, .. }) if name == "typo"));
        assert!(registry.find("/api/v3/x/1").is_none());

        registry.register(with_param("/api/v3/x/{a}", "a")).unwrap();
        registry.register(with_param("/files/{*rest}", "rest")).unwrap();
    }

    #[test]
    fn failed_registration_leaves_the_tree_untouched() {
        let registry = registry();
        registry.register(descriptor(Method::GET, "/a/{x}")).unwrap();
        let _ = registry.register(descriptor(Method::GET, "/a/{y}/b/c"));

        assert_eq!(registry.handlers(), vec![("/a/{x}".to_owned(), Method::GET)]);
        assert!(registry.find("/a/1/b/c").is_none());
    }

    #[test]
    fn upgrade_requests_prefer_the_upgrade_handler() {
        let registry = registry();
        registry.register(descriptor(Method::GET, "/api/v3/node/liveConsole")).unwrap();
        registry.register(HandlerDescriptor::upgrade("/api/v3/node/liveConsole").handler(endpoint_fn(|_ctx, _params| {
            Box::pin(async { Ok(json_response(StatusCode::OK, "upgrade")) })
        })))
        .unwrap();

        let found = registry.find("/api/v3/node/liveConsole").unwrap();
        assert_eq!(found.handler(&Method::GET, true).unwrap().method(), &*UPGRADE);
        assert_eq!(found.handler(&Method::GET, false).unwrap().method(), Method::GET);
    }

    #[test]
    fn intermediate_nodes_are_misses() {
        let registry = registry();
        registry.register(descriptor(Method::GET, "/api/v3/service/{name}/log")).unwrap();

        assert!(registry.find("/api/v3/service/Lobby-1").is_none());
        let found = registry.find("/api/v3/service/Lobby-1/log").unwrap();
        assert_eq!(found.params(), [("name".to_owned(), "Lobby-1".to_owned())]);
    }

    #[test]
    fn unregister_prunes_empty_branches() {
        let registry = registry();
        registry.register(descriptor(Method::GET, "/api/v3/node")).unwrap();
        registry.register(descriptor(Method::GET, "/api/v3/service/{name}/log")).unwrap();
        registry.register(descriptor(Method::POST, "/api/v3/service/{name}/log")).unwrap();

        assert!(registry.unregister("/api/v3/service/{name}/log", &Method::GET));
        assert!(!registry.unregister("/api/v3/service/{name}/log", &Method::GET));
        assert!(registry.find("/api/v3/service/x/log").is_some());

        assert!(registry.unregister("/api/v3/service/{name}/log", &Method::POST));
        assert_eq!(registry.handlers(), vec![("/api/v3/node".to_owned(), Method::GET)]);
        assert_eq!(registry.tree.load().len(), 4);
    }

    #[test]
    fn snapshots_survive_concurrent_registration() {
        let registry = registry();
        registry.register(descriptor(Method::GET, "/a")).unwrap();
        let snapshot = registry.tree.load_full();

        registry.register(descriptor(Method::GET, "/b")).unwrap();
        assert!(snapshot.find("/b").is_none());
        assert!(registry.find("/b").is_some());
    }
}
