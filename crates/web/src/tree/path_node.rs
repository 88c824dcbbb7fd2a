use std::cmp::Ordering;
use std::fmt;

/// How a path segment matches. The derived order is the sibling order: literals first,
/// then named parameters, then the wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SegmentKind {
    Static,
    Parameter,
    Wildcard,
}

/// One segment of a registered path together with the handlers registered on it.
///
/// Two path nodes are equal when kind and path id are equal; the handlers are payload.
#[derive(Clone)]
pub struct PathNode<T> {
    kind: SegmentKind,
    path_id: String,
    handlers: Vec<T>,
}

impl<T> PathNode<T> {
    pub fn new(kind: SegmentKind, path_id: impl Into<String>) -> Self {
        Self { kind, path_id: path_id.into(), handlers: Vec::new() }
    }

    pub fn root() -> Self {
        Self::new(SegmentKind::Static, "")
    }

    /// Parses a template segment: `{*name}` is a wildcard, `{name}` a parameter, anything
    /// else a literal. Returns `None` for empty segments and empty names.
    pub fn parse(segment: &str) -> Option<Self> {
        let node = match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => match name.strip_prefix('*') {
                Some(name) => Self::new(SegmentKind::Wildcard, name),
                None => Self::new(SegmentKind::Parameter, name),
            },
            None => Self::new(SegmentKind::Static, segment),
        };
        (!node.path_id.is_empty() && !node.path_id.contains(['{', '}', '/'])).then_some(node)
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn path_id(&self) -> &str {
        &self.path_id
    }

    pub fn consumes_remaining_path(&self) -> bool {
        self.kind == SegmentKind::Wildcard
    }

    pub fn display_name(&self) -> String {
        match self.kind {
            SegmentKind::Static => self.path_id.clone(),
            SegmentKind::Parameter => format!("{{{}}}", self.path_id),
            SegmentKind::Wildcard => format!("{{*{}}}", self.path_id),
        }
    }

    /// Whether this node accepts `segment` of a request path.
    pub fn matches(&self, segment: &str) -> bool {
        match self.kind {
            SegmentKind::Static => self.path_id == segment,
            SegmentKind::Parameter | SegmentKind::Wildcard => true,
        }
    }

    pub fn handlers(&self) -> &[T] {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut Vec<T> {
        &mut self.handlers
    }

    pub fn any_handler_registered(&self) -> bool {
        !self.handlers.is_empty()
    }
}

impl<T> fmt::Debug for PathNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathNode").field("segment", &self.display_name()).field("handlers", &self.handlers.len()).finish()
    }
}

impl<T> PartialEq for PathNode<T> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.path_id == other.path_id
    }
}

impl<T> Eq for PathNode<T> {}

impl<T> PartialOrd for PathNode<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PathNode<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind.cmp(&other.kind).then_with(|| self.path_id.cmp(&other.path_id))
    }
}
