use crate::tree::{PathNode, SegmentKind};
use std::collections::VecDeque;
use std::fmt;

/// Index of a node inside its [`HandlerTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Slot<T> {
    path_node: PathNode<T>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Result of walking a request path down the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    pub node: NodeId,
    /// Values captured by parameter and wildcard segments, in path order.
    pub params: Vec<(String, String)>,
}

/// Arena backed tree of [`PathNode`]s rooted at an empty literal node.
#[derive(Clone)]
pub struct HandlerTree<T> {
    slots: Vec<Option<Slot<T>>>,
    free: Vec<usize>,
}

impl<T> Default for HandlerTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandlerTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths = Vec::new();
        self.visit_full_tree(self.root(), |id, node| {
            if node.any_handler_registered() {
                paths.push(self.display_path(id));
            }
        });
        f.debug_struct("HandlerTree").field("nodes", &self.len()).field("routes", &paths).finish()
    }
}

impl<T> HandlerTree<T> {
    pub fn new() -> Self {
        let root = Slot { path_node: PathNode::root(), parent: None, children: Vec::new() };
        Self { slots: vec![Some(root)], free: Vec::new() }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of live nodes, the root included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    fn slot(&self, id: NodeId) -> Option<&Slot<T>> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot<T>> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn path_node(&self, id: NodeId) -> Option<&PathNode<T>> {
        self.slot(id).map(|slot| &slot.path_node)
    }

    pub fn path_node_mut(&mut self, id: NodeId) -> Option<&mut PathNode<T>> {
        self.slot_mut(id).map(|slot| &mut slot.path_node)
    }

    pub fn parent_node(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).and_then(|slot| slot.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map_or(&[], |slot| &slot.children)
    }

    /// Adds `node` below `parent`, or returns the existing equal child.
    ///
    /// Returns `None` only when `parent` is not a live node.
    pub fn register_child_node(&mut self, parent: NodeId, node: PathNode<T>) -> Option<NodeId> {
        if let Some(existing) = self.find_equal_child(parent, &node) {
            return Some(existing);
        }
        self.slot(parent)?;

        let slot = Slot { path_node: node, parent: Some(parent), children: Vec::new() };
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(slot));
                NodeId(self.slots.len() - 1)
            }
        };

        let mut children = std::mem::take(&mut self.slot_mut(parent)?.children);
        children.push(id);
        children.sort_by(|a, b| self.compare(*a, *b));
        self.slot_mut(parent)?.children = children;
        Some(id)
    }

    fn compare(&self, a: NodeId, b: NodeId) -> std::cmp::Ordering {
        match (self.path_node(a), self.path_node(b)) {
            (Some(a), Some(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }

    fn find_equal_child(&self, parent: NodeId, node: &PathNode<T>) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|&child| self.path_node(child) == Some(node))
    }

    /// First child of `parent`, in sibling order, whose path node satisfies `predicate`.
    pub fn find_matching_child_node<P>(&self, parent: NodeId, mut predicate: P) -> Option<NodeId>
    where
        P: FnMut(&PathNode<T>) -> bool,
    {
        self.children(parent).iter().copied().find(|&child| self.path_node(child).is_some_and(&mut predicate))
    }

    /// Removes `child` and its whole subtree from `parent`.
    pub fn unregister_child_node(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(slot) = self.slot_mut(parent) else {
            return false;
        };
        let Some(position) = slot.children.iter().position(|&id| id == child) else {
            return false;
        };
        slot.children.remove(position);
        self.release_subtree(child);
        true
    }

    /// Drops every child of `parent`, keeping `parent` itself.
    pub fn remove_all_children(&mut self, parent: NodeId) {
        let children = self.slot_mut(parent).map(|slot| std::mem::take(&mut slot.children)).unwrap_or_default();
        for child in children {
            self.release_subtree(child);
        }
    }

    fn release_subtree(&mut self, id: NodeId) {
        let mut queue = VecDeque::from([id]);
        while let Some(id) = queue.pop_front() {
            if let Some(slot) = self.slots.get_mut(id.0).and_then(Option::take) {
                queue.extend(slot.children);
                self.free.push(id.0);
            }
        }
    }

    /// Breadth first walk over `start` and every node below it, `start` first.
    pub fn visit_full_tree<F>(&self, start: NodeId, mut visitor: F)
    where
        F: FnMut(NodeId, &PathNode<T>),
    {
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            if let Some(slot) = self.slot(id) {
                visitor(id, &slot.path_node);
                queue.extend(slot.children.iter().copied());
            }
        }
    }

    /// The template path of `id`, e.g. `/api/v3/service/{name}`.
    pub fn display_path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            if id != self.root()
                && let Some(node) = self.path_node(id)
            {
                segments.push(node.display_name());
            }
            current = self.parent_node(id);
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    /// Walks `path` from the root, splitting it on `/` without decoding.
    pub fn find(&self, path: &str) -> Option<PathMatch> {
        let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
        self.find_segments(&segments)
    }

    /// Walks `segments` from the root. Each segment goes to the first matching child; a
    /// wildcard takes the remaining segments joined by `/`. A segment without a matching child
    /// ends the walk with no result.
    pub fn find_segments<S: AsRef<str>>(&self, segments: &[S]) -> Option<PathMatch> {
        let mut current = self.root();
        let mut params = Vec::new();

        for (index, segment) in segments.iter().map(AsRef::<str>::as_ref).enumerate() {
            let child = self.find_matching_child_node(current, |node| node.matches(segment))?;
            let node = self.path_node(child)?;
            match node.kind() {
                SegmentKind::Static => {}
                SegmentKind::Parameter => params.push((node.path_id().to_owned(), segment.to_owned())),
                SegmentKind::Wildcard => {
                    let rest: Vec<&str> = segments[index..].iter().map(AsRef::<str>::as_ref).collect();
                    params.push((node.path_id().to_owned(), rest.join("/")));
                    return Some(PathMatch { node: child, params });
                }
            }
            current = child;
        }

        Some(PathMatch { node: current, params })
    }
}
