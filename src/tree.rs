//! The retained node graph.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. A node is owned by its parent's
//! child list; the `parent` link is a plain index used for traversal only.

use crate::backend::Handle;
use crate::boundary::BoundaryState;
use crate::descriptor::{Props, WidgetKind};
use crate::environment::Environment;
use crate::identity::{SlotKey, Tag, TagMap, TagValue};
use crate::layout::{LayoutHints, LayoutSpec};
use crate::rect::Rect;
use core::fmt;
use core::ops::{Index, IndexMut};

/// Index of a node in a [`NodeTree`].
///
/// Ids are only meaningful for the tree that issued them. A removed node's slot may be reused, but
/// with a new generation, so stale ids never alias a live node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

/// What produced a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Stands in for the hosting surface.
    Root,
    Leaf,
    Container,
    /// A controller boundary; its children are the roots of its panes.
    Boundary,
}

/// A retained node.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) widget: WidgetKind,
    pub(crate) slot: SlotKey,
    pub(crate) props: Props,
    pub(crate) layout: Option<LayoutSpec>,
    pub(crate) hints: LayoutHints,
    pub(crate) environment: Environment,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Native handle; absent until first attach.
    pub(crate) handle: Option<Handle>,
    /// Frame returned by the layout collaborator. Carried over on reuse.
    pub(crate) frame: Option<Rect>,
    pub(crate) reused: bool,
    pub(crate) boundary: Option<BoundaryState>,
    /// Tags of the keyed children this node's expansion produced.
    pub(crate) tags: TagMap,
    /// This node's entry in its parent's tag map.
    pub(crate) tag: Option<Tag>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, widget: WidgetKind, slot: SlotKey, environment: Environment) -> Node {
        Node {
            kind,
            widget,
            slot,
            props: Props::new(),
            layout: None,
            hints: LayoutHints::default(),
            environment,
            parent: None,
            children: Vec::new(),
            handle: None,
            frame: None,
            reused: false,
            boundary: None,
            tags: TagMap::new(),
            tag: None,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn widget(&self) -> &WidgetKind {
        &self.widget
    }

    pub fn slot(&self) -> SlotKey {
        self.slot
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn hints(&self) -> &LayoutHints {
        &self.hints
    }

    /// The environment snapshot in effect when this node was built.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn handle(&self) -> Option<Handle> {
        self.handle
    }

    pub fn frame(&self) -> Option<Rect> {
        self.frame
    }

    /// Returns true if this node took over the native handle of a node from the previous pass.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn is_boundary(&self) -> bool {
        self.kind == NodeKind::Boundary
    }

    pub fn boundary(&self) -> Option<&BoundaryState> {
        self.boundary.as_ref()
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// An arena of nodes with a single root.
#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<NodeId>,
    len: usize,
}

impl NodeTree {
    pub fn new() -> NodeTree {
        NodeTree::default()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Inserts a detached node.
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Inserts a node as the last child of `parent`.
    pub(crate) fn append(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        node.parent = Some(parent);
        let id = self.insert(node);
        if let Some(parent) = self.get_mut(parent) {
            parent.children.push(id);
        }
        id
    }

    /// Removes a single node, without touching its children or its parent's child list.
    fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        if self.root == Some(id) {
            self.root = None;
        }
        Some(node)
    }

    /// Removes a node and all of its descendants and unlinks it from its parent.
    ///
    /// Returns the removed nodes in post-order (children before parents).
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> Vec<Node> {
        if let Some(parent) = self.get(id).and_then(|node| node.parent) {
            if let Some(parent) = self.get_mut(parent) {
                parent.children.retain(|child| *child != id);
            }
        }

        let mut removed = Vec::new();
        let order = self.post_order(id);
        for id in order {
            if let Some(node) = self.remove(id) {
                removed.push(node);
            }
        }
        removed
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.get(id) {
            Some(node) => &node.children,
            None => &[],
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.parent)
    }

    /// Returns all descendants of `id` (excluding `id`) in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// Returns `id` and its descendants in post-order.
    pub fn post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((id, visited)) = stack.pop() {
            if visited {
                out.push(id);
                continue;
            }
            if !self.contains(id) {
                continue;
            }
            stack.push((id, true));
            stack.extend(self.children(id).iter().rev().map(|child| (*child, false)));
        }
        out
    }

    /// Returns the element value that produced a keyed node, looked up in its parent's tag map.
    pub fn tag_value(&self, id: NodeId) -> Option<&TagValue> {
        let node = self.get(id)?;
        let tag = node.tag?;
        self.get(node.parent?)?.tags.get(tag)
    }

    /// Iterates over all live nodes in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node.as_ref().map(|node| {
                (
                    NodeId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    node,
                )
            })
        })
    }

    /// Renders the tree as an indented outline, for debugging and test failure output.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.outline_node(root, 0, &mut out);
        }
        out
    }

    fn outline_node(&self, id: NodeId, depth: usize, out: &mut String) {
        use std::fmt::Write;
        if let Some(node) = self.get(id) {
            let _ = writeln!(out, "{:indent$}{} {:?}", "", node.widget, node.slot, indent = depth * 2);
            for child in &node.children {
                self.outline_node(*child, depth + 1, out);
            }
        }
    }
}

impl Index<NodeId> for NodeTree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("no node {:?} in tree", id),
        }
    }
}

impl IndexMut<NodeId> for NodeTree {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("no node {:?} in tree", id),
        }
    }
}
