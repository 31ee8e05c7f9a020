//! Structural reconciliation.
//!
//! Compares a freshly built tree with the tree from the previous pass and decides, per node,
//! whether it takes over the previous node's native handle or is created anew. The result is a
//! list of [`Patch`]es that bring the native widget tree in line with the new tree.
//!
//! Children are matched by [`SlotKey`]: explicit keys and keyed-collection identities survive
//! reordering, while unkeyed children are matched by their position among the other unkeyed
//! children. A matched pair is reused if it has the same node kind and widget kind (and, for
//! boundaries, the same pane count).

use crate::boundary::BoundaryPhase;
use crate::identity::SlotKey;
use crate::patch::Patch;
use crate::tree::{Node, NodeId, NodeKind, NodeTree};
use std::collections::HashMap;
use tracing::debug;

/// Per-pass reconciliation counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileStats {
    /// Nodes that took over a handle from the previous tree.
    pub reused: usize,
    /// Nodes with no counterpart in the previous tree.
    pub created: usize,
    /// Nodes of the previous tree that were dropped.
    pub destroyed: usize,
    /// Reused nodes whose position among their siblings changed.
    pub moved: usize,
    /// Reused nodes whose props or layout hints changed.
    pub updated: usize,
}

/// The outcome of reconciling a new tree against the previous one.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// True if every node of the new tree took over a node from the previous tree and nothing
    /// was dropped.
    pub reused: bool,
    /// Patches to commit, in order.
    pub patches: Vec<Patch>,
    /// Boundaries whose content was replaced (detached and re-attached) in this pass.
    pub boundary_replacements: Vec<NodeId>,
    pub stats: ReconcileStats,
}

/// Reconciles `new` against `previous`, carrying native handles and render caches over to reused
/// nodes of `new`.
///
/// - `reuse_nodes`: if false, every node but the root is treated as not reusable
pub fn reconcile(new: &mut NodeTree, previous: Option<&NodeTree>, reuse_nodes: bool) -> Reconciliation {
    let mut reconciler = Reconciler {
        new,
        old: previous,
        reuse_nodes,
        patches: Vec::new(),
        replacements: Vec::new(),
        stats: ReconcileStats::default(),
    };

    if let Some(root) = reconciler.new.root() {
        match previous.and_then(|tree| tree.root()) {
            Some(old_root) => {
                // the root stands in for the hosting surface and always persists
                reconciler.carry(root, old_root);
                reconciler.stats.reused += 1;
                reconciler.patches.push(Patch::Update { node: root });
                reconciler.children(root, Some(old_root));
            }
            None => {
                reconciler.create(root);
            }
        }
    }

    let Reconciler {
        patches,
        replacements,
        stats,
        ..
    } = reconciler;

    debug!(
        reused = stats.reused,
        created = stats.created,
        destroyed = stats.destroyed,
        moved = stats.moved,
        patches = patches.len(),
        "reconciled"
    );

    Reconciliation {
        reused: previous.is_some() && stats.created == 0 && stats.destroyed == 0,
        patches,
        boundary_replacements: replacements,
        stats,
    }
}

/// Returns true if the subtrees at `a` and `b` are structurally equivalent: same node kind, widget
/// kind and slot key, and pairwise equivalent children in order.
///
/// Short-circuits on the first mismatch of kind, key or child count.
pub fn equivalent(a_tree: &NodeTree, a: NodeId, b_tree: &NodeTree, b: NodeId) -> bool {
    let (x, y) = match (a_tree.get(a), b_tree.get(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => return false,
    };
    if x.kind != y.kind || x.widget != y.widget || x.slot != y.slot || x.children.len() != y.children.len() {
        return false;
    }
    x.children
        .iter()
        .zip(&y.children)
        .all(|(a, b)| equivalent(a_tree, *a, b_tree, *b))
}

/// Patches that destroy every native widget of a tree, for when the hosting surface goes away.
pub fn teardown(tree: &NodeTree) -> Vec<Patch> {
    let mut patches = Vec::new();
    if let Some(root) = tree.root() {
        destroy_into(tree, root, &mut patches);
    }
    patches
}

/// Emits destroy patches for a subtree in pre-order, so a composite is detached before any of its
/// panes go away.
fn destroy_into(tree: &NodeTree, id: NodeId, patches: &mut Vec<Patch>) -> usize {
    let mut count = 0;
    let mut stack = vec![id];
    while let Some(id) = stack.pop() {
        let node = &tree[id];
        count += 1;
        if let Some(handle) = node.handle {
            let detach = node
                .boundary
                .as_ref()
                .map_or(false, |state| state.phase() == BoundaryPhase::Attached);
            patches.push(Patch::Destroy {
                handle,
                kind: node.kind,
                detach,
            });
        }
        stack.extend(node.children.iter().rev());
    }
    count
}

struct Reconciler<'a> {
    new: &'a mut NodeTree,
    old: Option<&'a NodeTree>,
    reuse_nodes: bool,
    patches: Vec<Patch>,
    replacements: Vec<NodeId>,
    stats: ReconcileStats,
}

impl<'a> Reconciler<'a> {
    fn reusable(&self, new: &Node, old: &Node) -> bool {
        if !self.reuse_nodes || new.kind != old.kind || new.widget != old.widget || new.slot != old.slot {
            return false;
        }
        match (&new.boundary, &old.boundary) {
            // both render as absent; there is no composite to carry over
            (Some(a), Some(b)) if !a.is_valid() || !b.is_valid() => !a.is_valid() && !b.is_valid(),
            (Some(a), Some(b)) => a.panes() == b.panes() && old.handle.is_some(),
            // a node whose commit never went through has nothing to carry over
            (None, None) => old.handle.is_some(),
            _ => false,
        }
    }

    /// Moves the native handle and render caches from the previous node onto the new one.
    fn carry(&mut self, id: NodeId, old_id: NodeId) {
        let old = match self.old {
            Some(old) => &old[old_id],
            None => return,
        };
        let node = &mut self.new[id];
        node.handle = old.handle;
        node.frame = old.frame;
        node.reused = true;
        if let (Some(state), Some(previous)) = (node.boundary.as_mut(), old.boundary.as_ref()) {
            state.inherit(previous);
        }
    }

    /// Reconciles the children of `parent` against those of `old_parent`.
    ///
    /// Returns true if anything in the subtree below `parent` changed.
    fn children(&mut self, parent: NodeId, old_parent: Option<NodeId>) -> bool {
        let new_children = self.new.children(parent).to_vec();
        let old_children = match (self.old, old_parent) {
            (Some(old), Some(p)) => old.children(p).to_vec(),
            _ => Vec::new(),
        };

        let mut by_slot: HashMap<SlotKey, (usize, NodeId)> = HashMap::with_capacity(old_children.len());
        for (pos, id) in old_children.iter().enumerate() {
            if let Some(old) = self.old {
                by_slot.entry(old[*id].slot).or_insert((pos, *id));
            }
        }

        let mut matched = vec![false; old_children.len()];
        let mut pairs = Vec::with_capacity(new_children.len());
        for child in &new_children {
            let slot = self.new[*child].slot;
            let candidate = by_slot.remove(&slot).filter(|(_, old_id)| match self.old {
                Some(old) => self.reusable(&self.new[*child], &old[*old_id]),
                None => false,
            });
            if let Some((pos, _)) = candidate {
                matched[pos] = true;
            }
            pairs.push((*child, candidate));
        }

        let mut structure_changed = false;

        // unmatched previous children go away before anything new is attached
        if let Some(old) = self.old {
            for (pos, id) in old_children.iter().enumerate() {
                if !matched[pos] {
                    self.stats.destroyed += destroy_into(old, *id, &mut self.patches);
                    structure_changed = true;
                }
            }
        }

        let mut last_pos: Option<usize> = None;
        let moved: Vec<bool> = pairs
            .iter()
            .map(|(_, candidate)| match candidate {
                Some((pos, _)) => {
                    let moved = last_pos.map_or(false, |last| *pos < last);
                    last_pos = Some(last_pos.map_or(*pos, |last| last.max(*pos)));
                    moved
                }
                None => false,
            })
            .collect();

        // moved composites leave their host before anything is attached, so each attach below
        // only has settled composites in front of it
        for ((child, candidate), moved) in pairs.iter().zip(&moved) {
            if let (true, Some((_, old_id))) = (*moved, candidate) {
                if self.was_attached(*old_id) {
                    self.patches.push(Patch::DetachBoundary { node: *child });
                }
            }
        }

        let mut changed = false;
        for ((child, candidate), moved) in pairs.into_iter().zip(moved) {
            match candidate {
                Some((_, old_id)) => {
                    if moved {
                        self.stats.moved += 1;
                        structure_changed = true;
                    }
                    changed |= self.reuse(child, old_id, moved);
                }
                None => {
                    self.create(child);
                    structure_changed = true;
                }
            }
        }

        if structure_changed && self.new[parent].kind != NodeKind::Boundary {
            self.patches.push(Patch::Children { parent });
        }
        changed || structure_changed
    }

    fn was_attached(&self, old_id: NodeId) -> bool {
        self.old
            .and_then(|old| old.get(old_id))
            .and_then(|node| node.boundary.as_ref())
            .map_or(false, |state| state.phase() == BoundaryPhase::Attached)
    }

    /// Reuses the previous node `old_id` for `id`. Returns true if anything in the subtree changed.
    ///
    /// - `moved`: the node changed position among its siblings
    fn reuse(&mut self, id: NodeId, old_id: NodeId, moved: bool) -> bool {
        self.carry(id, old_id);
        self.stats.reused += 1;

        let props_changed = match self.old {
            Some(old) => {
                let (new, old) = (&self.new[id], &old[old_id]);
                new.props != old.props || new.hints != old.hints
            }
            None => true,
        };
        if props_changed {
            self.stats.updated += 1;
        }

        if self.new[id].kind == NodeKind::Boundary {
            return self.boundary(id, Some(old_id), props_changed, moved);
        }
        self.patches.push(Patch::Update { node: id });
        let children_changed = self.children(id, Some(old_id));
        props_changed || children_changed
    }

    /// Creates `id` and its whole subtree.
    fn create(&mut self, id: NodeId) {
        self.stats.created += 1;
        if self.new[id].kind == NodeKind::Boundary {
            self.boundary(id, None, true, false);
            return;
        }

        self.patches.push(Patch::Create { node: id });
        self.patches.push(Patch::Update { node: id });
        let children = self.new.children(id).to_vec();
        for child in &children {
            self.create(*child);
        }
        if !children.is_empty() {
            self.patches.push(Patch::Children { parent: id });
        }
    }

    /// Reconciles a boundary. Content changes are never patched in place: pane patches are
    /// wrapped in a detach and an attach of the composite.
    ///
    /// A moved composite has already been detached by its parent and is only attached again.
    fn boundary(&mut self, id: NodeId, old_id: Option<NodeId>, props_changed: bool, moved: bool) -> bool {
        let valid = self.new[id].boundary.as_ref().map_or(false, |state| state.is_valid());
        if !valid {
            // renders as absent; there is no composite to build
            return false;
        }

        let outer = std::mem::take(&mut self.patches);
        let content_changed = match old_id {
            Some(old_id) => self.children(id, Some(old_id)),
            None => {
                for pane in self.new.children(id).to_vec() {
                    self.create(pane);
                }
                true
            }
        };
        let pane_patches = std::mem::replace(&mut self.patches, outer);

        let attached = self.new[id]
            .boundary
            .as_ref()
            .map_or(false, |state| state.phase() == BoundaryPhase::Attached);
        // a boundary that is itself a pane is hosted by the outer composite's panes
        let nested = self.new[id]
            .parent
            .map_or(false, |parent| self.new[parent].kind == NodeKind::Boundary);

        let relocated = moved && attached;

        if old_id.is_some() && (attached || nested) && !content_changed && !relocated {
            self.patches.push(Patch::Update { node: id });
            self.patches.extend(pane_patches);
            return props_changed;
        }

        if attached && !relocated {
            self.patches.push(Patch::DetachBoundary { node: id });
        }
        self.patches.extend(pane_patches);
        self.patches.push(Patch::AttachBoundary { node: id });
        if old_id.is_some() && (content_changed || !relocated) {
            self.replacements.push(id);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Builder, Expanders};
    use crate::descriptor::{Container, Descriptor, KeyedCollection, Leaf, WidgetKind};
    use crate::environment::Environment;
    use crate::headless::Headless;
    use crate::patch::{commit, PatchKind};

    /// Builds, reconciles and commits one pass.
    fn pass(
        backend: &mut Headless,
        root: &Descriptor,
        previous: Option<&NodeTree>,
        reuse_nodes: bool,
    ) -> (NodeTree, Reconciliation) {
        let expanders = Expanders::new();
        let mut tree = Builder::new(&expanders, 64)
            .build_root(root, &Environment::new())
            .tree;
        let r = reconcile(&mut tree, previous, reuse_nodes);
        commit(&r.patches, &mut tree, backend).unwrap();
        (tree, r)
    }

    fn label(text: &str) -> Descriptor {
        Leaf::new(WidgetKind::new("label")).prop("text", text).into()
    }

    fn count(r: &Reconciliation, kind: PatchKind) -> usize {
        r.patches.iter().filter(|p| p.kind() == kind).count()
    }

    #[test]
    fn first_pass_creates_everything() {
        let mut backend = Headless::new();
        let desc = Container::vstack().child(label("a")).child(label("b")).into();
        let (_, r) = pass(&mut backend, &desc, None, true);
        assert!(!r.reused);
        assert_eq!(r.stats.created, 4);
        assert_eq!(count(&r, PatchKind::Create), 4);
        assert_eq!(count(&r, PatchKind::Children), 2);
        assert_eq!(backend.len(), 4);
    }

    #[test]
    fn identical_rebuild_is_reused() {
        let mut backend = Headless::new();
        let desc: Descriptor = Container::vstack().child(label("a")).child(label("b")).into();
        let (first, _) = pass(&mut backend, &desc, None, true);
        let (second, r) = pass(&mut backend, &desc, Some(&first), true);

        assert!(r.reused);
        assert_eq!(r.stats.reused, 4);
        assert_eq!(r.stats.updated, 0);
        assert_eq!(count(&r, PatchKind::Create), 0);
        assert_eq!(count(&r, PatchKind::Destroy), 0);
        assert_eq!(count(&r, PatchKind::Children), 0);
        assert!(second.descendants(second.root().unwrap()).iter().all(|id| second[*id].is_reused()));
        assert!(equivalent(&second, second.root().unwrap(), &first, first.root().unwrap()));
    }

    #[test]
    fn prop_changes_update_in_place() {
        let mut backend = Headless::new();
        let (first, _) = pass(&mut backend, &label("a"), None, true);
        let (second, r) = pass(&mut backend, &label("b"), Some(&first), true);
        assert!(r.reused);
        assert_eq!(r.stats.updated, 1);
        let leaf = second.children(second.root().unwrap())[0];
        let handle = second[leaf].handle().unwrap();
        assert_eq!(Some(handle), first[first.children(first.root().unwrap())[0]].handle());
        assert_eq!(backend.describe(handle), "label(text=\"b\")");
    }

    #[test]
    fn kind_change_replaces_node() {
        let mut backend = Headless::new();
        let (first, _) = pass(&mut backend, &label("a"), None, true);
        let (_, r) = pass(&mut backend, &Leaf::new(WidgetKind::new("button")).into(), Some(&first), true);
        assert!(!r.reused);
        assert_eq!((r.stats.created, r.stats.destroyed), (1, 1));
        // the destroy comes before the replacement is created
        let destroy = r.patches.iter().position(|p| p.kind() == PatchKind::Destroy);
        let create = r.patches.iter().position(|p| p.kind() == PatchKind::Create);
        assert!(destroy < create);
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn keyed_moves_are_not_rebuilds() {
        let rows = |order: &[u32]| -> Descriptor {
            Container::vstack()
                .child(KeyedCollection::new(order.to_vec(), |n| *n, |n| label(&n.to_string())))
                .into()
        };
        let mut backend = Headless::new();
        let (first, _) = pass(&mut backend, &rows(&[1, 2, 3]), None, true);
        let (_, r) = pass(&mut backend, &rows(&[3, 1, 2]), Some(&first), true);

        assert!(r.reused);
        assert_eq!(r.stats.moved, 2);
        assert_eq!(count(&r, PatchKind::Children), 1);
    }

    #[test]
    fn reuse_can_be_disabled() {
        let mut backend = Headless::new();
        let desc: Descriptor = Container::vstack().child(label("a")).into();
        let (first, _) = pass(&mut backend, &desc, None, true);
        let (_, r) = pass(&mut backend, &desc, Some(&first), false);
        assert!(!r.reused);
        assert_eq!(r.stats.reused, 1);
        assert_eq!(r.stats.destroyed, 2);
        assert_eq!(r.stats.created, 2);
        assert_eq!(backend.len(), 3);
    }

    #[test]
    fn uncommitted_nodes_are_recreated() {
        let expanders = Expanders::new();
        let desc = label("a");
        let mut first = Builder::new(&expanders, 8).build_root(&desc, &Environment::new()).tree;
        reconcile(&mut first, None, true);
        let mut second = Builder::new(&expanders, 8).build_root(&desc, &Environment::new()).tree;
        let r = reconcile(&mut second, Some(&first), true);
        assert_eq!(r.stats.created, 1);
        // nothing to destroy natively, but the node itself is dropped
        assert_eq!(count(&r, PatchKind::Destroy), 0);
    }

    #[test]
    fn teardown_destroys_in_pre_order() {
        let mut backend = Headless::new();
        let (tree, _) = pass(&mut backend, &Container::vstack().child(label("a")).into(), None, true);
        let patches = teardown(&tree);
        assert_eq!(patches.len(), 3);
        assert!(matches!(patches[0], Patch::Destroy { kind: NodeKind::Root, .. }));
        commit(&patches, &mut tree.clone(), &mut backend).unwrap();
        assert!(backend.is_empty());
    }
}
