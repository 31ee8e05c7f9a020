//! Expands descriptors into a node tree.
//!
//! Only leaves, containers and boundaries become nodes. Every other descriptor splices whatever it
//! expands to into the enclosing node's child list:
//!
//! ```text
//! vstack                         vstack
//!   group                          label        Auto(0)
//!     label                 =>     row 1        Element { key: 1 }
//!     keyed [1, 2]                 row 2        Element { key: 2 }
//!   if false { button }            image        Auto(1)
//!   image
//! ```

use crate::boundary::BoundaryState;
use crate::descriptor::{Boundary, Container, Descriptor, Extension, KeyedCollection, Leaf, WidgetKind};
use crate::environment::Environment;
use crate::error::BuildError;
use crate::identity::{Key, SlotKey, Tag, TagValue};
use crate::layout::LayoutHints;
use crate::tree::{Node, NodeId, NodeKind, NodeTree};
use core::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, trace, warn};

type Expander = Arc<dyn Fn(&Extension, &Environment) -> Option<Descriptor> + Send + Sync>;

/// Registered expansion rules for [`Extension`] descriptors.
#[derive(Clone, Default)]
pub struct Expanders {
    rules: HashMap<TypeId, Expander>,
}

impl Expanders {
    pub fn new() -> Expanders {
        Expanders::default()
    }

    /// Registers the rule for extension values of type `T`, replacing any previous one.
    pub fn register<T, F>(&mut self, expand: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &Environment) -> Descriptor + Send + Sync + 'static,
    {
        self.rules.insert(
            TypeId::of::<T>(),
            Arc::new(move |ext: &Extension, env: &Environment| ext.downcast_ref::<T>().map(|value| expand(value, env))),
        );
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.rules.contains_key(&TypeId::of::<T>())
    }

    /// Expands an extension, or returns `None` if no rule is registered for its type.
    pub fn expand(&self, ext: &Extension, env: &Environment) -> Option<Descriptor> {
        self.rules.get(&ext.type_id).and_then(|rule| rule(ext, env))
    }
}

/// A freshly built tree and the problems found while building it.
#[derive(Debug)]
pub struct BuildOutput {
    pub tree: NodeTree,
    pub diagnostics: Vec<BuildError>,
}

/// Slot bookkeeping for one parent's child list.
#[derive(Default)]
struct ChildList {
    auto: u32,
    collections: u32,
    seen: HashSet<SlotKey>,
}

/// The keyed-collection element currently being expanded.
#[derive(Debug, Clone, Copy)]
struct ElementScope {
    collection: u32,
    key: Key,
    part: u32,
}

/// Builds one node tree. Create a new builder for every pass.
pub struct Builder<'a> {
    expanders: &'a Expanders,
    max_depth: usize,
    tree: NodeTree,
    lists: HashMap<NodeId, ChildList>,
    diagnostics: Vec<BuildError>,
}

impl<'a> Builder<'a> {
    pub fn new(expanders: &'a Expanders, max_depth: usize) -> Builder<'a> {
        Builder {
            expanders,
            max_depth,
            tree: NodeTree::new(),
            lists: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Builds a complete tree: a root node standing in for the hosting surface, with the expansion
    /// of `root` as its children.
    pub fn build_root(mut self, root: &Descriptor, env: &Environment) -> BuildOutput {
        let root_id = self.root(env);
        self.build(root, root_id, env);
        self.finish()
    }

    /// Creates the root node.
    pub fn root(&mut self, env: &Environment) -> NodeId {
        let id = self.tree.insert(Node::new(
            NodeKind::Root,
            WidgetKind::ROOT,
            SlotKey::Auto(0),
            env.clone(),
        ));
        self.tree.set_root(id);
        id
    }

    /// Expands `descriptor` into children of `parent` under `env`.
    ///
    /// Returns the first node appended, if any.
    pub fn build(&mut self, descriptor: &Descriptor, parent: NodeId, env: &Environment) -> Option<NodeId> {
        self.expand(descriptor, parent, env, &mut None, 0)
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn finish(self) -> BuildOutput {
        BuildOutput {
            tree: self.tree,
            diagnostics: self.diagnostics,
        }
    }

    fn expand(
        &mut self,
        descriptor: &Descriptor,
        parent: NodeId,
        env: &Environment,
        element: &mut Option<ElementScope>,
        depth: usize,
    ) -> Option<NodeId> {
        if depth > self.max_depth {
            error!(limit = self.max_depth, "descriptor nesting too deep; dropping subtree");
            self.diagnostics.push(BuildError::DepthExceeded {
                limit: self.max_depth,
            });
            return None;
        }

        match descriptor {
            Descriptor::Empty => None,
            Descriptor::Leaf(leaf) => self.leaf(leaf, parent, env, element),
            Descriptor::Container(container) => self.container(container, parent, env, element, depth),
            Descriptor::Group(items) => {
                let mut first = None;
                for item in items {
                    let id = self.expand(item, parent, env, element, depth + 1);
                    first = first.or(id);
                }
                first
            }
            Descriptor::Keyed(collection) => self.keyed(collection, parent, env, element, depth),
            Descriptor::Conditional(chain) => {
                let selection = chain.select();
                trace!(?selection, "conditional");
                let content = chain.selected_content(selection)?;
                let content = content();
                self.expand(&content, parent, env, element, depth + 1)
            }
            Descriptor::Boundary(boundary) => self.boundary(boundary, parent, env, element, depth),
            Descriptor::Scoped(scoped) => {
                let env = (scoped.bind)(env);
                self.expand(&scoped.content, parent, &env, element, depth + 1)
            }
            Descriptor::Extension(ext) => match self.expanders.expand(ext, env) {
                Some(content) => self.expand(&content, parent, env, element, depth + 1),
                None => {
                    warn!(name = ext.name, "unrecognized descriptor; leaving a gap");
                    self.diagnostics
                        .push(BuildError::UnrecognizedDescriptor { name: ext.name });
                    None
                }
            },
        }
    }

    /// Assigns the slot key for a new child of `parent`, or returns `None` if the slot is taken.
    fn slot(&mut self, parent: NodeId, explicit: Option<Key>, element: &mut Option<ElementScope>) -> Option<SlotKey> {
        let list = self.lists.entry(parent).or_default();
        let slot = match (explicit, element.as_mut()) {
            (Some(key), _) => SlotKey::Explicit(key),
            (None, Some(scope)) => {
                let slot = SlotKey::Element {
                    collection: scope.collection,
                    key: scope.key,
                    part: scope.part,
                };
                scope.part += 1;
                slot
            }
            (None, None) => {
                let slot = SlotKey::Auto(list.auto);
                list.auto += 1;
                slot
            }
        };

        if !list.seen.insert(slot) {
            let key = match slot {
                SlotKey::Explicit(key) | SlotKey::Element { key, .. } => key.to_string(),
                SlotKey::Auto(n) => n.to_string(),
            };
            error!(%key, "duplicate sibling key; keeping the first");
            self.diagnostics.push(BuildError::DuplicateKey { key });
            return None;
        }
        Some(slot)
    }

    fn node(
        &mut self,
        kind: NodeKind,
        widget: &WidgetKind,
        explicit: Option<Key>,
        parent: NodeId,
        env: &Environment,
        element: &mut Option<ElementScope>,
    ) -> Option<Node> {
        let slot = self.slot(parent, explicit, element)?;
        let mut node = Node::new(kind, widget.clone(), slot, env.clone());
        node.tag = element.map(|scope| Tag {
            collection: scope.collection,
            key: scope.key,
        });
        Some(node)
    }

    fn leaf(
        &mut self,
        leaf: &Leaf,
        parent: NodeId,
        env: &Environment,
        element: &mut Option<ElementScope>,
    ) -> Option<NodeId> {
        let mut node = self.node(NodeKind::Leaf, &leaf.kind, leaf.key, parent, env, element)?;
        node.props = leaf.props.clone();
        node.layout = leaf.layout.clone();
        Some(self.tree.append(parent, node))
    }

    fn container(
        &mut self,
        container: &Container,
        parent: NodeId,
        env: &Environment,
        element: &mut Option<ElementScope>,
        depth: usize,
    ) -> Option<NodeId> {
        let mut node = self.node(NodeKind::Container, &container.kind, container.key, parent, env, element)?;
        node.props = container.props.clone();
        let id = self.tree.append(parent, node);

        // children are built under the same environment; element identity ends here
        for child in &container.children {
            self.expand(child, id, env, &mut None, depth + 1);
        }

        let node = &mut self.tree[id];
        if container.reversed {
            node.children.reverse();
        }
        let children = node.children.clone();
        for (position, child) in children.into_iter().enumerate() {
            self.tree[child].hints = LayoutHints {
                axis: container.axis,
                spacing: container.spacing,
                alignment: container.alignment,
                position,
            };
        }
        Some(id)
    }

    fn keyed(
        &mut self,
        collection: &KeyedCollection,
        parent: NodeId,
        env: &Environment,
        element: &mut Option<ElementScope>,
        depth: usize,
    ) -> Option<NodeId> {
        // a nested collection flattens into the outer element's identity
        let ordinal = match element {
            Some(outer) => outer.collection,
            None => {
                let list = self.lists.entry(parent).or_default();
                let ordinal = list.collections;
                list.collections += 1;
                ordinal
            }
        };

        let mut seen = HashSet::with_capacity(collection.len());
        let mut first = None;
        for (index, el) in collection.elements.iter().enumerate() {
            let (key, value) = match &el.identity {
                Some((key, value)) => (*key, value.clone()),
                None => (Key(index as u64), TagValue::new(index)),
            };
            let key = match element {
                Some(outer) => outer.key.combine(key),
                None => key,
            };

            if !seen.insert(key) {
                error!(key = value.label(), "duplicate key in keyed collection; keeping the first");
                self.diagnostics.push(BuildError::DuplicateKey {
                    key: value.label().to_string(),
                });
                continue;
            }

            let tag = Tag {
                collection: ordinal,
                key,
            };
            self.tree[parent].tags.insert(tag, value);

            let mut scope = Some(ElementScope {
                collection: ordinal,
                key,
                part: 0,
            });
            let id = self.expand(&el.content, parent, env, &mut scope, depth + 1);
            first = first.or(id);
        }
        first
    }

    fn boundary(
        &mut self,
        boundary: &Boundary,
        parent: NodeId,
        env: &Environment,
        element: &mut Option<ElementScope>,
        depth: usize,
    ) -> Option<NodeId> {
        let mut node = self.node(NodeKind::Boundary, &boundary.kind, boundary.key, parent, env, element)?;
        node.props = boundary.props.clone();
        let id = self.tree.append(parent, node);

        // the composite is not constructed here; reconciliation attaches it once panes exist
        let mut valid = true;
        for (pane, content) in boundary.panes.iter().enumerate() {
            let before = self.tree[id].children.len();
            self.expand(content, id, env, &mut None, depth + 1);
            // an invalid inner boundary renders as absent and does not fill the pane
            let children = self.tree[id].children[before..]
                .iter()
                .filter(|child| self.tree[**child].boundary.as_ref().map_or(true, |s| s.is_valid()))
                .count();
            if children != 1 {
                warn!(kind = %boundary.kind, pane, children, "boundary pane arity violation; rendering as absent");
                self.diagnostics.push(BuildError::BoundaryArity {
                    kind: boundary.kind.to_string(),
                    pane,
                    children,
                });
                valid = false;
            }
        }

        if !valid {
            for pane in self.tree[id].children.clone() {
                self.tree.remove_subtree(pane);
            }
        }
        self.tree[id].boundary = Some(BoundaryState::new(boundary.panes.len(), valid));
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Conditional, Scoped};
    use crate::environment::EnvironmentKey;

    fn build(root: &Descriptor) -> BuildOutput {
        let expanders = Expanders::new();
        Builder::new(&expanders, 32).build_root(root, &Environment::new())
    }

    fn label(text: &str) -> Descriptor {
        Leaf::new(WidgetKind::new("label")).prop("text", text).into()
    }

    fn slots(tree: &NodeTree, parent: NodeId) -> Vec<SlotKey> {
        tree.children(parent).iter().map(|id| tree[*id].slot()).collect()
    }

    #[test]
    fn fragments_flatten_into_parent() {
        let out = build(
            &Container::vstack()
                .child(vec![label("a"), Descriptor::Empty, label("b")])
                .child(Conditional::when(false, || label("hidden")))
                .child(Leaf::new(WidgetKind::new("image")).key(9u64))
                .child(label("c"))
                .into(),
        );
        let tree = &out.tree;
        let stack = tree.children(tree.root().unwrap())[0];
        assert_eq!(
            slots(tree, stack),
            vec![
                SlotKey::Auto(0),
                SlotKey::Auto(1),
                SlotKey::Explicit(Key(9)),
                SlotKey::Auto(2)
            ]
        );
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn container_attaches_hints_to_direct_children() {
        let out = build(
            &Container::hstack()
                .spacing(4.)
                .reversed(true)
                .child(label("a"))
                .child(Container::vstack().child(label("inner")))
                .into(),
        );
        let tree = &out.tree;
        let stack = tree.children(tree.root().unwrap())[0];
        let children = tree.children(stack);
        assert_eq!(tree[children[0]].widget(), &WidgetKind::VSTACK);
        assert_eq!(tree[children[0]].hints().spacing, Some(4.));
        assert_eq!(tree[children[1]].hints().position, 1);

        let inner = tree.children(children[0])[0];
        assert_eq!(tree[inner].hints().axis, Some(crate::layout::Axis::Vertical));
        assert_eq!(tree[inner].hints().spacing, None);
    }

    #[test]
    fn keyed_elements_are_tagged() {
        let out = build(
            &KeyedCollection::new(vec!["x", "y"], |s| s.to_string(), |s| label(s)).into(),
        );
        let tree = &out.tree;
        let root = tree.root().unwrap();
        let children = tree.children(root);
        assert_eq!(children.len(), 2);
        assert_eq!(tree[root].tags().len(), 2);
        let tag = tree.tag_value(children[1]).unwrap();
        assert_eq!(tag.downcast_ref::<String>().map(String::as_str), Some("y"));
    }

    #[test]
    fn duplicate_keys_keep_the_first() {
        let out = build(
            &KeyedCollection::new(vec![(1, "a"), (2, "b"), (1, "c")], |r| r.0, |r| label(r.1)).into(),
        );
        let tree = &out.tree;
        let children = tree.children(tree.root().unwrap());
        assert_eq!(children.len(), 2);
        assert_eq!(
            tree[children[0]].props().get("text"),
            Some(&crate::descriptor::PropValue::Text("a".into()))
        );
        assert_eq!(out.diagnostics, vec![BuildError::DuplicateKey { key: "1".into() }]);
    }

    #[test]
    fn nested_collections_flatten() {
        let out = build(
            &KeyedCollection::new(
                vec![1, 2],
                |n| *n,
                |n| {
                    let n = *n;
                    KeyedCollection::new(vec![10, 20], |m| *m, move |m| label(&(n * m).to_string())).into()
                },
            )
            .into(),
        );
        let tree = &out.tree;
        let children = tree.children(tree.root().unwrap());
        assert_eq!(children.len(), 4);
        assert!(children.iter().all(|c| tree[*c].parent() == tree.root()));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn unrecognized_extension_leaves_a_gap() {
        struct Unknown;
        let out = build(
            &vec![label("a"), Extension::new(Unknown).into(), label("b")].into(),
        );
        assert_eq!(out.tree.children(out.tree.root().unwrap()).len(), 2);
        assert!(matches!(
            out.diagnostics[0],
            BuildError::UnrecognizedDescriptor { .. }
        ));
    }

    #[test]
    fn registered_extension_expands() {
        struct Badge(u32);
        let mut expanders = Expanders::new();
        expanders.register(|badge: &Badge, _env: &Environment| {
            Leaf::new(WidgetKind::new("badge")).prop("count", badge.0 as i64).into()
        });
        assert!(expanders.contains::<Badge>());
        let out = Builder::new(&expanders, 8).build_root(&Extension::new(Badge(3)).into(), &Environment::new());
        let child = out.tree.children(out.tree.root().unwrap())[0];
        assert_eq!(out.tree[child].widget().as_str(), "badge");
    }

    #[test]
    fn boundary_arity_is_checked_per_pane() {
        let out = build(
            &crate::descriptor::Boundary::split(
                WidgetKind::new("split"),
                label("primary"),
                vec![label("a"), label("b")],
            )
            .into(),
        );
        let tree = &out.tree;
        let boundary = tree.children(tree.root().unwrap())[0];
        assert!(tree[boundary].is_boundary());
        assert!(!tree[boundary].boundary().unwrap().is_valid());
        assert!(tree.children(boundary).is_empty());
        assert_eq!(
            out.diagnostics,
            vec![BuildError::BoundaryArity {
                kind: "split".into(),
                pane: 1,
                children: 2
            }]
        );
    }

    #[test]
    fn scoped_environment_reaches_descendants_only() {
        struct Tint;
        impl EnvironmentKey for Tint {
            type Value = u8;
            fn default_value() -> u8 {
                0
            }
        }

        let scoped = Scoped::new(Container::vstack().child(label("inner")).into(), |env| {
            env.with::<Tint>(5)
        });
        let out = build(&vec![Descriptor::Scoped(scoped), label("sibling")].into());
        let tree = &out.tree;
        let root = tree.root().unwrap();
        let (stack, sibling) = (tree.children(root)[0], tree.children(root)[1]);
        let inner = tree.children(stack)[0];

        assert_eq!(tree[stack].environment().get::<Tint>(), 5);
        assert_eq!(tree[inner].environment().get::<Tint>(), 5);
        assert_eq!(tree[sibling].environment().get::<Tint>(), 0);
        assert_eq!(tree[root].environment().get::<Tint>(), 0);
    }

    #[test]
    fn depth_limit_drops_subtree() {
        let mut desc = label("deep");
        for _ in 0..40 {
            desc = Container::vstack().child(desc).into();
        }
        let out = build(&desc);
        assert_eq!(out.diagnostics, vec![BuildError::DepthExceeded { limit: 32 }]);
    }
}
