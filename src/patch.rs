//! Patches for native widgets, and applying them to a backend.

use crate::backend::{Backend, Handle};
use crate::error::CommitError;
use crate::layout::LayoutSlot;
use crate::tree::{Node, NodeId, NodeKind, NodeTree};
use tracing::trace;

/// A single operation on the native widget tree.
///
/// Node ids refer to the tree being committed. Destroyed widgets belong to the previous tree, which
/// is gone by the time patches are applied, so they are referred to by handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patch {
    /// Creates the native widget for a new node.
    Create { node: NodeId },
    /// Applies a node's configuration and layout. Emitted for every reused or newly attached node.
    Update { node: NodeId },
    /// Sets a node's native children to its current non-boundary children.
    Children { parent: NodeId },
    /// Destroys a widget of the previous tree. If `detach` is set, it is an attached composite
    /// and is detached from its host first.
    Destroy {
        handle: Handle,
        kind: NodeKind,
        detach: bool,
    },
    /// Detaches a boundary's composite before its content is replaced.
    DetachBoundary { node: NodeId },
    /// Creates or refills a boundary's composite from its panes and attaches it to its host.
    AttachBoundary { node: NodeId },
}

/// Discriminant of a [`Patch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchKind {
    Create,
    Update,
    Children,
    Destroy,
    DetachBoundary,
    AttachBoundary,
}

impl Patch {
    pub fn kind(&self) -> PatchKind {
        match self {
            Patch::Create { .. } => PatchKind::Create,
            Patch::Update { .. } => PatchKind::Update,
            Patch::Children { .. } => PatchKind::Children,
            Patch::Destroy { .. } => PatchKind::Destroy,
            Patch::DetachBoundary { .. } => PatchKind::DetachBoundary,
            Patch::AttachBoundary { .. } => PatchKind::AttachBoundary,
        }
    }
}

/// Counts of what a commit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitStats {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
    pub attached: usize,
    pub detached: usize,
}

/// Applies patches in order, writing native handles and frames into the tree.
///
/// Stops at the first failure; patches before it have been applied.
pub fn commit<B: Backend>(
    patches: &[Patch],
    tree: &mut NodeTree,
    backend: &mut B,
) -> Result<CommitStats, CommitError<B::Error>> {
    let outcome = commit_partial(patches, tree, backend);
    match outcome.error {
        Some(err) => Err(err),
        None => Ok(outcome.stats),
    }
}

/// The result of a commit that may have broken off.
#[derive(Debug)]
pub struct PartialCommit<E: std::error::Error + 'static> {
    pub stats: CommitStats,
    /// Number of patches applied before the failure, or all of them.
    pub applied: usize,
    pub error: Option<CommitError<E>>,
}

impl<E: std::error::Error + 'static> PartialCommit<E> {
    /// Destroy patches that were never reached. Their widgets belong to no tree any more.
    pub fn unapplied_destroys(&self, patches: &[Patch]) -> Vec<Patch> {
        if self.error.is_none() {
            return Vec::new();
        }
        patches
            .iter()
            .skip(self.applied + 1)
            .filter(|patch| patch.kind() == PatchKind::Destroy)
            .copied()
            .collect()
    }
}

/// Like [`commit`], but reports how far it got.
pub fn commit_partial<B: Backend>(
    patches: &[Patch],
    tree: &mut NodeTree,
    backend: &mut B,
) -> PartialCommit<B::Error> {
    let mut stats = CommitStats::default();
    for (applied, patch) in patches.iter().enumerate() {
        trace!(?patch, "applying patch");
        if let Err(err) = apply(*patch, tree, backend, &mut stats) {
            return PartialCommit {
                stats,
                applied,
                error: Some(err),
            };
        }
    }
    PartialCommit {
        stats,
        applied: patches.len(),
        error: None,
    }
}

fn node<E: std::error::Error + 'static>(tree: &NodeTree, id: NodeId) -> Result<&Node, CommitError<E>> {
    tree.get(id).ok_or(CommitError::MissingNode { node: id })
}

fn handle<E: std::error::Error + 'static>(tree: &NodeTree, id: NodeId) -> Result<Handle, CommitError<E>> {
    node(tree, id)?.handle.ok_or(CommitError::MissingHandle { node: id })
}

fn renders_composite(node: &Node) -> bool {
    node.boundary.as_ref().map_or(false, |state| state.is_valid())
}

fn apply<B: Backend>(
    patch: Patch,
    tree: &mut NodeTree,
    backend: &mut B,
    stats: &mut CommitStats,
) -> Result<(), CommitError<B::Error>> {
    let kind = patch.kind();
    let backend_err = |source| CommitError::Backend {
        patch: kind,
        source,
    };

    match patch {
        Patch::Create { node: id } => {
            let widget = node(tree, id)?.widget.clone();
            let handle = backend.make_handle(&widget).map_err(backend_err)?;
            tree.get_mut(id).ok_or(CommitError::MissingNode { node: id })?.handle = Some(handle);
            stats.created += 1;
        }
        Patch::Update { node: id } => {
            let n = node(tree, id)?;
            let handle = n.handle.ok_or(CommitError::MissingHandle { node: id })?;
            backend.update_handle(handle, &n.props).map_err(backend_err)?;

            let mut slot = LayoutSlot::new(handle, n.hints, n.frame);
            if let Some(spec) = &n.layout {
                spec.apply(&mut slot, &n.environment);
            }
            let frame = backend.apply_layout(handle, &slot).map_err(backend_err)?;
            tree.get_mut(id).ok_or(CommitError::MissingNode { node: id })?.frame = frame;
            stats.updated += 1;
        }
        Patch::Children { parent } => {
            let n = node(tree, parent)?;
            let parent_handle = n.handle.ok_or(CommitError::MissingHandle { node: parent })?;
            let mut children = Vec::with_capacity(n.children.len());
            for child in &n.children {
                if node(tree, *child)?.is_boundary() {
                    continue;
                }
                children.push(handle(tree, *child)?);
            }
            backend.set_children(parent_handle, &children).map_err(backend_err)?;
        }
        Patch::Destroy {
            handle,
            detach,
            ..
        } => {
            if detach {
                backend.detach_composite(handle).map_err(backend_err)?;
                stats.detached += 1;
            }
            backend.destroy_handle(handle).map_err(backend_err)?;
            stats.destroyed += 1;
        }
        Patch::DetachBoundary { node: id } => {
            let n = tree.get_mut(id).ok_or(CommitError::MissingNode { node: id })?;
            let handle = n.handle.ok_or(CommitError::MissingHandle { node: id })?;
            let state = n.boundary.as_mut().ok_or(CommitError::MissingNode { node: id })?;
            state.begin_detach()?;
            backend.detach_composite(handle).map_err(backend_err)?;
            state.finish_detach()?;
            stats.detached += 1;
        }
        Patch::AttachBoundary { node: id } => {
            let n = node(tree, id)?;
            let mut panes = Vec::with_capacity(n.children.len());
            for pane in &n.children {
                let p = node(tree, *pane)?;
                if p.is_boundary() && !renders_composite(p) {
                    continue;
                }
                panes.push(handle(tree, *pane)?);
            }
            let parent_id = n.parent.ok_or(CommitError::MissingNode { node: id })?;
            let parent = node(tree, parent_id)?;
            // a boundary that is itself a pane is hosted through the outer composite's panes
            let host = if parent.is_boundary() {
                None
            } else {
                Some(parent.handle.ok_or(CommitError::MissingHandle { node: parent_id })?)
            };
            // hosts list composites on their own, so count only preceding composites
            let mut position = 0;
            for sibling in parent.children.iter().take_while(|sibling| **sibling != id) {
                if renders_composite(node(tree, *sibling)?) {
                    position += 1;
                }
            }

            // the transition is checked before the backend sees anything
            if let Some(host) = host {
                tree.get_mut(id)
                    .and_then(|n| n.boundary.as_mut())
                    .ok_or(CommitError::MissingNode { node: id })?
                    .attach(host)?;
            }

            let n = node(tree, id)?;
            let handle = match n.handle {
                Some(handle) => {
                    backend.replace_panes(handle, &panes).map_err(backend_err)?;
                    handle
                }
                None => {
                    let handle = backend.make_composite(&n.widget, &panes).map_err(backend_err)?;
                    stats.created += 1;
                    handle
                }
            };
            backend.update_handle(handle, &n.props).map_err(backend_err)?;
            tree.get_mut(id).ok_or(CommitError::MissingNode { node: id })?.handle = Some(handle);
            if let Some(host) = host {
                backend
                    .attach_composite(handle, host, position)
                    .map_err(backend_err)?;
                stats.attached += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryPhase;
    use crate::builder::{Builder, Expanders};
    use crate::color::Color;
    use crate::descriptor::{Boundary, Container, Descriptor, Leaf, WidgetKind};
    use crate::environment::{Environment, ScenePhase, ScenePhaseKey};
    use crate::headless::Headless;
    use cgmath::Vector2;

    fn built(root: Descriptor) -> NodeTree {
        let expanders = Expanders::new();
        Builder::new(&expanders, 64)
            .build_root(&root, &Environment::new())
            .tree
    }

    fn create_all(tree: &NodeTree) -> Vec<Patch> {
        let mut patches = Vec::new();
        for id in tree.descendants(tree.root().unwrap()).into_iter().rev() {
            if !tree[id].is_boundary() {
                patches.push(Patch::Create { node: id });
                patches.push(Patch::Update { node: id });
            }
        }
        patches
    }

    #[test]
    fn commit_creates_and_links() {
        let mut tree = built(
            Container::vstack()
                .child(Leaf::new(WidgetKind::new("label")).prop("text", "a"))
                .child(Leaf::new(WidgetKind::new("label")).prop("text", "b"))
                .into(),
        );
        let root = tree.root().unwrap();
        let stack = tree.children(root)[0];

        let mut patches = vec![Patch::Create { node: root }];
        patches.extend(create_all(&tree));
        patches.push(Patch::Children { parent: stack });
        patches.push(Patch::Children { parent: root });

        let mut backend = Headless::new();
        let stats = commit(&patches, &mut tree, &mut backend).unwrap();
        assert_eq!(stats.created, 4);

        let stack_handle = tree[stack].handle().unwrap();
        let labels: Vec<_> = tree.children(stack).iter().map(|c| tree[*c].handle().unwrap()).collect();
        assert_eq!(backend.widget(stack_handle).unwrap().children, labels);
        assert_eq!(
            backend.describe(tree[root].handle().unwrap()),
            "root[vstack[label(text=\"a\"), label(text=\"b\")]]"
        );
    }

    #[test]
    fn layout_closures_see_the_node_environment() {
        let mut tree = built(
            Leaf::new(WidgetKind::new("label"))
                .prop("tint", Color::rgb(1., 0., 0.))
                .layout(|slot, env| {
                    let width = match env.get::<ScenePhaseKey>() {
                        ScenePhase::Active => 20.,
                        _ => 10.,
                    };
                    slot.preferred_size = Some(Vector2::new(width, 4.));
                    slot.padding = Vector2::new(1., 1.);
                })
                .into(),
        );
        let root = tree.root().unwrap();
        let leaf = tree.children(root)[0];
        let mut patches = vec![Patch::Create { node: root }];
        patches.extend(create_all(&tree));

        let mut backend = Headless::new();
        commit(&patches, &mut tree, &mut backend).unwrap();
        assert_eq!(tree[leaf].frame().unwrap().size, Vector2::new(22., 6.));
        assert_eq!(
            backend.describe(tree[leaf].handle().unwrap()),
            "label(tint=rgba(1, 0, 0, 1))"
        );
    }

    #[test]
    fn update_without_handle_fails() {
        let mut tree = built(Leaf::new(WidgetKind::new("label")).into());
        let leaf = tree.children(tree.root().unwrap())[0];
        let err = commit(&[Patch::Update { node: leaf }], &mut tree, &mut Headless::new()).unwrap_err();
        assert!(matches!(err, CommitError::MissingHandle { node } if node == leaf));
    }

    #[test]
    fn stale_children_are_reported() {
        let mut tree = built(Container::vstack().child(Leaf::new(WidgetKind::new("label"))).into());
        let stack = tree.children(tree.root().unwrap())[0];
        let stale = tree.children(stack)[0];
        tree.remove_subtree(stale);
        tree[stack].children.push(stale);

        let patches = [Patch::Create { node: stack }, Patch::Children { parent: stack }];
        let err = commit(&patches, &mut tree, &mut Headless::new()).unwrap_err();
        assert!(matches!(err, CommitError::MissingNode { node } if node == stale));
    }

    #[test]
    fn broken_off_commits_report_unreached_destroys() {
        let mut tree = built(Leaf::new(WidgetKind::new("label")).into());
        let leaf = tree.children(tree.root().unwrap())[0];
        let mut backend = Headless::new();
        let orphan = backend.make_handle(&WidgetKind::new("label")).unwrap();

        let patches = [
            Patch::Update { node: leaf },
            Patch::Destroy {
                handle: orphan,
                kind: NodeKind::Leaf,
                detach: false,
            },
        ];
        let outcome = commit_partial(&patches, &mut tree, &mut backend);
        assert_eq!(outcome.applied, 0);
        assert!(matches!(outcome.error, Some(CommitError::MissingHandle { .. })));
        assert_eq!(outcome.unapplied_destroys(&patches), vec![patches[1]]);
    }

    #[test]
    fn attaching_twice_is_rejected() {
        let mut tree = built(
            Boundary::single(WidgetKind::new("navigation"), Leaf::new(WidgetKind::new("label"))).into(),
        );
        let root = tree.root().unwrap();
        let boundary = tree.children(root)[0];

        let mut patches = vec![Patch::Create { node: root }];
        patches.extend(create_all(&tree));
        patches.push(Patch::AttachBoundary { node: boundary });

        let mut backend = Headless::new();
        commit(&patches, &mut tree, &mut backend).unwrap();
        assert_eq!(tree[boundary].boundary().unwrap().phase(), BoundaryPhase::Attached);

        let err = commit(&[Patch::AttachBoundary { node: boundary }], &mut tree, &mut backend).unwrap_err();
        assert!(matches!(err, CommitError::Boundary(_)));
        assert_eq!(backend.attached_count(tree[root].handle().unwrap()), 1);
    }
}
