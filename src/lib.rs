//! Declarative retained-mode UI core.
//!
//! # Conceptual overview
//! Sprig turns an immutable description of a UI into a retained tree of nodes backed by native
//! widgets, and keeps that tree up to date with as little native churn as possible.
//!
//! ## Descriptors
//! A [`Descriptor`] is a plain value describing what should be on screen: leaves, containers such
//! as stacks, keyed collections, conditionals, and controller boundaries. Descriptors have no
//! identity and are created fresh on every pass, so they should be cheap to create: constructors
//! only store their properties. Content that is expensive to produce (like the branches of a
//! conditional) is wrapped in closures and only evaluated when it is actually built.
//!
//! ## Nodes
//! Every pass expands the root descriptor into a new [`NodeTree`]. Only leaves, containers and
//! boundaries become nodes; fragments, collections, conditionals and environment scopes splice
//! their content into the enclosing node's child list. Each node remembers the environment it was
//! built under, its position among its siblings (its slot key) and, once attached, its native
//! handle.
//!
//! ## Reconciliation
//! The new tree is compared with the tree from the previous pass. Siblings are matched by key
//! (explicit keys and keyed-collection identities survive reordering) or by position among the
//! unkeyed siblings. Matched nodes of the same kind take over the previous node's native handle
//! and are only reconfigured; everything else is destroyed and created anew. The result is a list
//! of [`Patch`]es which are then committed to a [`Backend`].
//!
//! ## Controller boundaries
//! Some native widgets are opaque composites that manage their own children (e.g. a navigation
//! controller or a split view). Their content is never patched in place: when it changes, the
//! composite is detached from its host, its panes are replaced, and it is attached again within the
//! same commit.
//!
//! ## Environment
//! The [`Environment`] propagates values down the tree without threading them through every
//! descriptor. Scopes are immutable and structurally shared; binding a value creates a new scope
//! that is visible to descendants only.
//!
//! ## Scheduling
//! Application state changes call [`Invalidator::request_rebuild`], from any thread. Requests that
//! arrive between two turns of the host loop collapse into a single pass, which always builds
//! against the latest state. After every pass, registered dynamic values are refreshed from the
//! environment the pass was built with.

pub mod backend;
pub mod boundary;
pub mod builder;
pub mod color;
pub mod config;
pub mod descriptor;
pub mod dynamic;
pub mod environment;
pub mod error;
pub mod headless;
mod host;
pub mod identity;
pub mod layout;
pub mod patch;
pub mod rect;
pub mod reconcile;
pub mod scheduler;
pub mod tree;

pub use backend::{Backend, Handle};
pub use config::HostConfig;
pub use descriptor::{Boundary, Conditional, Container, Descriptor, KeyedCollection, Leaf, Switch, WidgetKind};
pub use environment::{Environment, EnvironmentKey};
pub use error::{BuildError, CommitError, ValueError};
pub use host::{Host, PassReport};
pub use identity::Key;
pub use patch::Patch;
pub use scheduler::Invalidator;
pub use tree::{NodeId, NodeTree};
