//! Errors and diagnostics.

use crate::boundary::InvalidTransition;
use crate::patch::PatchKind;
use crate::tree::NodeId;
use thiserror::Error;

/// Structural problems found while building or reconciling a tree.
///
/// These never abort a pass. The offending subtree degrades to absent content, the problem is
/// logged, and it is collected into the pass report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// An extension descriptor with no registered expander.
    #[error("no expander registered for descriptor `{name}`")]
    UnrecognizedDescriptor { name: &'static str },

    /// Two elements of one keyed expansion produced the same key. The first one wins.
    #[error("duplicate key {key} in keyed collection; keeping the first element")]
    DuplicateKey { key: String },

    /// A boundary pane did not expand to exactly one direct child.
    #[error("boundary `{kind}` pane {pane} has {children} direct children (expected exactly 1)")]
    BoundaryArity {
        kind: String,
        pane: usize,
        children: usize,
    },

    /// The descriptor tree nests deeper than the configured limit.
    #[error("descriptor nesting exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },
}

/// Failure to resolve a dynamic value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// An externally-owned value was in neither the per-pass nor the ambient environment.
    #[error("no value of type `{type_name}` in the environment")]
    NotFound { type_name: &'static str },
}

/// Failure while applying patches to a backend.
#[derive(Debug, Error)]
pub enum CommitError<E: std::error::Error + 'static> {
    #[error("backend failed to apply {patch:?} patch")]
    Backend {
        patch: PatchKind,
        #[source]
        source: E,
    },

    #[error(transparent)]
    Boundary(#[from] InvalidTransition),

    /// A patch referred to a node that is not in the tree being committed.
    #[error("no node {node:?} in the committed tree")]
    MissingNode { node: NodeId },

    /// A patch needed the native handle of a node that has not been attached.
    #[error("node {node:?} has no native handle")]
    MissingHandle { node: NodeId },
}

/// Invalid host configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid host configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
