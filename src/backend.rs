//! Traits for backends.
//!
//! A backend owns the native widgets. Sprig only ever refers to them through opaque [`Handle`]s
//! and calls into the backend while committing patches.

use crate::descriptor::{Props, WidgetKind};
use crate::layout::LayoutSlot;
use crate::rect::Rect;
use core::fmt;

/// An opaque reference to a native widget, issued by the backend.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl Handle {
    pub const fn from_raw(raw: u64) -> Handle {
        Handle(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// A native widget backend.
///
/// All methods must be idempotent with respect to repeated identical configuration.
pub trait Backend {
    /// Error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates a new native widget. Called at most once per node lifetime.
    fn make_handle(&mut self, kind: &WidgetKind) -> Result<Handle, Self::Error>;

    /// Applies configuration. Called on every pass where the node is reused or newly attached.
    fn update_handle(&mut self, handle: Handle, props: &Props) -> Result<(), Self::Error>;

    /// Hands a node's layout slot to the layout collaborator.
    ///
    /// Returns the node's frame, which is cached on the node and carried over when it is reused.
    fn apply_layout(&mut self, handle: Handle, slot: &LayoutSlot) -> Result<Option<Rect>, Self::Error> {
        let _ = handle;
        Ok(slot.frame)
    }

    /// Replaces the native children of a widget, in order.
    ///
    /// Composites are never part of this list; they are attached separately.
    fn set_children(&mut self, parent: Handle, children: &[Handle]) -> Result<(), Self::Error>;

    /// Destroys a native widget. It has already been removed from any composite host.
    fn destroy_handle(&mut self, handle: Handle) -> Result<(), Self::Error>;

    /// Constructs an opaque composite around already-built panes.
    fn make_composite(&mut self, kind: &WidgetKind, panes: &[Handle]) -> Result<Handle, Self::Error>;

    /// Replaces a composite's panes. Only called while the composite is detached.
    fn replace_panes(&mut self, composite: Handle, panes: &[Handle]) -> Result<(), Self::Error>;

    /// Attaches a composite to its hosting widget.
    ///
    /// - `position`: index among the composites attached to `host`. Composites are attached
    ///   front to back, so every composite before `position` is already in place.
    fn attach_composite(&mut self, composite: Handle, host: Handle, position: usize) -> Result<(), Self::Error>;

    /// Detaches a composite from its hosting widget.
    fn detach_composite(&mut self, composite: Handle) -> Result<(), Self::Error>;
}
