//! The boundary to the layout collaborator.
//!
//! Sprig never lays anything out itself. Containers attach [`LayoutHints`] to their children, and
//! leaves may carry a [`LayoutSpec`] closure. Both are handed to the backend whenever a node is
//! confirmed reused or newly attached.

use crate::backend::Handle;
use crate::environment::Environment;
use crate::rect::Rect;
use cgmath::Vector2;
use core::fmt;
use std::sync::Arc;

/// Main axis of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HorizontalAlignment {
    Leading,
    Center,
    Trailing,
    SpaceBetween,
    SpaceAround,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerticalAlignment {
    Top,
    Center,
    Bottom,
    SpaceBetween,
    SpaceAround,
    Stretch,
}

/// Two-dimensional alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Alignment {
    pub horizontal: HorizontalAlignment,
    pub vertical: VerticalAlignment,
}

impl Alignment {
    pub const CENTER: Alignment = Alignment::new(HorizontalAlignment::Center, VerticalAlignment::Center);
    pub const LEADING: Alignment = Alignment::new(HorizontalAlignment::Leading, VerticalAlignment::Center);
    pub const TRAILING: Alignment = Alignment::new(HorizontalAlignment::Trailing, VerticalAlignment::Center);
    pub const TOP: Alignment = Alignment::new(HorizontalAlignment::Center, VerticalAlignment::Top);
    pub const BOTTOM: Alignment = Alignment::new(HorizontalAlignment::Center, VerticalAlignment::Bottom);
    pub const TOP_LEADING: Alignment = Alignment::new(HorizontalAlignment::Leading, VerticalAlignment::Top);

    pub const fn new(horizontal: HorizontalAlignment, vertical: VerticalAlignment) -> Alignment {
        Alignment {
            horizontal,
            vertical,
        }
    }
}

impl Default for Alignment {
    fn default() -> Alignment {
        Alignment::CENTER
    }
}

/// Layout-only metadata a container attaches to each of its children.
///
/// Unlike environment values, hints apply to the direct children only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutHints {
    /// Main axis of the enclosing stack.
    pub axis: Option<Axis>,
    /// Spacing between siblings along the main axis.
    pub spacing: Option<f64>,
    /// Cross-axis alignment requested by the container.
    pub alignment: Option<Alignment>,
    /// Position among the container's children, after reversal.
    pub position: usize,
}

/// What a layout closure sees and writes for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSlot {
    /// The node's native handle.
    pub handle: Handle,
    /// Hints attached by the parent container.
    pub hints: LayoutHints,
    /// Preferred size, if the closure requests one.
    pub preferred_size: Option<Vector2<f64>>,
    /// Inner padding (horizontal, vertical).
    pub padding: Vector2<f64>,
    /// Frame computed for the previous pass. Carried over when a node is reused.
    pub frame: Option<Rect>,
}

impl LayoutSlot {
    pub(crate) fn new(handle: Handle, hints: LayoutHints, frame: Option<Rect>) -> LayoutSlot {
        LayoutSlot {
            handle,
            hints,
            preferred_size: None,
            padding: Vector2::new(0., 0.),
            frame,
        }
    }
}

/// A configuration closure applied to a node's layout slot on every build where the node is
/// reused or newly attached.
#[derive(Clone)]
pub struct LayoutSpec(Arc<dyn Fn(&mut LayoutSlot, &Environment) + Send + Sync>);

impl LayoutSpec {
    pub fn new<F>(spec: F) -> LayoutSpec
    where
        F: Fn(&mut LayoutSlot, &Environment) + Send + Sync + 'static,
    {
        LayoutSpec(Arc::new(spec))
    }

    pub fn apply(&self, slot: &mut LayoutSlot, env: &Environment) {
        (self.0)(slot, env)
    }
}

impl fmt::Debug for LayoutSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LayoutSpec(..)")
    }
}
