//! An in-memory backend.
//!
//! Mirrors the native widget tree the way a platform would see it and rejects operations a real
//! widget toolkit would choke on: unknown handles, attaching a composite twice, refilling a
//! composite while it is attached, or making a widget its own ancestor.

use crate::backend::{Backend, Handle};
use crate::descriptor::{PropValue, Props, WidgetKind};
use crate::layout::LayoutSlot;
use crate::rect::Rect;
use std::collections::HashMap;
use thiserror::Error;

/// Errors the headless backend reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeadlessError {
    #[error("no widget {0:?}")]
    NoSuchHandle(Handle),
    #[error("composite {0:?} is already attached")]
    AlreadyAttached(Handle),
    #[error("composite {0:?} is not attached")]
    NotAttached(Handle),
    #[error("{0:?} is not a composite")]
    NotComposite(Handle),
    #[error("setting the children of {0:?} would create a cycle")]
    Cycle(Handle),
}

/// Composite-only widget state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositeState {
    pub panes: Vec<Handle>,
    /// The widget hosting this composite while attached.
    pub host: Option<Handle>,
}

/// A widget as the headless backend sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeWidget {
    pub kind: WidgetKind,
    pub props: Props,
    pub parent: Option<Handle>,
    pub children: Vec<Handle>,
    /// Composites attached to this widget, in position order.
    pub attached: Vec<Handle>,
    pub composite: Option<CompositeState>,
    pub layout: Option<LayoutSlot>,
    /// How many times `update_handle` was called.
    pub updates: usize,
}

impl NativeWidget {
    fn new(kind: WidgetKind) -> NativeWidget {
        NativeWidget {
            kind,
            props: Props::new(),
            parent: None,
            children: Vec::new(),
            attached: Vec::new(),
            composite: None,
            layout: None,
            updates: 0,
        }
    }
}

/// A backend call, recorded in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Make(Handle),
    Update(Handle),
    SetChildren(Handle),
    Destroy(Handle),
    MakeComposite(Handle),
    ReplacePanes(Handle),
    Attach { composite: Handle, host: Handle },
    Detach(Handle),
}

/// A [`Backend`] that keeps widgets in memory.
#[derive(Debug, Default)]
pub struct Headless {
    widgets: HashMap<Handle, NativeWidget>,
    next_id: u64,
    calls: Vec<Call>,
}

impl Headless {
    pub fn new() -> Headless {
        Headless::default()
    }

    pub fn widget(&self, handle: Handle) -> Option<&NativeWidget> {
        self.widgets.get(&handle)
    }

    /// Number of live widgets.
    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// All calls received so far.
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    /// Counts recorded calls matching a predicate.
    pub fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| pred(call)).count()
    }

    /// Number of composites attached to `host`.
    pub fn attached_count(&self, host: Handle) -> usize {
        self.widgets.get(&host).map_or(0, |w| w.attached.len())
    }

    /// Renders a widget and everything below it, e.g. `vstack[label(text="a"), split{..}]`.
    ///
    /// Attached composites are listed after ordinary children, with their panes in braces.
    pub fn describe(&self, handle: Handle) -> String {
        let widget = match self.widgets.get(&handle) {
            Some(widget) => widget,
            None => return format!("<missing {:?}>", handle),
        };

        let mut out = widget.kind.to_string();
        if !widget.props.is_empty() {
            let props: Vec<_> = widget
                .props
                .iter()
                .map(|(name, value)| format!("{}={}", name, describe_prop(value)))
                .collect();
            out.push('(');
            out.push_str(&props.join(", "));
            out.push(')');
        }
        if let Some(composite) = &widget.composite {
            let panes: Vec<_> = composite.panes.iter().map(|p| self.describe(*p)).collect();
            out.push('{');
            out.push_str(&panes.join(", "));
            out.push('}');
        }
        let inner: Vec<_> = widget
            .children
            .iter()
            .chain(&widget.attached)
            .map(|child| self.describe(*child))
            .collect();
        if !inner.is_empty() {
            out.push('[');
            out.push_str(&inner.join(", "));
            out.push(']');
        }
        out
    }

    fn alloc(&mut self, widget: NativeWidget) -> Handle {
        self.next_id += 1;
        let handle = Handle::from_raw(self.next_id);
        self.widgets.insert(handle, widget);
        handle
    }

    fn get_mut(&mut self, handle: Handle) -> Result<&mut NativeWidget, HeadlessError> {
        self.widgets
            .get_mut(&handle)
            .ok_or(HeadlessError::NoSuchHandle(handle))
    }

    fn is_ancestor(&self, candidate: Handle, of: Handle) -> bool {
        let mut cursor = Some(of);
        while let Some(handle) = cursor {
            if handle == candidate {
                return true;
            }
            cursor = self.widgets.get(&handle).and_then(|w| w.parent);
        }
        false
    }
}

fn describe_prop(value: &PropValue) -> String {
    match value {
        PropValue::Bool(b) => b.to_string(),
        PropValue::Int(i) => i.to_string(),
        PropValue::Float(f) => f.to_string(),
        PropValue::Text(s) => format!("{:?}", s),
        PropValue::Color(c) => format!("rgba({}, {}, {}, {})", c.r, c.g, c.b, c.a),
    }
}

impl Backend for Headless {
    type Error = HeadlessError;

    fn make_handle(&mut self, kind: &WidgetKind) -> Result<Handle, HeadlessError> {
        let handle = self.alloc(NativeWidget::new(kind.clone()));
        self.calls.push(Call::Make(handle));
        Ok(handle)
    }

    fn update_handle(&mut self, handle: Handle, props: &Props) -> Result<(), HeadlessError> {
        let widget = self.get_mut(handle)?;
        widget.props = props.clone();
        widget.updates += 1;
        self.calls.push(Call::Update(handle));
        Ok(())
    }

    fn apply_layout(&mut self, handle: Handle, slot: &LayoutSlot) -> Result<Option<Rect>, HeadlessError> {
        let widget = self.get_mut(handle)?;
        widget.layout = Some(slot.clone());
        // no real layout; a preferred size is taken as is
        Ok(match slot.preferred_size {
            Some(size) => Some(Rect::from_size(size).outset(slot.padding)),
            None => slot.frame,
        })
    }

    fn set_children(&mut self, parent: Handle, children: &[Handle]) -> Result<(), HeadlessError> {
        for child in children {
            if !self.widgets.contains_key(child) {
                return Err(HeadlessError::NoSuchHandle(*child));
            }
            if self.is_ancestor(*child, parent) {
                return Err(HeadlessError::Cycle(parent));
            }
        }

        let previous = std::mem::take(&mut self.get_mut(parent)?.children);
        for child in previous {
            if let Some(widget) = self.widgets.get_mut(&child) {
                if widget.parent == Some(parent) {
                    widget.parent = None;
                }
            }
        }
        for child in children {
            let widget = self.get_mut(*child)?;
            // a widget has one parent; moving it drops it from the old one
            if let Some(old) = widget.parent.replace(parent) {
                if old != parent {
                    if let Some(old) = self.widgets.get_mut(&old) {
                        old.children.retain(|c| c != child);
                    }
                }
            }
        }
        self.get_mut(parent)?.children = children.to_vec();
        self.calls.push(Call::SetChildren(parent));
        Ok(())
    }

    fn destroy_handle(&mut self, handle: Handle) -> Result<(), HeadlessError> {
        let widget = self
            .widgets
            .remove(&handle)
            .ok_or(HeadlessError::NoSuchHandle(handle))?;
        if let Some(parent) = widget.parent.and_then(|p| self.widgets.get_mut(&p)) {
            parent.children.retain(|c| *c != handle);
        }
        if let Some(host) = widget
            .composite
            .as_ref()
            .and_then(|c| c.host)
            .and_then(|h| self.widgets.get_mut(&h))
        {
            host.attached.retain(|c| *c != handle);
        }
        for child in widget.children {
            if let Some(child) = self.widgets.get_mut(&child) {
                child.parent = None;
            }
        }
        self.calls.push(Call::Destroy(handle));
        Ok(())
    }

    fn make_composite(&mut self, kind: &WidgetKind, panes: &[Handle]) -> Result<Handle, HeadlessError> {
        for pane in panes {
            if !self.widgets.contains_key(pane) {
                return Err(HeadlessError::NoSuchHandle(*pane));
            }
        }
        let mut widget = NativeWidget::new(kind.clone());
        widget.composite = Some(CompositeState {
            panes: panes.to_vec(),
            host: None,
        });
        let handle = self.alloc(widget);
        self.calls.push(Call::MakeComposite(handle));
        Ok(handle)
    }

    fn replace_panes(&mut self, composite: Handle, panes: &[Handle]) -> Result<(), HeadlessError> {
        for pane in panes {
            if !self.widgets.contains_key(pane) {
                return Err(HeadlessError::NoSuchHandle(*pane));
            }
        }
        let state = self
            .get_mut(composite)?
            .composite
            .as_mut()
            .ok_or(HeadlessError::NotComposite(composite))?;
        if state.host.is_some() {
            return Err(HeadlessError::AlreadyAttached(composite));
        }
        state.panes = panes.to_vec();
        self.calls.push(Call::ReplacePanes(composite));
        Ok(())
    }

    fn attach_composite(&mut self, composite: Handle, host: Handle, position: usize) -> Result<(), HeadlessError> {
        if !self.widgets.contains_key(&host) {
            return Err(HeadlessError::NoSuchHandle(host));
        }
        let state = self
            .get_mut(composite)?
            .composite
            .as_mut()
            .ok_or(HeadlessError::NotComposite(composite))?;
        if state.host.is_some() {
            return Err(HeadlessError::AlreadyAttached(composite));
        }
        state.host = Some(host);

        let host_widget = self.get_mut(host)?;
        let index = position.min(host_widget.attached.len());
        host_widget.attached.insert(index, composite);
        self.calls.push(Call::Attach { composite, host });
        Ok(())
    }

    fn detach_composite(&mut self, composite: Handle) -> Result<(), HeadlessError> {
        let state = self
            .get_mut(composite)?
            .composite
            .as_mut()
            .ok_or(HeadlessError::NotComposite(composite))?;
        let host = state.host.take().ok_or(HeadlessError::NotAttached(composite))?;
        if let Some(host) = self.widgets.get_mut(&host) {
            host.attached.retain(|c| *c != composite);
        }
        self.calls.push(Call::Detach(composite));
        Ok(())
    }
}
