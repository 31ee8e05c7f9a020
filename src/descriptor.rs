//! Descriptors: immutable, per-build descriptions of the desired UI.
//!
//! Descriptors are cheap values with no identity of their own. They are created fresh on every
//! build pass and discarded once the tree builder has expanded them into nodes.

use crate::color::Color;
use crate::environment::{Environment, EnvironmentKey};
use crate::identity::{Key, TagValue};
use crate::layout::{Alignment, Axis, LayoutSlot, LayoutSpec};
use core::any::{Any, TypeId};
use core::fmt;
use core::hash::Hash;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The reuse identifier of a native widget type.
///
/// Two nodes can only share a native handle if their kinds are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WidgetKind(Cow<'static, str>);

impl WidgetKind {
    /// Kind of the root node that stands in for the hosting surface.
    pub const ROOT: WidgetKind = WidgetKind::new("root");
    pub const VSTACK: WidgetKind = WidgetKind::new("vstack");
    pub const HSTACK: WidgetKind = WidgetKind::new("hstack");

    pub const fn new(name: &'static str) -> WidgetKind {
        WidgetKind(Cow::Borrowed(name))
    }

    pub fn owned(name: String) -> WidgetKind {
        WidgetKind(Cow::Owned(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single widget property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Arc<str>),
    Color(Color),
}

macro_rules! impl_prop_from {
    ($($t:ty => $variant:ident),+) => {
        $(
            impl From<$t> for PropValue {
                fn from(value: $t) -> PropValue {
                    PropValue::$variant(value.into())
                }
            }
        )+
    }
}
impl_prop_from!(bool => Bool, i64 => Int, i32 => Int, f64 => Float, Color => Color, &str => Text, String => Text);

/// Widget configuration handed to the backend on every update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Props {
    map: BTreeMap<&'static str, PropValue>,
}

impl Props {
    pub fn new() -> Props {
        Props::default()
    }

    pub fn set(&mut self, name: &'static str, value: impl Into<PropValue>) {
        self.map.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.map.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PropValue)> {
        self.map.iter().map(|(k, v)| (*k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Lazily produced descriptor content.
pub type Content = Arc<dyn Fn() -> Descriptor + Send + Sync>;

/// A description of UI content.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// Nothing. Produces no node.
    Empty,
    /// A native widget without descriptor children.
    Leaf(Leaf),
    /// A native widget whose children are described by descriptors, e.g. a stack.
    Container(Container),
    /// A fragment; its items are spliced into the parent's child list.
    Group(Vec<Descriptor>),
    /// Elements identified by key, matched by key across rebuilds.
    Keyed(KeyedCollection),
    /// An if/else-if/else or switch chain. The first matching case wins.
    Conditional(Conditional),
    /// A subtree owned by an opaque native composite.
    Boundary(Boundary),
    /// Content built under a modified environment.
    Scoped(Scoped),
    /// An application-defined descriptor, expanded by a registered expander.
    Extension(Extension),
}

impl Descriptor {
    /// Short name of the descriptor variant, for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Descriptor::Empty => "empty",
            Descriptor::Leaf(_) => "leaf",
            Descriptor::Container(_) => "container",
            Descriptor::Group(_) => "group",
            Descriptor::Keyed(_) => "keyed",
            Descriptor::Conditional(_) => "conditional",
            Descriptor::Boundary(_) => "boundary",
            Descriptor::Scoped(_) => "scoped",
            Descriptor::Extension(_) => "extension",
        }
    }

    /// Builds this content with `K` bound to `value`.
    pub fn environment<K: EnvironmentKey>(self, value: K::Value) -> Descriptor {
        Descriptor::Scoped(Scoped::new(self, move |env| env.with::<K>(value.clone())))
    }

    /// Builds this content with an environment object available.
    pub fn environment_object<T: Send + Sync + 'static>(self, object: Arc<T>) -> Descriptor {
        Descriptor::Scoped(Scoped::new(self, move |env| {
            env.with_object(Arc::clone(&object))
        }))
    }
}

impl Default for Descriptor {
    fn default() -> Descriptor {
        Descriptor::Empty
    }
}

impl From<Vec<Descriptor>> for Descriptor {
    fn from(items: Vec<Descriptor>) -> Descriptor {
        Descriptor::Group(items)
    }
}

macro_rules! impl_descriptor_from {
    ($($t:ident),+) => {
        $(
            impl From<$t> for Descriptor {
                fn from(d: $t) -> Descriptor {
                    Descriptor::$t(d)
                }
            }
        )+
    }
}
impl_descriptor_from!(Leaf, Container, Conditional, Boundary, Scoped, Extension);

impl From<KeyedCollection> for Descriptor {
    fn from(d: KeyedCollection) -> Descriptor {
        Descriptor::Keyed(d)
    }
}

/// A leaf widget.
#[derive(Debug, Clone)]
pub struct Leaf {
    pub kind: WidgetKind,
    pub key: Option<Key>,
    pub props: Props,
    pub layout: Option<LayoutSpec>,
}

impl Leaf {
    pub fn new(kind: WidgetKind) -> Leaf {
        Leaf {
            kind,
            key: None,
            props: Props::new(),
            layout: None,
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Leaf {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, name: &'static str, value: impl Into<PropValue>) -> Leaf {
        self.props.set(name, value);
        self
    }

    pub fn layout<F>(mut self, spec: F) -> Leaf
    where
        F: Fn(&mut LayoutSlot, &Environment) + Send + Sync + 'static,
    {
        self.layout = Some(LayoutSpec::new(spec));
        self
    }
}

/// A container widget such as a stack.
#[derive(Debug, Clone)]
pub struct Container {
    pub kind: WidgetKind,
    pub key: Option<Key>,
    pub props: Props,
    pub axis: Option<Axis>,
    pub spacing: Option<f64>,
    pub alignment: Option<Alignment>,
    /// Lay children out in reverse order.
    pub reversed: bool,
    pub children: Vec<Descriptor>,
}

impl Container {
    pub fn new(kind: WidgetKind) -> Container {
        Container {
            kind,
            key: None,
            props: Props::new(),
            axis: None,
            spacing: None,
            alignment: None,
            reversed: false,
            children: Vec::new(),
        }
    }

    /// A directional stack.
    pub fn stack(axis: Axis) -> Container {
        let kind = match axis {
            Axis::Horizontal => WidgetKind::HSTACK,
            Axis::Vertical => WidgetKind::VSTACK,
        };
        Container {
            axis: Some(axis),
            ..Container::new(kind)
        }
    }

    pub fn vstack() -> Container {
        Container::stack(Axis::Vertical)
    }

    pub fn hstack() -> Container {
        Container::stack(Axis::Horizontal)
    }

    pub fn key(mut self, key: impl Into<Key>) -> Container {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, name: &'static str, value: impl Into<PropValue>) -> Container {
        self.props.set(name, value);
        self
    }

    pub fn spacing(mut self, spacing: f64) -> Container {
        self.spacing = Some(spacing);
        self
    }

    pub fn alignment(mut self, alignment: Alignment) -> Container {
        self.alignment = Some(alignment);
        self
    }

    pub fn reversed(mut self, reversed: bool) -> Container {
        self.reversed = reversed;
        self
    }

    pub fn child(mut self, child: impl Into<Descriptor>) -> Container {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Container
    where
        I: IntoIterator,
        I::Item: Into<Descriptor>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}

/// One element of a keyed collection.
#[derive(Debug, Clone)]
pub struct Element {
    /// Key-path identity and the key value it was derived from. `None` means positional.
    pub identity: Option<(Key, TagValue)>,
    pub content: Descriptor,
}

/// A collection of elements, each built like a normal child and identified by key.
#[derive(Debug, Clone, Default)]
pub struct KeyedCollection {
    pub elements: Vec<Element>,
}

impl KeyedCollection {
    /// Elements keyed by a key path into each data element.
    pub fn new<T, K, KF, CF>(data: impl IntoIterator<Item = T>, key: KF, content: CF) -> KeyedCollection
    where
        K: Hash + fmt::Debug + Send + Sync + 'static,
        KF: Fn(&T) -> K,
        CF: Fn(&T) -> Descriptor,
    {
        KeyedCollection {
            elements: data
                .into_iter()
                .map(|item| {
                    let id = key(&item);
                    Element {
                        identity: Some((Key::of(&id), TagValue::new(id))),
                        content: content(&item),
                    }
                })
                .collect(),
        }
    }

    /// Elements keyed by position.
    pub fn indexed<T, CF>(data: impl IntoIterator<Item = T>, content: CF) -> KeyedCollection
    where
        CF: Fn(&T) -> Descriptor,
    {
        KeyedCollection {
            elements: data
                .into_iter()
                .map(|item| Element {
                    identity: None,
                    content: content(&item),
                })
                .collect(),
        }
    }

    /// Like [`KeyedCollection::new`], but the content function also receives the element offset.
    pub fn enumerated<T, K, KF, CF>(
        data: impl IntoIterator<Item = T>,
        key: KF,
        content: CF,
    ) -> KeyedCollection
    where
        K: Hash + fmt::Debug + Send + Sync + 'static,
        KF: Fn(&T) -> K,
        CF: Fn(usize, &T) -> Descriptor,
    {
        KeyedCollection {
            elements: data
                .into_iter()
                .enumerate()
                .map(|(offset, item)| {
                    let id = key(&item);
                    Element {
                        identity: Some((Key::of(&id), TagValue::new(id))),
                        content: content(offset, &item),
                    }
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// One case of a conditional chain.
#[derive(Clone)]
pub struct Case {
    pub predicate: Arc<dyn Fn() -> bool + Send + Sync>,
    pub content: Content,
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Case(..)")
    }
}

/// Which branch of a conditional chain was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Case(usize),
    Default,
    Nothing,
}

/// A control-flow chain. Predicates are evaluated in declaration order and only the content of the
/// first match is produced; the default is produced only if nothing matched.
#[derive(Debug, Clone, Default)]
pub struct Conditional {
    pub cases: Vec<Case>,
    pub default: Option<CaseContent>,
}

/// Wrapper to give default content a `Debug` impl.
#[derive(Clone)]
pub struct CaseContent(pub Content);

impl fmt::Debug for CaseContent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CaseContent(..)")
    }
}

impl Conditional {
    pub fn new() -> Conditional {
        Conditional::default()
    }

    /// `if cond { then }`
    pub fn when<F>(cond: bool, then: F) -> Conditional
    where
        F: Fn() -> Descriptor + Send + Sync + 'static,
    {
        Conditional::new().case(move || cond, then)
    }

    pub fn case<P, F>(mut self, predicate: P, content: F) -> Conditional
    where
        P: Fn() -> bool + Send + Sync + 'static,
        F: Fn() -> Descriptor + Send + Sync + 'static,
    {
        self.cases.push(Case {
            predicate: Arc::new(predicate),
            content: Arc::new(content),
        });
        self
    }

    /// `else if cond { then }`
    pub fn else_when<F>(self, cond: bool, then: F) -> Conditional
    where
        F: Fn() -> Descriptor + Send + Sync + 'static,
    {
        self.case(move || cond, then)
    }

    pub fn otherwise<F>(mut self, content: F) -> Conditional
    where
        F: Fn() -> Descriptor + Send + Sync + 'static,
    {
        self.default = Some(CaseContent(Arc::new(content)));
        self
    }

    /// Evaluates predicates in order, stopping at the first match.
    pub fn select(&self) -> Selection {
        for (i, case) in self.cases.iter().enumerate() {
            if (case.predicate)() {
                return Selection::Case(i);
            }
        }
        if self.default.is_some() {
            Selection::Default
        } else {
            Selection::Nothing
        }
    }

    /// Returns the content of the selected branch.
    pub fn selected_content(&self, selection: Selection) -> Option<&Content> {
        match selection {
            Selection::Case(i) => self.cases.get(i).map(|case| &case.content),
            Selection::Default => self.default.as_ref().map(|c| &c.0),
            Selection::Nothing => None,
        }
    }
}

/// A `switch` over a value, producing a [`Conditional`].
///
/// ```
/// use sprig::descriptor::{Descriptor, Leaf, Switch, WidgetKind};
///
/// let tab = 2;
/// let content: Descriptor = Switch::over(tab)
///     .case_eq(1, || Leaf::new(WidgetKind::new("inbox")).into())
///     .case(|t| *t > 1, || Leaf::new(WidgetKind::new("archive")).into())
///     .default(|| Descriptor::Empty)
///     .into();
/// # drop(content);
/// ```
pub struct Switch<T> {
    value: Arc<T>,
    chain: Conditional,
}

impl<T: Send + Sync + 'static> Switch<T> {
    pub fn over(value: T) -> Switch<T> {
        Switch {
            value: Arc::new(value),
            chain: Conditional::new(),
        }
    }

    pub fn case<P, F>(self, predicate: P, content: F) -> Switch<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
        F: Fn() -> Descriptor + Send + Sync + 'static,
    {
        let value = Arc::clone(&self.value);
        Switch {
            chain: self.chain.case(move || predicate(&value), content),
            value: self.value,
        }
    }

    pub fn case_eq<F>(self, comparate: T, content: F) -> Switch<T>
    where
        T: PartialEq,
        F: Fn() -> Descriptor + Send + Sync + 'static,
    {
        self.case(move |value| *value == comparate, content)
    }

    pub fn default<F>(self, content: F) -> Conditional
    where
        F: Fn() -> Descriptor + Send + Sync + 'static,
    {
        self.chain.otherwise(content)
    }

    pub fn finish(self) -> Conditional {
        self.chain
    }
}

impl<T: Send + Sync + 'static> From<Switch<T>> for Descriptor {
    fn from(switch: Switch<T>) -> Descriptor {
        Descriptor::Conditional(switch.finish())
    }
}

/// A controller boundary: content owned by an opaque native composite.
///
/// Each pane must expand to exactly one direct child.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub kind: WidgetKind,
    pub key: Option<Key>,
    pub props: Props,
    pub panes: Vec<Descriptor>,
}

impl Boundary {
    /// A boundary with a single content pane.
    pub fn single(kind: WidgetKind, content: impl Into<Descriptor>) -> Boundary {
        Boundary {
            kind,
            key: None,
            props: Props::new(),
            panes: vec![content.into()],
        }
    }

    /// A boundary with a primary and a secondary pane (e.g. a split view).
    pub fn split(
        kind: WidgetKind,
        primary: impl Into<Descriptor>,
        secondary: impl Into<Descriptor>,
    ) -> Boundary {
        Boundary {
            kind,
            key: None,
            props: Props::new(),
            panes: vec![primary.into(), secondary.into()],
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Boundary {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, name: &'static str, value: impl Into<PropValue>) -> Boundary {
        self.props.set(name, value);
        self
    }
}

/// Content built under an environment derived from the enclosing one.
#[derive(Clone)]
pub struct Scoped {
    pub bind: Arc<dyn Fn(&Environment) -> Environment + Send + Sync>,
    pub content: Box<Descriptor>,
}

impl Scoped {
    pub fn new<F>(content: Descriptor, bind: F) -> Scoped
    where
        F: Fn(&Environment) -> Environment + Send + Sync + 'static,
    {
        Scoped {
            bind: Arc::new(bind),
            content: Box::new(content),
        }
    }
}

impl fmt::Debug for Scoped {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Scoped")
            .field("content", &self.content)
            .finish()
    }
}

/// An application-defined descriptor value.
#[derive(Clone)]
pub struct Extension {
    pub(crate) type_id: TypeId,
    pub name: &'static str,
    pub(crate) value: Arc<dyn Any + Send + Sync>,
}

impl Extension {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Extension {
        Extension {
            type_id: TypeId::of::<T>(),
            name: core::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Extension({})", self.name)
    }
}
