//! Property-based invariant tests for building and reconciling descriptor trees.
//!
//! 1. Rebuilding an unchanged description reuses every node and only reconfigures widgets.
//! 2. A value bound on a subtree is seen by exactly that subtree.

use proptest::prelude::*;
use sprig::descriptor::{Boundary, Conditional, Container, Descriptor, KeyedCollection, Leaf, PropValue, WidgetKind};
use sprig::environment::{Environment, EnvironmentKey};
use sprig::headless::{Call, Headless};
use sprig::reconcile::equivalent;
use sprig::{Host, HostConfig};

const KINDS: [&str; 3] = ["label", "button", "image"];

struct Tint;

impl EnvironmentKey for Tint {
    type Value = i64;
    fn default_value() -> i64 {
        0
    }
}

/// A generated description. Converted to a [`Descriptor`] for every pass, like application code
/// would.
#[derive(Debug, Clone)]
enum Shape {
    Leaf(u8, Option<u8>, i64),
    Stack(bool, Vec<Shape>),
    Group(Vec<Shape>),
    Keyed(Vec<(u8, Shape)>),
    When(bool, Box<Shape>, Box<Shape>),
    Boundary(Box<Shape>),
    Tinted(u8, Box<Shape>),
}

impl Shape {
    /// `tint` is the value every node built from this shape must see.
    fn descriptor(&self, tint: i64) -> Descriptor {
        match self {
            Shape::Leaf(kind, key, value) => {
                let mut leaf = Leaf::new(WidgetKind::new(KINDS[*kind as usize]))
                    .prop("value", *value)
                    .prop("tint", tint);
                if let Some(key) = key {
                    leaf = leaf.key(*key as u64);
                }
                leaf.into()
            }
            Shape::Stack(horizontal, children) => {
                let stack = if *horizontal {
                    Container::hstack()
                } else {
                    Container::vstack()
                };
                stack
                    .prop("tint", tint)
                    .children(children.iter().map(|child| child.descriptor(tint)))
                    .into()
            }
            Shape::Group(items) => Descriptor::Group(items.iter().map(|item| item.descriptor(tint)).collect()),
            Shape::Keyed(items) => {
                KeyedCollection::new(items.clone(), |(key, _)| *key, move |(_, item)| item.descriptor(tint)).into()
            }
            Shape::When(cond, then, otherwise) => {
                let (then, otherwise) = (then.descriptor(tint), otherwise.descriptor(tint));
                Conditional::when(*cond, move || then.clone())
                    .otherwise(move || otherwise.clone())
                    .into()
            }
            Shape::Boundary(content) => Boundary::single(WidgetKind::new("navigation"), content.descriptor(tint))
                .prop("tint", tint)
                .into(),
            Shape::Tinted(value, content) => {
                let value = *value as i64;
                content.descriptor(value).environment::<Tint>(value)
            }
        }
    }
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    let leaf = (0u8..3, proptest::option::of(0u8..4), 0i64..3)
        .prop_map(|(kind, key, value)| Shape::Leaf(kind, key, value));
    leaf.prop_recursive(4, 48, 4, |inner| {
        prop_oneof![
            (any::<bool>(), prop::collection::vec(inner.clone(), 0..4))
                .prop_map(|(horizontal, children)| Shape::Stack(horizontal, children)),
            prop::collection::vec(inner.clone(), 0..3).prop_map(Shape::Group),
            prop::collection::vec((0u8..6, inner.clone()), 0..4).prop_map(Shape::Keyed),
            (any::<bool>(), inner.clone(), inner.clone())
                .prop_map(|(cond, a, b)| Shape::When(cond, Box::new(a), Box::new(b))),
            inner.clone().prop_map(|content| Shape::Boundary(Box::new(content))),
            (1u8..10, inner).prop_map(|(value, content)| Shape::Tinted(value, Box::new(content))),
        ]
    })
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Idempotent rebuild
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn identical_rebuild_reuses_every_node(shape in shape_strategy()) {
        let mut host = Host::new(Headless::new(), HostConfig::default(), move |_env| shape.descriptor(0));
        host.poll().unwrap();
        let first = host.tree().unwrap().clone();
        let calls_before = host.backend().calls().len();

        host.request_rebuild();
        let report = host.poll().unwrap().unwrap();
        prop_assert!(report.reused, "second pass was not reused:\n{}", first.outline());
        prop_assert_eq!(report.stats.created, 0);
        prop_assert_eq!(report.stats.destroyed, 0);
        prop_assert_eq!(report.stats.moved, 0);
        prop_assert!(report.boundary_replacements.is_empty());

        let tree = host.tree().unwrap();
        let root = tree.root().unwrap();
        prop_assert!(tree.descendants(root).iter().all(|id| tree[*id].is_reused()));
        prop_assert!(equivalent(tree, root, &first, first.root().unwrap()));

        // the backend only sees reconfiguration
        let calls = &host.backend().calls()[calls_before..];
        prop_assert!(
            calls.iter().all(|call| matches!(call, Call::Update(_))),
            "unexpected calls: {:?}",
            calls
        );
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Environment scoping
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn bound_values_reach_exactly_the_subtree(shape in shape_strategy()) {
        let mut host = Host::new(Headless::new(), HostConfig::default(), move |_env| shape.descriptor(0));
        host.poll().unwrap();

        let tree = host.tree().unwrap();
        prop_assert_eq!(tree[tree.root().unwrap()].environment().get::<Tint>(), 0);
        for (_, node) in tree.iter() {
            if let Some(PropValue::Int(expected)) = node.props().get("tint") {
                prop_assert_eq!(node.environment().get::<Tint>(), *expected);
            }
        }
    }

    #[test]
    fn with_never_touches_the_parent_scope(values in prop::collection::vec(any::<i64>(), 1..8)) {
        let base = Environment::new();
        let mut scopes = vec![base.clone()];
        for value in &values {
            let next = scopes.last().unwrap().with::<Tint>(*value);
            scopes.push(next);
        }
        prop_assert_eq!(base.get::<Tint>(), 0);
        for (scope, value) in scopes[1..].iter().zip(&values) {
            prop_assert_eq!(scope.get::<Tint>(), *value);
        }
    }
}
