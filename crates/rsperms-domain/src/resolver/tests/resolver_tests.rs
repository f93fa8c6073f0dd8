//! Permission resolver test suite.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::context::ContextSet;
use crate::graph::InheritanceGraph;
use crate::model::{ContextFilter, Identity, IdentityId, InheritanceEdge, Node, Tristate};
use crate::resolver::{DefaultsLayer, PermissionResolver, ResolverConfig};

fn ctx(pairs: &[(&str, &str)]) -> ContextSet {
    ContextSet::from_pairs(pairs.iter().copied()).unwrap()
}

fn group(name: &str) -> Identity {
    Identity::group(name).unwrap()
}

fn user() -> Identity {
    Identity::user(Uuid::from_u128(7), Some("steve".to_string()))
}

fn user_id() -> IdentityId {
    IdentityId::User(Uuid::from_u128(7))
}

/// user -> [admin (10), default (0)], admin -> [mod]
fn sample_graph() -> InheritanceGraph {
    let mut graph = InheritanceGraph::new();
    graph.insert(
        user()
            .with_parent(InheritanceEdge::new("default"))
            .with_parent(InheritanceEdge::new("admin").with_weight(10)),
    );
    graph.insert(
        group("admin")
            .with_node(Node::permission("world.edit", true))
            .with_node(Node::prefix(100, "[Admin]"))
            .with_parent(InheritanceEdge::new("mod")),
    );
    graph.insert(
        group("mod")
            .with_node(Node::permission("chat.mute", true))
            .with_node(Node::permission("world.edit", false))
            .with_node(Node::prefix(50, "[Mod]")),
    );
    graph.insert(
        group("default")
            .with_node(Node::permission("chat.mute", false))
            .with_node(Node::permission("spawn.use", true))
            .with_node(Node::prefix(1, "[Member]")),
    );
    graph
}

// ========== Section 1: Determinism and Precedence ==========

#[test]
fn test_resolution_is_deterministic() {
    let graph = sample_graph();
    let resolver = PermissionResolver::default();
    let active = ctx(&[("server", "lobby")]);

    let first = resolver.compute(&graph, &user_id(), &active);
    for _ in 0..10 {
        let again = resolver.compute(&graph, &user_id(), &active);
        assert_eq!(again.permissions(), first.permissions());
        assert_eq!(again.meta(), first.meta());
    }
}

#[test]
fn test_own_node_overrides_inherited() {
    let mut graph = sample_graph();
    let updated = user()
        .with_parent(InheritanceEdge::new("default"))
        .with_parent(InheritanceEdge::new("admin").with_weight(10))
        .with_node(Node::permission("world.edit", false));
    graph.insert(updated);

    let resolver = PermissionResolver::default();
    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "world.edit", &ContextSet::empty()),
        Tristate::False
    );
}

#[test]
fn test_first_identity_in_traversal_decides() {
    let graph = sample_graph();
    let resolver = PermissionResolver::default();
    let active = ContextSet::empty();

    // admin is walked before mod, which denies it
    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "world.edit", &active),
        Tristate::True
    );
    // mod (via admin, weight 10) is walked before default
    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "chat.mute", &active),
        Tristate::True
    );
    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "spawn.use", &active),
        Tristate::True
    );
}

#[test]
fn test_highest_weight_wins_within_one_identity() {
    let mut graph = InheritanceGraph::new();
    graph.insert(
        user()
            .with_node(Node::permission("fly", true).with_weight(1))
            .with_node(Node::permission("fly", false).with_weight(5).with_context(ctx(&[("world", "nether")]))),
    );
    let resolver = PermissionResolver::default();

    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "fly", &ctx(&[("world", "nether")])),
        Tristate::False
    );
    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "fly", &ctx(&[("world", "end")])),
        Tristate::True
    );
}

#[test]
fn test_equal_weight_prefers_earliest_node() {
    let mut graph = InheritanceGraph::new();
    graph.insert(
        user()
            .with_node(Node::permission("fly", true).with_context(ctx(&[("world", "nether")])))
            .with_node(Node::permission("fly", false)),
    );
    let resolver = PermissionResolver::default();
    let active = ctx(&[("world", "nether")]);

    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "fly", &active),
        Tristate::True
    );
    let data = resolver.compute(&graph, &user_id(), &active);
    assert_eq!(data.permission_value("fly"), Tristate::True);
}

#[test]
fn test_snapshot_agrees_with_single_key_lookups() {
    let graph = sample_graph();
    let resolver = PermissionResolver::default();
    let active = ContextSet::empty();
    let data = resolver.compute(&graph, &user_id(), &active);

    for key in ["world.edit", "chat.mute", "spawn.use", "missing.node"] {
        assert_eq!(
            data.permission_value(key),
            resolver.resolve_permission(&graph, &user_id(), key, &active),
            "mismatch for {key}"
        );
    }
    assert_eq!(
        data.meta().prefix(),
        resolver.resolve_prefix(&graph, &user_id(), &active).as_deref()
    );
}

#[test]
fn test_permission_keys_are_case_insensitive() {
    let graph = sample_graph();
    let resolver = PermissionResolver::default();
    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "World.Edit", &ContextSet::empty()),
        Tristate::True
    );
    let data = resolver.compute(&graph, &user_id(), &ContextSet::empty());
    assert_eq!(data.permission_value("WORLD.EDIT"), Tristate::True);
}

// ========== Section 2: Context Filtering ==========

#[test]
fn test_context_gated_node_applies_only_in_context() {
    let mut graph = InheritanceGraph::new();
    graph.insert(user().with_node(
        Node::permission("build", true).with_context(ctx(&[("server", "creative")])),
    ));
    let resolver = PermissionResolver::default();

    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "build", &ctx(&[("server", "creative")])),
        Tristate::True
    );
    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "build", &ctx(&[("server", "lobby")])),
        Tristate::Undefined
    );
    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "build", &ContextSet::empty()),
        Tristate::Undefined
    );
}

#[test]
fn test_multi_value_filter_matches_any_value() {
    let mut graph = InheritanceGraph::new();
    let filter = ctx(&[("world", "nether"), ("world", "end")]);
    graph.insert(user().with_node(Node::permission("fly", true).with_context(filter)));
    let resolver = PermissionResolver::default();

    for world in ["nether", "end"] {
        assert_eq!(
            resolver.resolve_permission(&graph, &user_id(), "fly", &ctx(&[("world", world)])),
            Tristate::True
        );
    }
    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "fly", &ctx(&[("world", "overworld")])),
        Tristate::Undefined
    );
}

#[test]
fn test_context_gated_inheritance() {
    let mut graph = InheritanceGraph::new();
    graph.insert(user().with_parent(
        InheritanceEdge::new("builder").with_context(ctx(&[("server", "creative")])),
    ));
    graph.insert(group("builder").with_node(Node::permission("build", true)));
    let resolver = PermissionResolver::default();

    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "build", &ctx(&[("server", "creative")])),
        Tristate::True
    );
    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "build", &ctx(&[("server", "survival")])),
        Tristate::Undefined
    );
}

#[test]
fn test_malformed_filter_never_applies() {
    let mut graph = InheritanceGraph::new();
    graph.insert(user().with_node(
        Node::permission("fly", true).with_context(ContextFilter::Malformed("{{".to_string())),
    ));
    let resolver = PermissionResolver::default();

    assert_eq!(
        resolver.resolve_permission(&graph, &user_id(), "fly", &ContextSet::empty()),
        Tristate::Undefined
    );
}

#[test]
fn test_expired_nodes_and_edges_are_ignored() {
    let now = Utc::now();
    let past = now - Duration::minutes(5);
    let mut graph = InheritanceGraph::new();
    graph.insert(
        user()
            .with_node(Node::permission("fly", true).with_expiry(past))
            .with_parent(InheritanceEdge::new("vip").with_expiry(past)),
    );
    graph.insert(group("vip").with_node(Node::permission("kit.vip", true)));
    let resolver = PermissionResolver::default();

    let active = ContextSet::empty();
    assert_eq!(
        resolver.resolve_permission_at(&graph, &user_id(), "fly", &active, now),
        Tristate::Undefined
    );
    assert_eq!(
        resolver.resolve_permission_at(&graph, &user_id(), "kit.vip", &active, now),
        Tristate::Undefined
    );
    // still live an hour earlier
    let earlier = now - Duration::hours(1);
    assert_eq!(
        resolver.resolve_permission_at(&graph, &user_id(), "kit.vip", &active, earlier),
        Tristate::True
    );
}

// ========== Section 3: Cycle Safety ==========

#[test]
fn test_cyclic_hierarchy_completes() {
    let mut graph = InheritanceGraph::new();
    graph.insert(user().with_parent(InheritanceEdge::new("a")));
    graph.insert(
        group("a")
            .with_node(Node::permission("a.node", true))
            .with_parent(InheritanceEdge::new("b")),
    );
    graph.insert(
        group("b")
            .with_node(Node::permission("b.node", true))
            .with_parent(InheritanceEdge::new("a")),
    );
    let resolver = PermissionResolver::default();

    let data = resolver.compute(&graph, &user_id(), &ContextSet::empty());
    assert_eq!(data.permission_value("a.node"), Tristate::True);
    assert_eq!(data.permission_value("b.node"), Tristate::True);
    assert_eq!(data.permissions().len(), 2);
}

#[test]
fn test_self_inheritance_completes() {
    let mut graph = InheritanceGraph::new();
    graph.insert(
        group("loop")
            .with_node(Node::permission("x", true))
            .with_parent(InheritanceEdge::new("loop")),
    );
    let resolver = PermissionResolver::default();

    assert_eq!(
        resolver.resolve_permission(
            &graph,
            &IdentityId::group("loop").unwrap(),
            "x",
            &ContextSet::empty()
        ),
        Tristate::True
    );
}

// ========== Section 4: Tri-state Results ==========

#[test]
fn test_explicit_false_is_distinct_from_undefined() {
    let mut graph = InheritanceGraph::new();
    graph.insert(user().with_node(Node::permission("denied", false)));
    let resolver = PermissionResolver::default();
    let active = ContextSet::empty();

    let denied = resolver.resolve_permission(&graph, &user_id(), "denied", &active);
    let unknown = resolver.resolve_permission(&graph, &user_id(), "unknown", &active);
    assert_eq!(denied, Tristate::False);
    assert_eq!(unknown, Tristate::Undefined);
    assert_ne!(denied, unknown);
    assert!(!denied.as_bool() && !unknown.as_bool());
}

#[test]
fn test_unknown_identity_resolves_to_nothing() {
    let graph = sample_graph();
    let resolver = PermissionResolver::default();
    let stranger = IdentityId::User(Uuid::from_u128(99));

    let data = resolver.compute(&graph, &stranger, &ContextSet::empty());
    assert!(data.permissions().is_empty());
    assert_eq!(data.meta().prefix(), None);
}

// ========== Section 5: Prefix and Suffix ==========

#[test]
fn test_prefix_is_best_found_anywhere() {
    let graph = sample_graph();
    let resolver = PermissionResolver::default();

    assert_eq!(
        resolver
            .resolve_prefix(&graph, &user_id(), &ContextSet::empty())
            .as_deref(),
        Some("[Admin]")
    );
}

#[test]
fn test_deeper_prefix_with_higher_priority_wins() {
    let mut graph = InheritanceGraph::new();
    graph.insert(
        user()
            .with_node(Node::prefix(10, "[Own]"))
            .with_parent(InheritanceEdge::new("staff")),
    );
    graph.insert(group("staff").with_node(Node::prefix(90, "[Staff]")));
    let resolver = PermissionResolver::default();

    assert_eq!(
        resolver
            .resolve_prefix(&graph, &user_id(), &ContextSet::empty())
            .as_deref(),
        Some("[Staff]")
    );
}

#[test]
fn test_prefix_tie_goes_to_first_found() {
    let mut graph = InheritanceGraph::new();
    graph.insert(
        user()
            .with_node(Node::suffix(5, " (me)"))
            .with_parent(InheritanceEdge::new("staff")),
    );
    graph.insert(group("staff").with_node(Node::suffix(5, " (staff)")));
    let resolver = PermissionResolver::default();

    assert_eq!(
        resolver
            .resolve_suffix(&graph, &user_id(), &ContextSet::empty())
            .as_deref(),
        Some(" (me)")
    );
}

#[test]
fn test_no_prefix_is_none() {
    let mut graph = InheritanceGraph::new();
    graph.insert(user());
    let resolver = PermissionResolver::default();
    assert_eq!(resolver.resolve_prefix(&graph, &user_id(), &ContextSet::empty()), None);
    assert_eq!(resolver.resolve_suffix(&graph, &user_id(), &ContextSet::empty()), None);
}

// ========== Section 6: Meta Defaults Layering ==========

fn layered_resolver() -> PermissionResolver {
    let config = ResolverConfig::default()
        .with_collection_defaults(DefaultsLayer::new(vec![Node::meta("home-limit", "3")]))
        .with_service_defaults(DefaultsLayer::new(vec![
            Node::meta("home-limit", "1"),
            Node::meta("chat-color", "gray"),
        ]));
    PermissionResolver::new(config)
}

#[test]
fn test_hierarchy_meta_beats_defaults() {
    let mut graph = InheritanceGraph::new();
    graph.insert(user().with_parent(InheritanceEdge::new("vip")));
    graph.insert(group("vip").with_node(Node::meta("home-limit", "10")));
    let resolver = layered_resolver();

    assert_eq!(
        resolver
            .resolve_meta(&graph, &user_id(), "home-limit", &ContextSet::empty())
            .as_deref(),
        Some("10")
    );
}

#[test]
fn test_collection_defaults_beat_service_defaults() {
    let mut graph = InheritanceGraph::new();
    graph.insert(user());
    let resolver = layered_resolver();
    let active = ContextSet::empty();

    assert_eq!(
        resolver
            .resolve_meta(&graph, &user_id(), "home-limit", &active)
            .as_deref(),
        Some("3")
    );
    assert_eq!(
        resolver
            .resolve_meta(&graph, &user_id(), "chat-color", &active)
            .as_deref(),
        Some("gray")
    );
    assert_eq!(resolver.resolve_meta(&graph, &user_id(), "nope", &active), None);

    let data = resolver.compute(&graph, &user_id(), &active);
    assert_eq!(data.meta().get("home-limit"), Some("3"));
    assert_eq!(data.meta().get("chat-color"), Some("gray"));
}

#[test]
fn test_context_gated_default_is_skipped_when_inactive() {
    let config = ResolverConfig::default().with_service_defaults(DefaultsLayer::new(vec![
        Node::meta("motd", "welcome to creative").with_context(ctx(&[("server", "creative")])),
    ]));
    let resolver = PermissionResolver::new(config);
    let mut graph = InheritanceGraph::new();
    graph.insert(user());

    assert_eq!(
        resolver.resolve_meta(&graph, &user_id(), "motd", &ctx(&[("server", "lobby")])),
        None
    );
    assert_eq!(
        resolver
            .resolve_meta(&graph, &user_id(), "motd", &ctx(&[("server", "creative")]))
            .as_deref(),
        Some("welcome to creative")
    );
}

#[test]
fn test_meta_short_circuits_like_permissions() {
    let mut graph = InheritanceGraph::new();
    graph.insert(
        user()
            .with_node(Node::meta("rank", "own"))
            .with_parent(InheritanceEdge::new("staff")),
    );
    graph.insert(group("staff").with_node(Node::meta("rank", "staff").with_weight(100)));
    let resolver = PermissionResolver::default();

    let data = resolver.compute(&graph, &user_id(), &ContextSet::empty());
    assert_eq!(data.meta().get("rank"), Some("own"));
}

// ========== Section 7: Reached Groups ==========

#[test]
fn test_snapshot_lists_transitively_reached_groups() {
    let graph = sample_graph();
    let resolver = PermissionResolver::default();

    let data = resolver.compute(&graph, &user_id(), &ContextSet::empty());

    assert_eq!(data.groups(), ["admin", "default", "mod"]);
    assert!(data.inherits("MOD"));
    assert!(!data.inherits("owner"));
}

#[test]
fn test_reached_groups_skip_unloaded_and_inactive_edges() {
    let mut graph = InheritanceGraph::new();
    graph.insert(
        user()
            .with_parent(InheritanceEdge::new("ghost"))
            .with_parent(InheritanceEdge::new("builder").with_context(ctx(&[("server", "creative")]))),
    );
    graph.insert(group("builder"));
    let resolver = PermissionResolver::default();

    let lobby = resolver.compute(&graph, &user_id(), &ctx(&[("server", "lobby")]));
    assert!(lobby.groups().is_empty());

    let creative = resolver.compute(&graph, &user_id(), &ctx(&[("server", "creative")]));
    assert_eq!(creative.groups(), ["builder"]);
}

#[test]
fn test_defaults_layer_parents_follow_context() {
    let layer = DefaultsLayer::new(Vec::new()).with_parents(vec![
        InheritanceEdge::new("default"),
        InheritanceEdge::new("builder").with_context(ctx(&[("server", "creative")])),
    ]);
    let now = Utc::now();
    let lobby = ctx(&[("server", "lobby")]);

    assert!(!layer.is_empty());
    assert_eq!(layer.parents(&lobby, now).collect::<Vec<_>>(), vec!["default"]);
    assert_eq!(
        layer
            .parents(&ctx(&[("server", "creative")]), now)
            .collect::<Vec<_>>(),
        vec!["default", "builder"]
    );
}
