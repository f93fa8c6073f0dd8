//! Default-assignment rules applied when a user logs in.
//!
//! ```yaml
//! login:
//!   default_assignments:
//!     - has_true: ["group.vip"]
//!       lacks: ["kit.vip.claimed"]
//!       give: ["kit.vip", "group.donor"]
//!       take: ["group.guest"]
//! ```
//!
//! Entries of the form `group.<name>` refer to inheritance of `<name>`;
//! anything else is a global permission node.

use rsperms_domain::model::{ContextFilter, Identity, InheritanceEdge, Node};
use serde::{Deserialize, Serialize};

const GROUP_PREFIX: &str = "group.";

/// Something a rule checks for, gives or takes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry<'a> {
    Group(&'a str),
    Permission(&'a str),
}

impl<'a> Entry<'a> {
    fn parse(raw: &'a str) -> Self {
        let raw = raw.trim();
        match raw.get(..GROUP_PREFIX.len()) {
            Some(head) if head.eq_ignore_ascii_case(GROUP_PREFIX) && raw.len() > head.len() => {
                Entry::Group(&raw[GROUP_PREFIX.len()..])
            }
            _ => Entry::Permission(raw),
        }
    }

    /// Present globally with value true.
    fn held_by(&self, identity: &Identity) -> bool {
        match self {
            Entry::Group(group) => identity.inherits_globally(group),
            Entry::Permission(key) => identity.global_permission(key) == Some(true),
        }
    }

    /// Present globally with any value.
    fn set_on(&self, identity: &Identity) -> bool {
        match self {
            Entry::Group(group) => identity.inherits_globally(group),
            Entry::Permission(key) => identity.global_permission(key).is_some(),
        }
    }

    fn give(&self, identity: &mut Identity) -> bool {
        match self {
            Entry::Group(group) => identity.add_parent(InheritanceEdge::new(group)),
            Entry::Permission(key) => identity.set_node(Node::permission(key, true)),
        }
    }

    fn take(&self, identity: &mut Identity) -> bool {
        match self {
            Entry::Group(group) => identity.remove_parent_in(group, &ContextFilter::default()),
            Entry::Permission(key) => identity.unset_node(&Node::permission(key, true)),
        }
    }
}

/// A conditional set of grants and removals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DefaultAssignmentRule {
    /// Entries that must be present with value true.
    #[serde(default)]
    pub has_true: Vec<String>,
    /// Entries that must not be set at all.
    #[serde(default)]
    pub lacks: Vec<String>,
    #[serde(default)]
    pub give: Vec<String>,
    #[serde(default)]
    pub take: Vec<String>,
}

impl DefaultAssignmentRule {
    /// True if the identity satisfies every condition of the rule.
    pub fn matches(&self, identity: &Identity) -> bool {
        self.has_true
            .iter()
            .all(|raw| Entry::parse(raw).held_by(identity))
            && self
                .lacks
                .iter()
                .all(|raw| !Entry::parse(raw).set_on(identity))
    }

    /// Applies the rule if it matches. Returns true if the identity changed.
    pub fn apply(&self, identity: &mut Identity) -> bool {
        if !self.matches(identity) {
            return false;
        }
        let mut changed = false;
        for raw in &self.take {
            changed |= Entry::parse(raw).take(identity);
        }
        for raw in &self.give {
            changed |= Entry::parse(raw).give(identity);
        }
        changed
    }
}

/// Applies each rule once, in order. Returns true if any rule changed the
/// identity.
pub fn apply_all(rules: &[DefaultAssignmentRule], identity: &mut Identity) -> bool {
    rules
        .iter()
        .fold(false, |changed, rule| rule.apply(identity) | changed)
}

/// Gives `group` to an identity that inherits nothing. Returns true if the
/// identity changed.
pub fn give_default_if_needed(identity: &mut Identity, group: &str) -> bool {
    if !identity.parents().is_empty() {
        return false;
    }
    identity.add_parent(InheritanceEdge::new(group))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsperms_domain::ContextSet;
    use uuid::Uuid;

    fn user() -> Identity {
        Identity::user(Uuid::from_u128(7), Some("steve".to_string()))
    }

    fn owned(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn rule(has_true: &[&str], lacks: &[&str], give: &[&str], take: &[&str]) -> DefaultAssignmentRule {
        DefaultAssignmentRule {
            has_true: owned(has_true),
            lacks: owned(lacks),
            give: owned(give),
            take: owned(take),
        }
    }

    #[test]
    fn test_entry_parsing() {
        assert_eq!(Entry::parse("group.VIP"), Entry::Group("VIP"));
        assert_eq!(Entry::parse("Group.vip"), Entry::Group("vip"));
        assert_eq!(Entry::parse("group."), Entry::Permission("group."));
        assert_eq!(Entry::parse(" kit.vip "), Entry::Permission("kit.vip"));
    }

    #[test]
    fn test_unconditional_rule_gives_entries() {
        let mut identity = user();
        let changed = rule(&[], &[], &["group.member", "chat.use"], &[]).apply(&mut identity);

        assert!(changed);
        assert!(identity.inherits_globally("member"));
        assert_eq!(identity.global_permission("chat.use"), Some(true));
    }

    #[test]
    fn test_rule_requires_true_value() {
        let mut identity = user().with_node(Node::permission("vip", false));
        let vip = rule(&["vip"], &[], &["kit.vip"], &[]);
        assert!(!vip.apply(&mut identity));

        identity.set_node(Node::permission("vip", true));
        assert!(vip.apply(&mut identity));
        assert_eq!(identity.global_permission("kit.vip"), Some(true));
    }

    #[test]
    fn test_lacks_rejects_entries_set_to_any_value() {
        let mut identity = user().with_node(Node::permission("kit.claimed", false));
        assert!(!rule(&[], &["kit.claimed"], &["kit"], &[]).apply(&mut identity));
    }

    #[test]
    fn test_contextual_nodes_do_not_satisfy_conditions() {
        let nether = ContextSet::from_pairs([("world", "nether")]).unwrap();
        let mut identity = user().with_node(Node::permission("vip", true).with_context(nether));
        assert!(!rule(&["vip"], &[], &["kit.vip"], &[]).apply(&mut identity));
    }

    #[test]
    fn test_take_removes_global_group_and_keeps_contextual_edge() {
        let creative = ContextSet::from_pairs([("server", "creative")]).unwrap();
        let mut identity = user()
            .with_parent(InheritanceEdge::new("guest"))
            .with_parent(InheritanceEdge::new("guest").with_context(creative.clone()));

        assert!(rule(&[], &[], &[], &["group.guest"]).apply(&mut identity));
        assert!(!identity.inherits_globally("guest"));
        assert_eq!(identity.parents().len(), 1);
        assert_eq!(identity.parents()[0].context, ContextFilter::Valid(creative));
    }

    #[test]
    fn test_rule_that_changes_nothing_reports_false() {
        let mut identity = user().with_parent(InheritanceEdge::new("member"));
        assert!(!rule(&[], &[], &["group.member"], &["missing.node"]).apply(&mut identity));
    }

    #[test]
    fn test_apply_all_evaluates_each_rule_once_in_order() {
        let mut identity = user();
        let rules = vec![
            rule(&[], &["group.member"], &["group.member"], &[]),
            rule(&["group.member"], &[], &["chat.use"], &[]),
            // would flip back if rules were re-evaluated
            rule(&[], &["group.member"], &["group.guest"], &[]),
        ];

        assert!(apply_all(&rules, &mut identity));
        assert!(identity.inherits_globally("member"));
        assert_eq!(identity.global_permission("chat.use"), Some(true));
        assert!(!identity.inherits_globally("guest"));
    }

    #[test]
    fn test_give_default_if_needed() {
        let mut identity = user();
        assert!(give_default_if_needed(&mut identity, "default"));
        assert!(!give_default_if_needed(&mut identity, "default"));
        assert!(identity.inherits_globally("default"));
    }
}
