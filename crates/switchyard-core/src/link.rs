// ── Pending links ──
//
// Devices reference each other by key, and configuration declares them in
// no particular order. Anything a device needs from a peer is queued here
// as data while the load constructs devices; the orchestrator works the
// queue off once every device exists.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BridgeDeviceEntry;
use crate::error::CoreError;
use crate::join_map::JoinMapCatalog;
use crate::registry::DeviceRegistry;

/// What a pending link asks its owner to attach to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Bind these devices onto the owning bridge.
    BridgeMembers(Vec<BridgeDeviceEntry>),
    /// Attach a single peer device in the given role.
    Peer { role: String, key: String },
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BridgeMembers(entries) => write!(f, "bridge members ({})", entries.len()),
            Self::Peer { role, key } => write!(f, "{role} '{key}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLink {
    pub owner: String,
    pub target: LinkTarget,
}

/// Ordered queue of link requests for one load.
#[derive(Debug, Default)]
pub struct LinkQueue {
    pending: Vec<PendingLink>,
}

impl LinkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, owner: &str, target: LinkTarget) {
        self.pending.push(PendingLink {
            owner: owner.to_owned(),
            target,
        });
    }

    pub fn bridge_members(&mut self, owner: &str, entries: Vec<BridgeDeviceEntry>) {
        if !entries.is_empty() {
            self.push(owner, LinkTarget::BridgeMembers(entries));
        }
    }

    pub fn peer(&mut self, owner: &str, role: &str, key: &str) {
        self.push(
            owner,
            LinkTarget::Peer {
                role: role.to_owned(),
                key: key.to_owned(),
            },
        );
    }

    /// Move every request from `other` onto the end of this queue.
    pub fn append(&mut self, other: &mut Self) {
        self.pending.append(&mut other.pending);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingLink> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl IntoIterator for LinkQueue {
    type Item = PendingLink;
    type IntoIter = std::vec::IntoIter<PendingLink>;

    fn into_iter(self) -> Self::IntoIter {
        self.pending.into_iter()
    }
}

/// Everything a device may consult while resolving a link.
pub struct LinkContext<'a> {
    pub registry: &'a DeviceRegistry,
    pub join_maps: &'a JoinMapCatalog,
    /// Join map overrides from the snapshot, keyed by `joinMapKey`.
    pub overrides: &'a IndexMap<String, Value>,
}

/// Resolve every queued request in order. Failures are logged and
/// returned; the remaining requests still run.
pub fn resolve_all(queue: LinkQueue, ctx: &LinkContext<'_>) -> Vec<(String, CoreError)> {
    let mut failures = Vec::new();
    for link in queue {
        let Some(owner) = ctx.registry.get(&link.owner) else {
            let e = CoreError::UnresolvedReference {
                owner: link.owner.clone(),
                target: link.target.to_string(),
            };
            warn!(owner = %link.owner, error = %e, "link owner is not registered");
            failures.push((link.owner, e));
            continue;
        };
        match owner.resolve_link(&link.target, ctx) {
            Ok(()) => debug!(owner = %link.owner, target = %link.target, "link resolved"),
            Err(e) => {
                warn!(owner = %link.owner, error = %e, "link left unresolved");
                failures.push((link.owner, e));
            }
        }
    }
    failures
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_member_lists_are_not_queued() {
        let mut queue = LinkQueue::new();
        queue.bridge_members("eisc1", Vec::new());
        assert!(queue.is_empty());
    }

    #[test]
    fn targets_render_for_logs() {
        let peer = LinkTarget::Peer {
            role: "display".into(),
            key: "display1".into(),
        };
        assert_eq!(peer.to_string(), "display 'display1'");
    }

    #[test]
    fn missing_owner_is_reported_not_fatal() {
        let registry = DeviceRegistry::new();
        let catalog = JoinMapCatalog::new();
        let overrides = IndexMap::new();
        let ctx = LinkContext {
            registry: &registry,
            join_maps: &catalog,
            overrides: &overrides,
        };

        let mut queue = LinkQueue::new();
        queue.peer("room1", "display", "display1");
        queue.peer("room2", "display", "display2");

        let failures = resolve_all(queue, &ctx);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0, "room1");
        assert!(matches!(failures[1].1, CoreError::UnresolvedReference { .. }));
    }

    #[test]
    fn append_preserves_order() {
        let mut first = LinkQueue::new();
        first.peer("a", "display", "d1");
        let mut second = LinkQueue::new();
        second.peer("b", "display", "d2");

        first.append(&mut second);
        let owners: Vec<_> = first.iter().map(|l| l.owner.as_str()).collect();
        assert_eq!(owners, vec!["a", "b"]);
        assert!(second.is_empty());
    }
}
