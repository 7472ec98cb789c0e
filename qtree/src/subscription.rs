//! Per-node observer registries and the structural events they deliver.
//!
//! Every node of a [`QueryTree`] owns a [`NodeHub`]. Observers subscribe to a
//! single hub and only ever see events local to that node:
//!
//! - [`NodeEvent::ChildAdded`] and [`NodeEvent::ChildRemoved`] are published
//!   on the parent of the affected child.
//! - [`NodeEvent::Deleted`] is published on the node being disposed.
//!
//! Hubs are independently locked and reference counted, so they can be
//! subscribed to from other threads while the tree itself is being mutated.
//!
//! [`QueryTree`]: crate::tree::QueryTree

use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use smol_str::SmolStr;

use crate::core::{NodeId, SubscriptionId};

/// A structural change to a node, delivered to the node's observers.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum NodeEvent {
    /// A child was added to the node.
    ChildAdded(ChildRef),
    /// A child was removed from the node.
    ChildRemoved(ChildRef),
    /// The node itself is being disposed.
    Deleted,
}

impl NodeEvent {
    /// The child the event refers to, if any.
    #[must_use]
    pub fn child(&self) -> Option<&ChildRef> {
        match self {
            NodeEvent::ChildAdded(child) | NodeEvent::ChildRemoved(child) => Some(child),
            NodeEvent::Deleted => None,
        }
    }
}

/// A reference to a child node carried by [`NodeEvent`]s.
///
/// Holds the child's hub, so the child can be subscribed to without access
/// to the tree.
#[derive(Clone)]
pub struct ChildRef {
    id: NodeId,
    field_name: SmolStr,
    hub: Arc<NodeHub>,
}

impl ChildRef {
    pub(crate) fn new(id: NodeId, field_name: SmolStr, hub: Arc<NodeHub>) -> Self {
        Self {
            id,
            field_name,
            hub,
        }
    }

    /// The id of the child node.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The field the child selects.
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// The child's own hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<NodeHub> {
        &self.hub
    }
}

impl fmt::Debug for ChildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildRef")
            .field("id", &self.id)
            .field("field_name", &self.field_name)
            .finish_non_exhaustive()
    }
}

type Observer = Box<dyn Fn(&NodeEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: BTreeMap<SubscriptionId, Observer>,
}

/// The observer registry of a single node.
pub struct NodeHub {
    node: NodeId,
    registry: Mutex<Registry>,
}

impl NodeHub {
    pub(crate) fn new(node: NodeId) -> Arc<Self> {
        Arc::new(Self {
            node,
            registry: Mutex::new(Registry::default()),
        })
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The node this hub belongs to.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Registers an observer, returning the handle that keeps it registered.
    ///
    /// Observers run synchronously, with the registry locked, on the thread
    /// that mutates the tree. They must not subscribe to or unsubscribe from
    /// this same hub (including dropping one of its [`Subscription`]s) while
    /// handling an event.
    pub fn subscribe(
        self: &Arc<Self>,
        observer: impl Fn(&NodeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = self.registry();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.observers.insert(id, Box::new(observer));
        Subscription {
            id,
            node: self.node,
            hub: Arc::downgrade(self),
        }
    }

    /// Registers an observer forwarding every event into a channel.
    pub fn subscribe_channel(self: &Arc<Self>) -> (Subscription, Receiver<NodeEvent>) {
        let (tx, rx) = mpsc::channel();
        let sub = self.subscribe(move |event| {
            // The receiver going away just means nobody is listening anymore.
            let _ = tx.send(event.clone());
        });
        (sub, rx)
    }

    /// The number of registered observers.
    #[must_use]
    pub fn num_subscribers(&self) -> usize {
        self.registry().observers.len()
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.registry().observers.remove(&id);
    }

    /// Delivers an event to every registered observer.
    pub(crate) fn publish(&self, event: &NodeEvent) {
        let registry = self.registry();
        for observer in registry.observers.values() {
            observer(event);
        }
    }
}

impl fmt::Debug for NodeHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHub")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

/// A registered observer. Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    id: SubscriptionId,
    node: NodeId,
    hub: Weak<NodeHub>,
}

impl Subscription {
    /// The id of the subscription, unique within its node.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The node the subscription observes.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Removes the observer from its node.
    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use cool_asserts::assert_matches;

    use super::*;

    #[test]
    fn subscribe_publish_unsubscribe() {
        let hub = NodeHub::new(NodeId::new(1));
        let count = Arc::new(AtomicUsize::new(0));
        let sub = {
            let count = count.clone();
            hub.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let (chan_sub, rx) = hub.subscribe_channel();
        assert_ne!(sub.id(), chan_sub.id());
        assert_eq!(hub.num_subscribers(), 2);

        hub.publish(&NodeEvent::Deleted);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_matches!(rx.try_recv(), Ok(NodeEvent::Deleted));

        sub.unsubscribe();
        hub.publish(&NodeEvent::Deleted);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(hub.num_subscribers(), 1);

        drop(chan_sub);
        assert_eq!(hub.num_subscribers(), 0);
        // The sender was dropped with the observer.
        assert_matches!(rx.try_recv(), Ok(NodeEvent::Deleted));
        assert!(rx.recv().is_err());
    }

    #[test]
    fn subscription_ids_are_monotonic() {
        let hub = NodeHub::new(NodeId::ROOT);
        let ids: Vec<_> = (0..4).map(|_| hub.subscribe(|_| ())).collect();
        assert!(ids.windows(2).all(|w| w[0].id() < w[1].id()));
        drop(ids);
        assert!(hub.subscribe(|_| ()).id() > SubscriptionId(3));
    }

    #[test]
    fn ids_do_not_wrap_at_u32() {
        let hub = NodeHub::new(NodeId::ROOT);
        hub.registry().next_id = u64::from(u32::MAX);
        let first = hub.subscribe(|_| ());
        let second = hub.subscribe(|_| ());
        assert!(first.id() < second.id());
        assert_eq!(second.id(), SubscriptionId(u64::from(u32::MAX) + 1));
        assert_eq!(hub.num_subscribers(), 2);

        drop(first);
        assert_eq!(hub.num_subscribers(), 1);
    }

    #[test]
    fn handle_outlives_hub() {
        let hub = NodeHub::new(NodeId::new(2));
        let sub = hub.subscribe(|_| ());
        drop(hub);
        assert_eq!(sub.node(), NodeId::new(2));
        drop(sub);
    }

    #[test]
    fn concurrent_subscribers() {
        let hub = NodeHub::new(NodeId::new(9));
        let count = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let hub = hub.clone();
                let count = count.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let count = count.clone();
                        let sub = hub.subscribe(move |_| {
                            count.fetch_add(1, Ordering::SeqCst);
                        });
                        drop(sub);
                    }
                })
            })
            .collect();
        for _ in 0..100 {
            hub.publish(&NodeEvent::Deleted);
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(hub.num_subscribers(), 0);
    }
}
