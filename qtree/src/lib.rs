//! Server-side live mirror of a client-driven query selection tree.
//!
//! A client declares which fields of a typed graph it wants resolved as a
//! tree of field selections, and then keeps that tree up to date by sending
//! [`TreeMutation`] batches: new variable bindings plus "add subtree" and
//! "delete subtree" operations. A [`QueryTree`] applies those batches,
//! validating every proposed node against the schema, rolling back subtrees
//! that fail validation, and releasing the shared variable bindings held by
//! nodes that go away.
//!
//! Resolution logic observes the tree through per-node
//! [`subscription::NodeHub`]s, which publish [`NodeEvent`]s when a child is
//! added or removed, or when the node itself is deleted.
//!
//! ```
//! use std::sync::Arc;
//! use qtree::schema::{ObjectType, Schema, TypeRef};
//! use qtree::{NodeDescriptor, NodeEvent, NodeOperation, QueryTree, TreeMutation};
//!
//! let mut schema = Schema::new();
//! let query = schema
//!     .register(ObjectType::new("Query").with_field("count", TypeRef::named("Int")))
//!     .unwrap()
//!     .clone();
//! let mut tree = QueryTree::new(query, Arc::new(schema));
//!
//! let (_sub, events) = tree.root().hub().subscribe_channel();
//! let outcome = tree.apply_mutation(
//!     &TreeMutation::new()
//!         .with_operation(NodeOperation::add_child(0, NodeDescriptor::new(1, "count"))),
//! );
//! assert!(outcome.is_clean());
//! assert!(matches!(events.try_recv(), Ok(NodeEvent::ChildAdded(_))));
//! ```

pub mod core;
pub mod mutation;
pub mod schema;
pub mod subscription;
pub mod tree;
pub mod variables;

pub use crate::core::{NodeId, SubscriptionId, VariableId};
pub use crate::mutation::{MutationOutcome, NodeDescriptor, NodeOperation, TreeMutation};
pub use crate::subscription::{NodeEvent, Subscription};
pub use crate::tree::{QueryNode, QueryTree, QueryTreeError, TreeConfig};
