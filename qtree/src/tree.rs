//! The live query tree and its basic component handles.

mod config;
mod render;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use smol_str::SmolStr;
use thiserror::Error;

pub use self::config::{DEFAULT_MAX_DEPTH, TreeConfig};
use crate::core::{NodeId, VariableId};
use crate::mutation::NodeDescriptor;
use crate::schema::{SchemaResolver, TypeDefinition, TypeName, TypeRef};
use crate::subscription::{ChildRef, NodeEvent, NodeHub, Subscription};
use crate::variables::{VariableReference, VariableStore};

/// The type information of a node.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeInfo {
    /// The node's type was resolved through the schema.
    Defined(Arc<TypeDefinition>),
    /// The node is a primitive leaf of the named type.
    Primitive(TypeName),
}

impl TypeInfo {
    /// Returns `true` if children may be selected on the node.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        matches!(self, TypeInfo::Defined(def) if def.as_object().is_some())
    }

    /// Returns `true` for primitive leaves.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeInfo::Primitive(_))
    }

    /// The name of the node's type.
    #[must_use]
    pub fn type_name(&self) -> &TypeName {
        match self {
            TypeInfo::Defined(def) => def.name(),
            TypeInfo::Primitive(name) => name,
        }
    }
}

/// A field selection in a [`QueryTree`].
#[derive(Debug)]
pub struct QueryNode {
    id: NodeId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
    /// Empty for the root.
    field_name: SmolStr,
    type_info: TypeInfo,
    arguments: BTreeMap<SmolStr, VariableReference>,
    hub: Arc<NodeHub>,
}

impl QueryNode {
    fn new(
        id: NodeId,
        parent: Option<NodeId>,
        depth: usize,
        field_name: SmolStr,
        type_info: TypeInfo,
        arguments: BTreeMap<SmolStr, VariableReference>,
    ) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            depth,
            field_name,
            type_info,
            arguments,
            hub: NodeHub::new(id),
        }
    }

    /// The node id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The parent of the node, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The children of the node, in insertion order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The distance from the root, which has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The schema field the node selects. Empty for the root.
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// The resolved type information of the node.
    #[must_use]
    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    /// Returns `true` if the node is a primitive leaf.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        self.type_info.is_primitive()
    }

    /// The name of the primitive type, for primitive leaves.
    #[must_use]
    pub fn primitive_name(&self) -> Option<&TypeName> {
        match &self.type_info {
            TypeInfo::Primitive(name) => Some(name),
            TypeInfo::Defined(_) => None,
        }
    }

    /// The argument bindings of the node.
    #[must_use]
    pub fn arguments(&self) -> &BTreeMap<SmolStr, VariableReference> {
        &self.arguments
    }

    /// The node's observer registry.
    #[must_use]
    pub fn hub(&self) -> &Arc<NodeHub> {
        &self.hub
    }

    fn child_ref(&self) -> ChildRef {
        ChildRef::new(self.id, self.field_name.clone(), self.hub.clone())
    }
}

/// The live mirror of a client's query selection tree.
///
/// The tree owns every node through its index, keyed by the client-chosen
/// [`NodeId`]s. Parent and child links are ids into that index. Structural
/// mutation requires `&mut self`, so there is a single writer per tree;
/// observers attach to the per-node [`NodeHub`]s, which can be shared with
/// other threads.
#[derive(Debug)]
pub struct QueryTree {
    nodes: HashMap<NodeId, QueryNode>,
    schema: Arc<dyn SchemaResolver>,
    variables: Arc<VariableStore>,
    config: TreeConfig,
}

impl QueryTree {
    /// Creates a tree with a root node of the given type, a fresh variable
    /// store and the default configuration.
    pub fn new(
        root_type: impl Into<Arc<TypeDefinition>>,
        schema: Arc<dyn SchemaResolver>,
    ) -> Self {
        Self::with_config(root_type, schema, TreeConfig::default())
    }

    /// Creates a tree with the given configuration.
    ///
    /// Every tree owns its variable store: variable ids are chosen by the
    /// client, so bindings are never shared between sessions.
    pub fn with_config(
        root_type: impl Into<Arc<TypeDefinition>>,
        schema: Arc<dyn SchemaResolver>,
        config: TreeConfig,
    ) -> Self {
        let root = QueryNode::new(
            NodeId::ROOT,
            None,
            0,
            SmolStr::default(),
            TypeInfo::Defined(root_type.into()),
            BTreeMap::new(),
        );
        Self {
            nodes: HashMap::from([(NodeId::ROOT, root)]),
            schema,
            variables: VariableStore::new(),
            config,
        }
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> &QueryNode {
        &self.nodes[&NodeId::ROOT]
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&QueryNode> {
        self.nodes.get(&id)
    }

    /// Returns `true` if the tree contains a node with the given id.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// The number of live nodes, including the root.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Iterates over every live node, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &QueryNode> {
        self.nodes.values()
    }

    /// The children of a node. Empty if the node does not exist.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(QueryNode::children).unwrap_or_default()
    }

    /// The parent of a node, if the node exists and is not the root.
    #[must_use]
    pub fn get_parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(QueryNode::parent)
    }

    /// The hub of a node, for subscribing to its events.
    #[must_use]
    pub fn hub(&self, id: NodeId) -> Option<&Arc<NodeHub>> {
        self.nodes.get(&id).map(QueryNode::hub)
    }

    /// Subscribes an observer to a node's events.
    ///
    /// Returns `None` if the node does not exist.
    pub fn subscribe(
        &self,
        id: NodeId,
        observer: impl Fn(&NodeEvent) + Send + Sync + 'static,
    ) -> Option<Subscription> {
        self.hub(id).map(|hub| hub.subscribe(observer))
    }

    /// The variable store shared by the tree's nodes.
    #[must_use]
    pub fn variables(&self) -> &Arc<VariableStore> {
        &self.variables
    }

    /// The schema the tree is validated against.
    #[must_use]
    pub fn schema(&self) -> &Arc<dyn SchemaResolver> {
        &self.schema
    }

    /// The tree configuration.
    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Validates and adds a subtree below `parent`.
    ///
    /// The descriptor's nested children are added recursively. If any of them
    /// fails, the whole subtree is removed again before the error is returned,
    /// leaving the tree as it was. On success the parent publishes
    /// [`NodeEvent::ChildAdded`].
    ///
    /// # Errors
    ///
    /// Returns [`QueryTreeError::UnknownNode`] if `parent` does not exist, and
    /// the first validation error of the subtree otherwise.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        desc: &NodeDescriptor,
    ) -> Result<NodeId, QueryTreeError> {
        if !self.contains(parent) {
            return Err(QueryTreeError::UnknownNode { node: parent });
        }
        self.insert_subtree(parent, desc)?;
        Ok(desc.id)
    }

    fn insert_subtree(
        &mut self,
        parent: NodeId,
        desc: &NodeDescriptor,
    ) -> Result<(), QueryTreeError> {
        let node = self.resolve_child(parent, desc)?;
        let id = node.id;
        self.nodes.insert(id, node);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        }

        for child in &desc.children {
            if let Err(err) = self.insert_subtree(id, child) {
                self.purge_subtree(id);
                return Err(err);
            }
        }

        let event = NodeEvent::ChildAdded(self.nodes[&id].child_ref());
        self.nodes[&parent].hub.publish(&event);
        Ok(())
    }

    /// Checks a proposed child against the tree and the schema, building the
    /// node to insert.
    fn resolve_child(
        &self,
        parent: NodeId,
        desc: &NodeDescriptor,
    ) -> Result<QueryNode, QueryTreeError> {
        let node = desc.id;
        if self.contains(node) {
            return Err(QueryTreeError::DuplicateNodeId { node });
        }
        let parent_node = &self.nodes[&parent];
        let TypeInfo::Defined(parent_def) = &parent_node.type_info else {
            return Err(QueryTreeError::NotSelectable { node, parent });
        };
        let Some(object) = parent_def.as_object() else {
            return Err(QueryTreeError::NotSelectable { node, parent });
        };
        let field = object
            .field(&desc.field_name)
            .ok_or_else(|| QueryTreeError::UnknownField {
                node,
                field: desc.field_name.clone(),
                parent_type: object.name().clone(),
            })?;

        let selected = field.ty.unwrap_selection();
        let type_info = match selected.as_named() {
            Some(name) if self.schema.is_primitive(name) => TypeInfo::Primitive(name.clone()),
            _ => TypeInfo::Defined(self.schema.lookup_type(selected).ok_or_else(|| {
                QueryTreeError::UnresolvedType {
                    node,
                    ty: selected.clone(),
                }
            })?),
        };

        // References taken so far are released when `arguments` is dropped
        // on the error path.
        let mut arguments = BTreeMap::new();
        for arg in &desc.args {
            let vref = self.variables.get(arg.variable_id).ok_or_else(|| {
                QueryTreeError::UnknownVariable {
                    node,
                    argument: arg.name.clone(),
                    variable: arg.variable_id,
                }
            })?;
            arguments.insert(arg.name.clone(), vref);
        }

        let depth = parent_node.depth + 1;
        if let Some(limit) = self.config.max_depth {
            if depth > limit {
                return Err(QueryTreeError::DepthLimitExceeded { node, limit });
            }
        }
        if let Some(limit) = self.config.max_nodes {
            if self.nodes.len() >= limit {
                return Err(QueryTreeError::NodeLimitExceeded { node, limit });
            }
        }

        Ok(QueryNode::new(
            node,
            Some(parent),
            depth,
            desc.field_name.clone(),
            type_info,
            arguments,
        ))
    }

    /// Removes a subtree that was never announced, without notifying anyone.
    fn purge_subtree(&mut self, id: NodeId) {
        if let Some(parent) = self.get_parent(id) {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|&c| c != id);
            }
        }
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.children);
            }
        }
    }

    /// Disposes a node and its whole subtree.
    ///
    /// The node publishes [`NodeEvent::Deleted`], its children are disposed
    /// depth-first, and finally its parent publishes
    /// [`NodeEvent::ChildRemoved`]. Argument references are released.
    ///
    /// # Errors
    ///
    /// Returns [`QueryTreeError::RootRemoval`] for the root, which can only be
    /// removed by [`QueryTree::teardown`], and [`QueryTreeError::UnknownNode`]
    /// if the node does not exist.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<(), QueryTreeError> {
        if id.is_root() {
            return Err(QueryTreeError::RootRemoval);
        }
        if !self.contains(id) {
            return Err(QueryTreeError::UnknownNode { node: id });
        }
        self.dispose(id);
        Ok(())
    }

    /// Disposes the whole tree, root included, notifying every node's
    /// observers.
    pub fn teardown(mut self) {
        self.dispose(NodeId::ROOT);
    }

    /// Disposing a node that is no longer in the tree is a no-op.
    ///
    /// Walks the subtree with an explicit stack: a node publishes `Deleted`
    /// when first visited and is detached once all of its children are gone.
    pub(crate) fn dispose(&mut self, id: NodeId) {
        let mut stack = vec![(id, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                self.detach(id);
                continue;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            node.hub.publish(&NodeEvent::Deleted);
            stack.push((id, true));
            stack.extend(node.children.iter().rev().map(|&child| (child, false)));
        }
    }

    /// Removes a single node from the index, notifying its parent and
    /// releasing its argument references.
    fn detach(&mut self, id: NodeId) {
        let Some(mut node) = self.nodes.remove(&id) else {
            return;
        };
        node.children.clear();
        if let Some(parent) = node.parent {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|&c| c != id);
                p.hub.publish(&NodeEvent::ChildRemoved(node.child_ref()));
            }
        }
        node.arguments.clear();
    }
}

/// Errors that can occur while mutating a [`QueryTree`].
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum QueryTreeError {
    /// The proposed node id is already in use.
    #[error("Invalid node id {node}: already exists.")]
    DuplicateNodeId {
        /// The proposed id.
        node: NodeId,
    },
    /// The parent's type does not allow selecting children.
    #[error("Invalid node {node}: parent {parent} is not selectable.")]
    NotSelectable {
        /// The proposed id.
        node: NodeId,
        /// The parent the node was to be added to.
        parent: NodeId,
    },
    /// The field is not declared on the parent's type.
    #[error("Invalid node {node}: no field {field} on {parent_type}.")]
    UnknownField {
        /// The proposed id.
        node: NodeId,
        /// The requested field.
        field: SmolStr,
        /// The name of the parent's type.
        parent_type: TypeName,
    },
    /// The field's type could not be resolved by the schema.
    #[error("Invalid node {node}: unable to resolve type {ty}.")]
    UnresolvedType {
        /// The proposed id.
        node: NodeId,
        /// The unresolved type, after unwrapping.
        ty: TypeRef,
    },
    /// An argument refers to a variable that is not in the store.
    #[error("Invalid node {node}: variable {variable} not found for argument {argument}.")]
    UnknownVariable {
        /// The proposed id.
        node: NodeId,
        /// The argument name.
        argument: SmolStr,
        /// The missing variable.
        variable: VariableId,
    },
    /// The node would be deeper than [`TreeConfig::max_depth`].
    #[error("Invalid node {node}: exceeds the maximum depth of {limit}.")]
    DepthLimitExceeded {
        /// The proposed id.
        node: NodeId,
        /// The configured limit.
        limit: usize,
    },
    /// The tree already holds [`TreeConfig::max_nodes`] nodes.
    #[error("Invalid node {node}: the tree is limited to {limit} nodes.")]
    NodeLimitExceeded {
        /// The proposed id.
        node: NodeId,
        /// The configured limit.
        limit: usize,
    },
    /// The targeted node does not exist.
    #[error("Unknown node {node}.")]
    UnknownNode {
        /// The targeted id.
        node: NodeId,
    },
    /// The root can only be removed by tearing down the tree.
    #[error("The root node cannot be removed.")]
    RootRemoval,
}
