//! Mutation batches and their application to a [`QueryTree`].
//!
//! A [`TreeMutation`] carries new variable bindings and an ordered list of
//! [`NodeOperation`]s. [`QueryTree::apply_mutation`] installs the variables,
//! applies each operation independently, and finally garbage-collects the
//! variables no node refers to. A failing operation never stops the batch;
//! what happened to each operation is reported in the [`MutationOutcome`].

use smol_str::SmolStr;

use crate::core::{NodeId, VariableId};
use crate::tree::{QueryTree, QueryTreeError};
use crate::variables::VariableValue;

/// A batch of structural changes sent by the client.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeMutation {
    /// Variable bindings installed before any operation runs.
    #[serde(default)]
    pub variables: Vec<VariableBinding>,
    /// Operations applied in order.
    #[serde(default)]
    pub node_operations: Vec<NodeOperation>,
}

impl TreeMutation {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable binding.
    #[must_use]
    pub fn with_variable(mut self, id: u32, value: VariableValue) -> Self {
        self.variables.push(VariableBinding {
            id: VariableId::new(id),
            value,
        });
        self
    }

    /// Appends an operation.
    #[must_use]
    pub fn with_operation(mut self, op: NodeOperation) -> Self {
        self.node_operations.push(op);
        self
    }
}

/// A variable value sent along with a batch.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariableBinding {
    /// The variable id.
    pub id: VariableId,
    /// The bound value.
    pub value: VariableValue,
}

/// A single structural operation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(
    tag = "operation",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
#[non_exhaustive]
pub enum NodeOperation {
    /// Adds a subtree below the target node.
    AddChild {
        /// The parent of the new subtree.
        node_id: NodeId,
        /// The subtree to add.
        node: NodeDescriptor,
    },
    /// Removes the target node and its subtree.
    Delete {
        /// The node to remove.
        node_id: NodeId,
    },
}

impl NodeOperation {
    /// An operation adding `node` below `parent`.
    pub fn add_child(parent: u32, node: NodeDescriptor) -> Self {
        Self::AddChild {
            node_id: NodeId::new(parent),
            node,
        }
    }

    /// An operation deleting `node` and its subtree.
    pub fn delete(node: u32) -> Self {
        Self::Delete {
            node_id: NodeId::new(node),
        }
    }

    /// The node the operation targets.
    #[must_use]
    pub fn target(&self) -> NodeId {
        match self {
            NodeOperation::AddChild { node_id, .. } | NodeOperation::Delete { node_id } => *node_id,
        }
    }
}

/// The description of a node to add, with its eagerly declared subtree.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    /// The id of the new node.
    pub id: NodeId,
    /// The field the node selects on its parent's type.
    pub field_name: SmolStr,
    /// Argument bindings.
    #[serde(default)]
    pub args: Vec<ArgumentBinding>,
    /// Nested nodes, added below this one.
    #[serde(default)]
    pub children: Vec<NodeDescriptor>,
}

impl NodeDescriptor {
    /// A descriptor with no arguments and no children.
    pub fn new(id: u32, field_name: impl Into<SmolStr>) -> Self {
        Self {
            id: NodeId::new(id),
            field_name: field_name.into(),
            args: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Binds an argument to a variable.
    #[must_use]
    pub fn with_arg(mut self, name: impl Into<SmolStr>, variable: u32) -> Self {
        self.args.push(ArgumentBinding {
            name: name.into(),
            variable_id: VariableId::new(variable),
        });
        self
    }

    /// Adds a nested child.
    #[must_use]
    pub fn with_child(mut self, child: NodeDescriptor) -> Self {
        self.children.push(child);
        self
    }
}

/// Binds a field argument to a variable.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentBinding {
    /// The argument name.
    pub name: SmolStr,
    /// The bound variable.
    pub variable_id: VariableId,
}

/// Why an operation of a batch was not applied, without it being an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[non_exhaustive]
pub enum SkipReason {
    /// The target node is not in the tree.
    #[display("unknown target node")]
    UnknownTarget,
    /// The operation asked to delete the root.
    #[display("the root cannot be deleted")]
    RootDelete,
}

/// An operation that was ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedOperation {
    /// The position of the operation in the batch.
    pub index: usize,
    /// The node the operation targeted.
    pub target: NodeId,
    /// Why it was ignored.
    pub reason: SkipReason,
}

/// An operation that failed validation and was rolled back.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationFailure {
    /// The position of the operation in the batch.
    pub index: usize,
    /// The node the operation targeted.
    pub target: NodeId,
    /// The validation error.
    pub error: QueryTreeError,
}

/// What happened while applying a [`TreeMutation`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MutationOutcome {
    /// The number of variable bindings installed.
    pub variables_installed: usize,
    /// The number of operations applied.
    pub applied: usize,
    /// The operations that failed.
    pub failures: Vec<OperationFailure>,
    /// The operations that were ignored.
    pub skipped: Vec<SkippedOperation>,
    /// The variables garbage-collected at the end of the batch.
    pub variables_collected: Vec<VariableId>,
}

impl MutationOutcome {
    /// Returns `true` if every operation was applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

impl QueryTree {
    /// Applies a batch of mutations.
    ///
    /// Variables are installed first, so operations can refer to variables
    /// introduced by the same batch. Operations are then applied in order:
    ///
    /// - An operation targeting a node that is not in the tree is skipped.
    /// - A failed add is rolled back and reported; the batch continues.
    /// - A delete of the root is skipped.
    ///
    /// Finally the variable store is garbage-collected.
    pub fn apply_mutation(&mut self, mutation: &TreeMutation) -> MutationOutcome {
        let span = tracing::debug_span!(
            "apply_mutation",
            variables = mutation.variables.len(),
            operations = mutation.node_operations.len(),
        );
        let _entered = span.enter();

        let mut outcome = MutationOutcome::default();
        for binding in &mutation.variables {
            self.variables().put(binding.id, binding.value.clone());
        }
        outcome.variables_installed = mutation.variables.len();

        for (index, op) in mutation.node_operations.iter().enumerate() {
            let target = op.target();
            if !self.contains(target) {
                tracing::debug!(index, %target, "skipping operation on unknown node");
                outcome.skipped.push(SkippedOperation {
                    index,
                    target,
                    reason: SkipReason::UnknownTarget,
                });
                continue;
            }

            match op {
                NodeOperation::AddChild { node, .. } => match self.add_child(target, node) {
                    Ok(_) => outcome.applied += 1,
                    Err(error) => {
                        tracing::warn!(
                            index,
                            %target,
                            child = %node.id,
                            %error,
                            "failed to add child"
                        );
                        outcome.failures.push(OperationFailure {
                            index,
                            target,
                            error,
                        });
                    }
                },
                NodeOperation::Delete { .. } if target.is_root() => {
                    tracing::debug!(index, "ignoring delete of the root node");
                    outcome.skipped.push(SkippedOperation {
                        index,
                        target,
                        reason: SkipReason::RootDelete,
                    });
                }
                NodeOperation::Delete { .. } => {
                    self.dispose(target);
                    outcome.applied += 1;
                }
            }
        }

        outcome.variables_collected = self.variables().garbage_collect();
        outcome
    }
}
