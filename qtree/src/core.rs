//! Definitions for the identifier types used across the query tree.
//!
//! These types are re-exported in the root of the crate.

use derive_more::{Display, From};

/// The identifier of a node in a query tree.
///
/// Ids are chosen by the remote client and must be unique within a tree.
/// The root of every tree is [`NodeId::ROOT`].
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    From,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
#[display("#{_0}")]
pub struct NodeId(u32);

impl NodeId {
    /// The id of the root node of every tree.
    pub const ROOT: NodeId = NodeId(0);

    /// Creates a new node id.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Returns `true` if this is the id of the root node.
    #[inline]
    #[must_use]
    pub const fn is_root(self) -> bool {
        self.0 == Self::ROOT.0
    }
}

/// The identifier of a variable binding in a [`VariableStore`].
///
/// [`VariableStore`]: crate::variables::VariableStore
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
#[display("${_0}")]
pub struct VariableId(u32);

impl VariableId {
    /// Creates a new variable id.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// The identifier of a subscription, local to the node it was made on.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub(crate) u64);
