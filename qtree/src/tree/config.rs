//! Limits applied while growing a [`QueryTree`].
//!
//! [`QueryTree`]: super::QueryTree

/// The default value of [`TreeConfig::max_depth`].
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Configuration for a query tree.
///
/// Node descriptors come from the remote client, so the tree bounds how far
/// they can make it grow.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub struct TreeConfig {
    /// Maximum depth of any node. The root has depth 0.
    pub max_depth: Option<usize>,
    /// Maximum number of live nodes, root included.
    pub max_nodes: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: Some(DEFAULT_MAX_DEPTH),
            max_nodes: None,
        }
    }
}

impl TreeConfig {
    /// A configuration with no limits at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_depth: None,
            max_nodes: None,
        }
    }

    /// Sets the maximum node depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: impl Into<Option<usize>>) -> Self {
        self.max_depth = max_depth.into();
        self
    }

    /// Sets the maximum number of live nodes.
    #[must_use]
    pub fn with_max_nodes(mut self, max_nodes: impl Into<Option<usize>>) -> Self {
        self.max_nodes = max_nodes.into();
        self
    }
}
