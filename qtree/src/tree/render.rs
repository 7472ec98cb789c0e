//! Text outline of a query tree, for debugging.

use std::fmt::Write;

use itertools::Itertools;

use super::{QueryNode, QueryTree};
use crate::core::NodeId;

impl QueryTree {
    /// Renders the live tree as an indented outline.
    ///
    /// Each line shows the node id, the selected field, its type and the
    /// bound arguments. Children appear in insertion order, two spaces deeper
    /// than their parent.
    ///
    /// ```text
    /// #0 Query
    ///   #5 user: User (id=$1)
    ///     #6 name: String
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            render_node(&mut out, node);
            stack.extend(node.children().iter().rev());
        }
        out
    }
}

fn render_node(out: &mut String, node: &QueryNode) {
    let indent = "  ".repeat(node.depth());
    let ty = node.type_info().type_name();
    // Writing into a `String` cannot fail.
    let _ = if node.parent().is_none() {
        write!(out, "{indent}{} {ty}", node.id())
    } else {
        write!(out, "{indent}{} {}: {ty}", node.id(), node.field_name())
    };
    if !node.arguments().is_empty() {
        let args = node
            .arguments()
            .iter()
            .map(|(name, vref)| format!("{name}={}", vref.id()))
            .join(", ");
        let _ = write!(out, " ({args})");
    }
    out.push('\n');
}
