use std::collections::{BTreeMap, BTreeSet};

/// Foreign-key dependency graph over the table catalog.
///
/// Maps every table to the set of tables it references. Built once from the
/// schema text and treated as read-only input afterwards. Ordered collections
/// are used throughout so that graph enumeration, and therefore batch
/// ordering, is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl TableDependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table, with no dependencies yet.
    ///
    /// The graph's key set is the table catalog, so tables without relations
    /// must still be added.
    pub fn add_table(&mut self, table: impl Into<String>) {
        self.edges.entry(table.into()).or_default();
    }

    /// Adds a dependency edge: `table` references `references`.
    ///
    /// Multiple relations to the same table collapse into one edge.
    pub fn add_dependency(&mut self, table: impl Into<String>, references: impl Into<String>) {
        self.edges
            .entry(table.into())
            .or_default()
            .insert(references.into());
    }

    /// Returns all known tables in deterministic (sorted) order.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    /// Returns the tables the given table references, if it is known.
    pub fn dependencies_of(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(table)
    }

    /// Returns whether the table is part of the catalog.
    pub fn contains(&self, table: &str) -> bool {
        self.edges.contains_key(table)
    }

    /// Returns the number of tables in the catalog.
    pub fn table_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns whether the graph holds no tables at all.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_edges_collapse() {
        let mut graph = TableDependencyGraph::new();
        graph.add_dependency("posts", "users");
        graph.add_dependency("posts", "users");

        assert_eq!(graph.dependencies_of("posts").unwrap().len(), 1);
    }

    #[test]
    fn tables_enumerate_in_sorted_order() {
        let mut graph = TableDependencyGraph::new();
        graph.add_table("zebra");
        graph.add_table("accounts");
        graph.add_table("middle");

        let tables: Vec<&str> = graph.tables().collect();
        assert_eq!(tables, vec!["accounts", "middle", "zebra"]);
    }
}
