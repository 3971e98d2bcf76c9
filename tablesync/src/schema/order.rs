use std::collections::{BTreeSet, HashMap};
use tracing::warn;

use crate::schema::graph::TableDependencyGraph;

/// Visit marking for the depth-first traversal.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

/// Orders the given tables so that referenced tables come before the tables
/// referencing them.
///
/// The result is always a permutation of `tables`: for every edge A→B with
/// both endpoints in the input and no cycle through them, B precedes A.
/// Edges whose endpoints are not both in the input are ignored. A back-edge
/// into a table currently being visited indicates a circular foreign key;
/// the edge is logged and dropped so the traversal always terminates.
/// Real schemas contain such cycles and a strict sort would be unusable.
///
/// With an empty graph the input order is returned unchanged, so callers
/// always get a valid batch order even with zero dependency information.
pub fn sort_tables(tables: &[String], graph: &TableDependencyGraph) -> Vec<String> {
    if graph.is_empty() {
        return tables.to_vec();
    }

    let input: BTreeSet<&str> = tables.iter().map(String::as_str).collect();
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(tables.len());
    let mut ordered = Vec::with_capacity(tables.len());

    for table in tables {
        visit(table, graph, &input, &mut marks, &mut ordered);
    }

    ordered
}

fn visit<'a>(
    table: &'a str,
    graph: &'a TableDependencyGraph,
    input: &BTreeSet<&str>,
    marks: &mut HashMap<&'a str, Mark>,
    ordered: &mut Vec<String>,
) {
    if marks.get(table).copied().unwrap_or(Mark::Unvisited) != Mark::Unvisited {
        return;
    }

    marks.insert(table, Mark::Visiting);

    if let Some(dependencies) = graph.dependencies_of(table) {
        for dependency in dependencies {
            if !input.contains(dependency.as_str()) {
                continue;
            }

            match marks
                .get(dependency.as_str())
                .copied()
                .unwrap_or(Mark::Unvisited)
            {
                Mark::Visited => {}
                Mark::Visiting => {
                    warn!(
                        "dependency cycle detected between '{}' and '{}', ignoring edge",
                        table, dependency
                    );
                }
                Mark::Unvisited => visit(dependency, graph, input, marks, ordered),
            }
        }
    }

    marks.insert(table, Mark::Visited);
    ordered.push(table.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(tables: &[&str]) -> Vec<String> {
        tables.iter().map(|t| t.to_string()).collect()
    }

    fn position(ordered: &[String], table: &str) -> usize {
        ordered.iter().position(|t| t == table).unwrap()
    }

    #[test]
    fn referenced_tables_come_first() {
        let mut graph = TableDependencyGraph::new();
        graph.add_table("security_roles");
        graph.add_dependency("security_users", "security_roles");
        graph.add_dependency("accounts", "security_users");

        let ordered = sort_tables(
            &owned(&["accounts", "security_roles", "security_users"]),
            &graph,
        );

        assert_eq!(ordered.len(), 3);
        assert!(position(&ordered, "security_roles") < position(&ordered, "security_users"));
        assert!(position(&ordered, "security_users") < position(&ordered, "accounts"));
    }

    #[test]
    fn result_is_a_permutation_of_the_input() {
        let mut graph = TableDependencyGraph::new();
        graph.add_dependency("b", "a");
        graph.add_dependency("c", "b");
        graph.add_dependency("d", "c");

        let input = owned(&["d", "b", "a", "c"]);
        let mut ordered = sort_tables(&input, &graph);
        ordered.sort();

        let mut expected = input.clone();
        expected.sort();
        assert_eq!(ordered, expected);
    }

    #[test]
    fn cycles_do_not_loop_or_fail() {
        let mut graph = TableDependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "a");

        let mut ordered = sort_tables(&owned(&["a", "b"]), &graph);
        ordered.sort();

        assert_eq!(ordered, owned(&["a", "b"]));
    }

    #[test]
    fn edges_leaving_the_input_subset_are_ignored() {
        let mut graph = TableDependencyGraph::new();
        graph.add_dependency("posts", "users");
        graph.add_dependency("posts", "topics");

        // `users` is not selected, so only the `topics` edge matters.
        let ordered = sort_tables(&owned(&["posts", "topics"]), &graph);

        assert_eq!(ordered, owned(&["topics", "posts"]));
    }

    #[test]
    fn empty_graph_degrades_to_identity_order() {
        let graph = TableDependencyGraph::new();

        let input = owned(&["c", "a", "b"]);
        let ordered = sort_tables(&input, &graph);

        assert_eq!(ordered, input);
    }

    #[test]
    fn unselected_tables_never_appear_in_the_result() {
        let mut graph = TableDependencyGraph::new();
        graph.add_dependency("posts", "users");
        graph.add_table("comments");

        let ordered = sort_tables(&owned(&["posts"]), &graph);

        assert_eq!(ordered, owned(&["posts"]));
    }
}
