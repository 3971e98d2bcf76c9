use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::schema::graph::TableDependencyGraph;

/// Scalar type tokens that can never be a relation target.
const SCALAR_TYPES: [&str; 9] = [
    "Int", "BigInt", "Float", "Decimal", "String", "Boolean", "DateTime", "Json", "Bytes",
];

/// Matches one `model <Name> { ... }` block. The body ends at the first
/// closing brace on its own line, which holds for the schema dialect even
/// though attribute arguments may contain parentheses.
static MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\bmodel\s+([A-Za-z_]\w*)\s*\{(.*?)\n\}").expect("model pattern is valid")
});

/// Matches a `@@map("physical_name")` block attribute.
static MAP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@@map\(\s*"([^"]+)"\s*\)"#).expect("map pattern is valid")
});

/// Relation field with the referenced type token preceding the annotation:
/// `author  users  @relation(...)`.
static TYPE_BEFORE_RELATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*[A-Za-z_]\w*\s+([A-Za-z_]\w*)(?:\[\])?\??\s+@relation\b")
        .expect("type-before pattern is valid")
});

/// Relation field with the referenced type token following the annotation:
/// `author  @relation(...)  users`.
static TYPE_AFTER_RELATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)@relation\b(?:\([^)]*\))?\s+([A-Za-z_]\w*)(?:\[\])?\??\s*$")
        .expect("type-after pattern is valid")
});

/// Extracts the table dependency graph from raw schema text.
///
/// This is a deliberately best-effort heuristic scanner, not a grammar: it
/// looks for `model` blocks and their `@relation` fields, resolves `@@map`
/// renames, and drops anything it cannot make sense of. Malformed input
/// yields a partial or empty graph, never an error; callers degrade to
/// identity ordering when no dependency information is available.
pub fn parse_schema(schema: &str) -> TableDependencyGraph {
    let mut graph = TableDependencyGraph::new();

    // First pass: collect every model and its physical table name, so edges
    // found in the second pass can target renamed tables.
    let mut physical_names: BTreeMap<String, String> = BTreeMap::new();
    let mut bodies: Vec<(String, &str)> = Vec::new();

    for captures in MODEL_RE.captures_iter(schema) {
        let model = captures[1].to_string();
        let body = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

        let table = MAP_RE
            .captures(body)
            .map(|m| m[1].to_string())
            .unwrap_or_else(|| model.clone());

        graph.add_table(table.clone());
        physical_names.insert(model.clone(), table);
        bodies.push((model, body));
    }

    // Second pass: one edge per referenced model, excluding scalar tokens,
    // self-references, and tokens that did not resolve to a known model.
    for (model, body) in &bodies {
        let table = physical_names[model].clone();

        let referenced = TYPE_BEFORE_RELATION_RE
            .captures_iter(body)
            .chain(TYPE_AFTER_RELATION_RE.captures_iter(body))
            .map(|captures| captures[1].to_string());

        for target_model in referenced {
            if SCALAR_TYPES.contains(&target_model.as_str()) || target_model == *model {
                continue;
            }

            let Some(target_table) = physical_names.get(&target_model) else {
                continue;
            };

            if *target_table != table {
                graph.add_dependency(table.clone(), target_table.clone());
            }
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
model security_roles {
  id          Int      @id @default(autoincrement())
  name        String
  created_at  DateTime @default(now())
  users       security_users[]
}

model security_users {
  id       Int            @id
  role_id  Int
  role     security_roles @relation(fields: [role_id], references: [id])
}

model accounts {
  id        Int            @id
  owner_id  Int
  owner     security_users @relation(fields: [owner_id], references: [id])
  approver  security_users @relation("approver", fields: [owner_id], references: [id])
}
"#;

    #[test]
    fn extracts_relations_with_type_before_annotation() {
        let graph = parse_schema(SCHEMA);

        assert_eq!(graph.table_count(), 3);
        assert!(graph
            .dependencies_of("security_users")
            .unwrap()
            .contains("security_roles"));
        assert!(graph
            .dependencies_of("accounts")
            .unwrap()
            .contains("security_users"));
    }

    #[test]
    fn multiple_relations_to_same_table_collapse() {
        let graph = parse_schema(SCHEMA);

        // `accounts` declares two relations to `security_users`.
        assert_eq!(graph.dependencies_of("accounts").unwrap().len(), 1);
    }

    #[test]
    fn extracts_relations_with_type_after_annotation() {
        let schema = r#"
model orders {
  id       Int @id
  customer @relation(fields: [customer_id], references: [id]) customers
}

model customers {
  id Int @id
}
"#;
        let graph = parse_schema(schema);

        assert!(graph
            .dependencies_of("orders")
            .unwrap()
            .contains("customers"));
    }

    #[test]
    fn scalar_types_are_not_relation_targets() {
        let schema = r#"
model events {
  id      Int      @id
  payload Json     @relation
  at      DateTime @relation
}
"#;
        let graph = parse_schema(schema);

        assert!(graph.dependencies_of("events").unwrap().is_empty());
    }

    #[test]
    fn self_references_are_excluded() {
        let schema = r#"
model categories {
  id        Int        @id
  parent_id Int
  parent    categories @relation(fields: [parent_id], references: [id])
}
"#;
        let graph = parse_schema(schema);

        assert!(graph.dependencies_of("categories").unwrap().is_empty());
    }

    #[test]
    fn map_attribute_renames_the_table() {
        let schema = r#"
model Role {
  id    Int    @id
  users User[]

  @@map("security_roles")
}

model User {
  id      Int  @id
  role_id Int
  role    Role @relation(fields: [role_id], references: [id])

  @@map("security_users")
}
"#;
        let graph = parse_schema(schema);

        assert!(graph.contains("security_roles"));
        assert!(graph.contains("security_users"));
        assert!(graph
            .dependencies_of("security_users")
            .unwrap()
            .contains("security_roles"));
    }

    #[test]
    fn malformed_input_yields_empty_graph() {
        let graph = parse_schema("this is { not a schema");

        assert!(graph.is_empty());
    }

    #[test]
    fn unknown_type_tokens_are_dropped() {
        let schema = r#"
model posts {
  id     Int    @id
  status Status @relation
}
"#;
        // `Status` is an enum, not a model; no edge should be created.
        let graph = parse_schema(schema);

        assert!(graph.dependencies_of("posts").unwrap().is_empty());
    }
}
