//! Mermaid diagram generation from the index.

use codelibrarian_core::LibrarianError;
use codelibrarian_store::Store;
use std::collections::{BTreeMap, BTreeSet};

/// Convert a qualified name into a valid Mermaid node id.
///
/// A short hash suffix disambiguates names that collapse to the same id
/// after separator replacement (`foo.bar` vs `foo_bar`).
fn sanitize_id(name: &str) -> String {
    let base: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{base}_{:04x}", name_hash(name) & 0xFFFF)
}

fn name_hash(name: &str) -> u32 {
    // FNV-1a, stable across runs.
    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Last component of a qualified name for display.
fn short_name(qualified_name: &str) -> &str {
    qualified_name
        .rsplit("::")
        .next()
        .and_then(|s| s.rsplit('.').next())
        .unwrap_or(qualified_name)
}

fn file_label(relative_path: &str) -> &str {
    relative_path.rsplit('/').next().unwrap_or(relative_path)
}

/// Mermaid classDiagram for a class, its ancestors, and descendants.
/// Empty string when the class is unknown.
pub fn mermaid_class_diagram(store: &Store, class_name: &str) -> Result<String, LibrarianError> {
    let hierarchy = store.get_class_hierarchy(class_name)?;
    let Some(root) = hierarchy.class else {
        return Ok(String::new());
    };

    let mut lines = vec!["classDiagram".to_string()];

    let mut all_classes = vec![root.qualified_name.clone()];
    all_classes.extend(hierarchy.parents.iter().map(|p| p.qualified_name.clone()));
    all_classes.extend(hierarchy.children.iter().map(|c| c.qualified_name.clone()));

    for qname in &all_classes {
        let cid = sanitize_id(qname);
        let short = short_name(qname);
        let methods = store.get_methods_for_class(qname)?;
        if methods.is_empty() {
            lines.push(format!("    class {cid}[\"{short}\"]"));
        } else {
            lines.push(format!("    class {cid}[\"{short}\"] {{"));
            for method in methods {
                let params = method
                    .parameters
                    .iter()
                    .filter(|p| p.name != "self" && p.name != "cls")
                    .map(|p| match &p.type_annotation {
                        Some(t) => format!("{}: {t}", p.name),
                        None => p.name.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let ret = method
                    .return_type
                    .as_deref()
                    .map(|r| format!(" {r}"))
                    .unwrap_or_default();
                lines.push(format!("        +{}({params}){ret}", method.name));
            }
            lines.push("    }".to_string());
        }
    }

    let root_id = sanitize_id(&root.qualified_name);
    for parent in &hierarchy.parents {
        lines.push(format!(
            "    {} <|-- {root_id}",
            sanitize_id(&parent.qualified_name)
        ));
    }
    for child in &hierarchy.children {
        lines.push(format!(
            "    {root_id} <|-- {}",
            sanitize_id(&child.qualified_name)
        ));
    }

    Ok(lines.join("\n"))
}

/// Mermaid flowchart of call relationships rooted at a symbol. Empty
/// string when no edges exist.
pub fn mermaid_call_graph(
    store: &Store,
    qualified_name: &str,
    depth: u32,
    callers: bool,
) -> Result<String, LibrarianError> {
    let edges = store.get_call_edges(qualified_name, depth, callers)?;
    if edges.is_empty() {
        return Ok(String::new());
    }

    let mut lines = vec!["flowchart LR".to_string()];

    let mut nodes: BTreeSet<&str> = BTreeSet::new();
    for (caller, callee) in &edges {
        nodes.insert(caller);
        nodes.insert(callee);
    }
    for qname in &nodes {
        lines.push(format!(
            "    {}[\"{}\"]",
            sanitize_id(qname),
            short_name(qname)
        ));
    }
    for (caller, callee) in &edges {
        lines.push(format!(
            "    {} --> {}",
            sanitize_id(caller),
            sanitize_id(callee)
        ));
    }

    // Highlight the root when it appears under its own qualified name.
    if nodes.iter().any(|n| *n == qualified_name) {
        lines.push(format!(
            "    style {} fill:#f96,stroke:#333,stroke-width:2px",
            sanitize_id(qualified_name)
        ));
    }

    Ok(lines.join("\n"))
}

/// Mermaid flowchart of file-to-file import edges, grouped into subgraphs
/// by top-level directory. Empty string when no resolved edges exist.
pub fn mermaid_import_graph(
    store: &Store,
    file_path: Option<&str>,
) -> Result<String, LibrarianError> {
    let mut edges = store.get_all_import_edges()?;
    if let Some(scope) = file_path {
        edges.retain(|(from, to)| from == scope || to == scope);
    }
    if edges.is_empty() {
        return Ok(String::new());
    }

    let mut lines = vec!["flowchart LR".to_string()];

    let mut all_files: BTreeSet<&str> = BTreeSet::new();
    for (from, to) in &edges {
        all_files.insert(from);
        all_files.insert(to);
    }

    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for file in &all_files {
        let group = match file.split_once('/') {
            Some((dir, _)) => dir,
            None => ".",
        };
        groups.entry(group).or_default().push(file);
    }

    for (group, files) in &groups {
        if *group == "." {
            for file in files {
                lines.push(format!(
                    "    {}[\"{}\"]",
                    sanitize_id(file),
                    file_label(file)
                ));
            }
        } else {
            lines.push(format!("    subgraph {}[\"{group}\"]", sanitize_id(group)));
            for file in files {
                lines.push(format!(
                    "        {}[\"{}\"]",
                    sanitize_id(file),
                    file_label(file)
                ));
            }
            lines.push("    end".to_string());
        }
    }

    for (from, to) in &edges {
        lines.push(format!("    {} --> {}", sanitize_id(from), sanitize_id(to)));
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codelibrarian_core::{
        CallEdge, GraphEdges, ImportEdge, InheritEdge, ParseResult, Symbol, SymbolKind,
    };
    use codelibrarian_store::FileUpsert;
    use std::collections::HashMap;

    fn symbol(name: &str, qname: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            name: name.to_string(),
            qualified_name: qname.to_string(),
            kind,
            line_start: 1,
            line_end: 2,
            signature: String::new(),
            docstring: String::new(),
            parameters: vec![],
            return_type: None,
            decorators: vec![],
            parent_qualified_name: None,
        }
    }

    fn fixture() -> Store {
        let store = Store::open_in_memory(4).unwrap();
        let mut known = HashMap::new();

        let mut speak = symbol("speak", "models.Animal.speak", SymbolKind::Method);
        speak.parent_qualified_name = Some("models.Animal".to_string());
        speak.return_type = Some("str".to_string());

        let models = ParseResult {
            symbols: vec![
                symbol("Animal", "models.Animal", SymbolKind::Class),
                speak,
                symbol("Dog", "models.Dog", SymbolKind::Class),
                symbol("walk", "models.walk", SymbolKind::Function),
                symbol("run", "models.run", SymbolKind::Function),
            ],
            edges: GraphEdges {
                imports: vec![],
                calls: vec![CallEdge {
                    caller: "models.walk".to_string(),
                    callee: "run".to_string(),
                    line: 5,
                }],
                inherits: vec![InheritEdge {
                    child: "models.Dog".to_string(),
                    parent: "Animal".to_string(),
                }],
            },
        };
        store
            .write_file_index(
                &FileUpsert {
                    path: "/repo/src/models.py".to_string(),
                    relative_path: "src/models.py".to_string(),
                    language: Some("python".to_string()),
                    last_modified: 0.0,
                    content_hash: "h1".to_string(),
                },
                &models,
                &mut known,
            )
            .unwrap();

        let services = ParseResult {
            symbols: vec![symbol("Svc", "services.Svc", SymbolKind::Class)],
            edges: GraphEdges {
                imports: vec![ImportEdge {
                    module: "src.models".to_string(),
                    name: None,
                }],
                calls: vec![],
                inherits: vec![],
            },
        };
        store
            .write_file_index(
                &FileUpsert {
                    path: "/repo/src/services.py".to_string(),
                    relative_path: "src/services.py".to_string(),
                    language: Some("python".to_string()),
                    last_modified: 0.0,
                    content_hash: "h2".to_string(),
                },
                &services,
                &mut known,
            )
            .unwrap();

        store.resolve_graph_edges().unwrap();
        store
    }

    #[test]
    fn class_diagram_shows_hierarchy_and_methods() {
        let store = fixture();
        let diagram = mermaid_class_diagram(&store, "Animal").unwrap();
        assert!(diagram.starts_with("classDiagram"));
        assert!(diagram.contains("\"Animal\""));
        assert!(diagram.contains("\"Dog\""));
        assert!(diagram.contains("+speak() str"));
        assert!(diagram.contains("<|--"));
    }

    #[test]
    fn class_diagram_unknown_class_is_empty() {
        let store = fixture();
        assert!(mermaid_class_diagram(&store, "Giraffe").unwrap().is_empty());
    }

    #[test]
    fn call_graph_highlights_root() {
        let store = fixture();
        let diagram = mermaid_call_graph(&store, "models.walk", 2, false).unwrap();
        assert!(diagram.starts_with("flowchart LR"));
        assert!(diagram.contains("-->"));
        assert!(diagram.contains("style"));
        assert!(diagram.contains("\"walk\""));
        assert!(diagram.contains("\"run\""));
    }

    #[test]
    fn call_graph_no_edges_is_empty() {
        let store = fixture();
        assert!(mermaid_call_graph(&store, "models.run", 1, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn import_graph_groups_by_directory() {
        let store = fixture();
        let diagram = mermaid_import_graph(&store, None).unwrap();
        assert!(diagram.contains("subgraph"));
        assert!(diagram.contains("\"src\""));
        assert!(diagram.contains("\"models.py\""));
        assert!(diagram.contains("-->"));
    }

    #[test]
    fn import_graph_scoped_to_file() {
        let store = fixture();
        let scoped = mermaid_import_graph(&store, Some("src/services.py")).unwrap();
        assert!(scoped.contains("services"));
        let unrelated = mermaid_import_graph(&store, Some("src/other.py")).unwrap();
        assert!(unrelated.is_empty());
    }

    #[test]
    fn sanitize_ids_are_distinct_for_colliding_names() {
        assert_ne!(sanitize_id("foo.bar"), sanitize_id("foo_bar"));
        let id = sanitize_id("a.b::c");
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
