//! codelibrarian-store: SQLite persistence for the code index.
//!
//! Uses rusqlite with bundled SQLite, WAL mode, and an embedded schema.
//! Symbols are mirrored into an FTS5 table by triggers; embeddings are
//! little-endian f32 BLOBs keyed by symbol id.

use codelibrarian_core::{LibrarianError, Parameter, SymbolKind, SymbolRecord};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

mod graph;
mod search;
mod symbols;

pub use graph::{ClassHierarchy, ClassInfo, FileImports, ImportInfo, ImportedBy};
pub use symbols::{FileUpsert, FileWriteOutcome};

const SCHEMA: &str = include_str!("schema.sql");

/// Maximum rows returned by exact/prefix symbol look-ups.
pub(crate) const LOOKUP_LIMIT: i64 = 20;
/// Maximum rows returned by `list_symbols`.
pub(crate) const LIST_LIMIT: i64 = 200;
/// Maximum symbols fetched per embedding batch cycle.
pub(crate) const EMBED_BATCH_CEILING: i64 = 1000;
/// Maximum recursion depth for ancestor/descendant class-hierarchy CTEs.
pub(crate) const HIERARCHY_DEPTH: u32 = 5;

/// SQLite-backed store for files, symbols, full-text, embeddings, and edges.
///
/// Wraps the connection in a `Mutex` so one handle can be shared across the
/// CLI and MCP server threads; SQLite itself allows concurrent readers via
/// WAL while this process holds the single writer.
pub struct Store {
    conn: Mutex<Connection>,
    embedding_dimensions: usize,
}

impl Store {
    /// Open (or create) the index database at the given path.
    pub fn open(path: &Path, embedding_dimensions: usize) -> Result<Self, LibrarianError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(storage_err)?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(storage_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(storage_err)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(storage_err)?;

        conn.execute_batch(SCHEMA).map_err(storage_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
            embedding_dimensions,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(embedding_dimensions: usize) -> Result<Self, LibrarianError> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedding_dimensions,
        })
    }

    /// Configured embedding vector width.
    pub fn embedding_dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    /// Get a lock on the underlying connection.
    pub(crate) fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("Store mutex poisoned")
    }

    /// Database statistics for `status` output.
    pub fn stats(&self) -> Result<StoreStats, LibrarianError> {
        let conn = self.conn();
        let files: usize = conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .map_err(storage_err)?;

        let mut symbols = BTreeMap::new();
        for kind in SymbolKind::ALL {
            let count: usize = conn
                .query_row(
                    "SELECT COUNT(*) FROM symbols WHERE kind = ?1",
                    [kind.to_string()],
                    |row| row.get(0),
                )
                .map_err(storage_err)?;
            symbols.insert(kind.to_string(), count);
        }

        let embeddings: usize = conn
            .query_row("SELECT COUNT(*) FROM symbol_embeddings", [], |row| {
                row.get(0)
            })
            .map_err(storage_err)?;

        Ok(StoreStats {
            files,
            symbols,
            embeddings,
        })
    }
}

/// Counts reported by `Store::stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub files: usize,
    pub symbols: BTreeMap<String, usize>,
    pub embeddings: usize,
}

impl StoreStats {
    pub fn total_symbols(&self) -> usize {
        self.symbols.values().sum()
    }
}

pub(crate) fn storage_err(e: rusqlite::Error) -> LibrarianError {
    LibrarianError::Storage(e.to_string())
}

/// Column list shared by every query that hydrates a `SymbolRecord`.
pub(crate) const SYMBOL_COLUMNS: &str = "s.id, s.file_id, s.name, s.qualified_name, s.kind, \
     s.line_start, s.line_end, s.signature, s.docstring, \
     s.parameters, s.return_type, s.decorators, s.parent_id, \
     f.path, f.relative_path";

/// Map a row selected with [`SYMBOL_COLUMNS`] into a `SymbolRecord`.
pub(crate) fn symbol_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SymbolRecord> {
    let kind_str: String = row.get(4)?;
    let parameters_json: String = row.get(9)?;
    let decorators_json: String = row.get(11)?;
    let parameters: Vec<Parameter> = serde_json::from_str(&parameters_json).unwrap_or_default();
    let decorators: Vec<String> = serde_json::from_str(&decorators_json).unwrap_or_default();

    Ok(SymbolRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        kind: kind_str.parse().unwrap_or(SymbolKind::Function),
        line_start: row.get(5)?,
        line_end: row.get(6)?,
        signature: row.get(7)?,
        docstring: row.get(8)?,
        parameters,
        return_type: row.get(10)?,
        decorators,
        parent_id: row.get(12)?,
        file_path: row.get(13)?,
        relative_path: row.get(14)?,
    })
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use codelibrarian_core::{
        CallEdge, GraphEdges, ImportEdge, InheritEdge, ParseResult, Symbol,
    };
    use std::collections::HashMap;

    pub fn symbol(name: &str, qname: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            name: name.to_string(),
            qualified_name: qname.to_string(),
            kind,
            line_start: 1,
            line_end: 3,
            signature: format!("def {name}()"),
            docstring: String::new(),
            parameters: vec![],
            return_type: None,
            decorators: vec![],
            parent_qualified_name: None,
        }
    }

    pub fn upsert(path: &str) -> FileUpsert {
        FileUpsert {
            path: path.to_string(),
            relative_path: path.trim_start_matches('/').to_string(),
            language: Some("python".to_string()),
            last_modified: 0.0,
            content_hash: format!("hash-of-{path}"),
        }
    }

    /// Index the animal-shelter fixture used across store tests:
    /// models.py defines Animal/Dog/Cat plus find_oldest, services.py calls
    /// into it.
    pub fn animal_fixture(store: &Store) -> HashMap<String, i64> {
        let mut known = HashMap::new();

        let mut animal = symbol("Animal", "models.Animal", SymbolKind::Class);
        animal.signature = "class Animal".to_string();
        animal.docstring = "Base class for all animals.".to_string();
        let mut speak = symbol("speak", "models.Animal.speak", SymbolKind::Method);
        speak.parent_qualified_name = Some("models.Animal".to_string());
        speak.signature = "def speak(self) -> str".to_string();
        let mut dog = symbol("Dog", "models.Dog", SymbolKind::Class);
        dog.signature = "class Dog(Animal)".to_string();
        let mut fetch = symbol("fetch", "models.Dog.fetch", SymbolKind::Method);
        fetch.parent_qualified_name = Some("models.Dog".to_string());
        fetch.signature = "def fetch(self, item: str) -> str".to_string();
        fetch.docstring = "Fetch the given item and return a status string.".to_string();
        let mut cat = symbol("Cat", "models.Cat", SymbolKind::Class);
        cat.signature = "class Cat(Animal)".to_string();
        let mut find_oldest = symbol("find_oldest", "models.find_oldest", SymbolKind::Function);
        find_oldest.docstring = "Return the oldest animal from a list.".to_string();

        let models = ParseResult {
            symbols: vec![animal, speak, dog, fetch, cat, find_oldest],
            edges: GraphEdges {
                imports: vec![],
                calls: vec![],
                inherits: vec![
                    InheritEdge {
                        child: "models.Dog".to_string(),
                        parent: "Animal".to_string(),
                    },
                    InheritEdge {
                        child: "models.Cat".to_string(),
                        parent: "Animal".to_string(),
                    },
                ],
            },
        };
        store
            .write_file_index(&upsert("/repo/models.py"), &models, &mut known)
            .unwrap();

        let mut shelter = symbol("AnimalShelter", "services.AnimalShelter", SymbolKind::Class);
        shelter.signature = "class AnimalShelter".to_string();
        let mut oldest = symbol(
            "find_oldest_resident",
            "services.AnimalShelter.find_oldest_resident",
            SymbolKind::Method,
        );
        oldest.parent_qualified_name = Some("services.AnimalShelter".to_string());

        let services = ParseResult {
            symbols: vec![shelter, oldest],
            edges: GraphEdges {
                imports: vec![ImportEdge {
                    module: "models".to_string(),
                    name: Some("find_oldest".to_string()),
                }],
                calls: vec![CallEdge {
                    caller: "services.AnimalShelter.find_oldest_resident".to_string(),
                    callee: "find_oldest".to_string(),
                    line: 26,
                }],
                inherits: vec![],
            },
        };
        store
            .write_file_index(&upsert("/repo/services.py"), &services, &mut known)
            .unwrap();

        store.resolve_graph_edges().unwrap();
        known
    }
}
