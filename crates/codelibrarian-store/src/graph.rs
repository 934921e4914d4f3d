//! Graph edge resolution and recursive traversal queries.

use crate::{storage_err, symbol_from_row, Store, HIERARCHY_DEPTH, SYMBOL_COLUMNS};
use codelibrarian_core::{LibrarianError, SymbolRecord};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// A class participating in a hierarchy query.
#[derive(Debug, Clone, Serialize)]
pub struct ClassInfo {
    pub name: String,
    pub qualified_name: String,
    pub relative_path: String,
}

/// Result of `get_class_hierarchy`.
#[derive(Debug, Clone, Serialize)]
pub struct ClassHierarchy {
    pub class: Option<ClassInfo>,
    pub parents: Vec<ClassInfo>,
    pub children: Vec<ClassInfo>,
}

/// One outbound import of a file.
#[derive(Debug, Clone, Serialize)]
pub struct ImportInfo {
    pub to_module: String,
    pub import_name: String,
    pub resolved_path: Option<String>,
}

/// A file that imports the queried file.
#[derive(Debug, Clone, Serialize)]
pub struct ImportedBy {
    pub path: String,
    pub relative_path: String,
}

/// Result of `get_file_imports`.
#[derive(Debug, Clone, Serialize)]
pub struct FileImports {
    pub imports: Vec<ImportInfo>,
    pub imported_by: Vec<ImportedBy>,
}

impl Store {
    // ── Edge resolution ─────────────────────────────────────────────────

    /// Link unresolved call/inherit/import edges to symbol and file ids.
    ///
    /// Idempotent: only rows with a NULL resolution are touched, so calling
    /// it again after a converged pass is a no-op.
    pub fn resolve_graph_edges(&self) -> Result<(), LibrarianError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction().map_err(storage_err)?;
        resolve_calls(&tx)?;
        resolve_inherits(&tx)?;
        resolve_imports(&tx)?;
        tx.commit().map_err(storage_err)?;
        Ok(())
    }

    // ── Call graph ──────────────────────────────────────────────────────

    /// Symbols that (transitively) call the named symbol, up to `depth`
    /// hops. Depth is inclusive and starts at 1; depth 0 is empty.
    pub fn get_callers(
        &self,
        qualified_name: &str,
        depth: u32,
    ) -> Result<Vec<SymbolRecord>, LibrarianError> {
        if depth == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "WITH RECURSIVE caller_tree(id, depth) AS ( \
                     SELECT c.caller_id, 1 FROM calls c \
                     JOIN symbols s ON c.callee_id = s.id \
                     WHERE s.qualified_name = ?1 OR s.name = ?1 \
                     UNION \
                     SELECT c2.caller_id, ct.depth + 1 FROM calls c2 \
                     JOIN caller_tree ct ON c2.callee_id = ct.id \
                     WHERE ct.depth < ?2 \
                 ) \
                 SELECT DISTINCT {SYMBOL_COLUMNS} FROM caller_tree ct \
                 JOIN symbols s ON ct.id = s.id \
                 JOIN files f ON s.file_id = f.id"
            ))
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![qualified_name, depth], symbol_from_row)
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// Symbols (transitively) called by the named symbol.
    pub fn get_callees(
        &self,
        qualified_name: &str,
        depth: u32,
    ) -> Result<Vec<SymbolRecord>, LibrarianError> {
        if depth == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "WITH RECURSIVE callee_tree(id, depth) AS ( \
                     SELECT c.callee_id, 1 FROM calls c \
                     JOIN symbols s ON c.caller_id = s.id \
                     WHERE (s.qualified_name = ?1 OR s.name = ?1) \
                       AND c.callee_id IS NOT NULL \
                     UNION \
                     SELECT c2.callee_id, ct.depth + 1 FROM calls c2 \
                     JOIN callee_tree ct ON c2.caller_id = ct.id \
                     WHERE ct.depth < ?2 AND c2.callee_id IS NOT NULL \
                 ) \
                 SELECT DISTINCT {SYMBOL_COLUMNS} FROM callee_tree ct \
                 JOIN symbols s ON ct.id = s.id \
                 JOIN files f ON s.file_id = f.id"
            ))
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![qualified_name, depth], symbol_from_row)
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// Number of distinct direct callers of the named symbol.
    pub fn count_callers(&self, qualified_name: &str) -> Result<usize, LibrarianError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(DISTINCT c.caller_id) FROM calls c \
             JOIN symbols s ON c.callee_id = s.id \
             WHERE s.qualified_name = ?1 OR s.name = ?1",
            [qualified_name],
            |row| row.get(0),
        )
        .map_err(storage_err)
    }

    /// Number of distinct direct callees of the named symbol.
    pub fn count_callees(&self, qualified_name: &str) -> Result<usize, LibrarianError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(DISTINCT c.callee_id) FROM calls c \
             JOIN symbols s ON c.caller_id = s.id \
             WHERE (s.qualified_name = ?1 OR s.name = ?1) AND c.callee_id IS NOT NULL",
            [qualified_name],
            |row| row.get(0),
        )
        .map_err(storage_err)
    }

    /// Directed `(caller_qname, callee_qname)` pairs reachable from the
    /// named root within `depth` hops, for diagram rendering.
    ///
    /// The depth bound is enforced by collecting reachable node ids with a
    /// depth-bounded CTE (UNION deduplicates, so cycles terminate), then
    /// selecting every call edge falling entirely inside that set.
    pub fn get_call_edges(
        &self,
        qualified_name: &str,
        depth: u32,
        callers: bool,
    ) -> Result<Vec<(String, String)>, LibrarianError> {
        if depth == 0 {
            return Ok(Vec::new());
        }
        let recursive_step = if callers {
            "SELECT c.caller_id, r.d + 1 FROM calls c \
             JOIN reachable r ON c.callee_id = r.id \
             WHERE r.d < ?2 AND c.caller_id IS NOT NULL"
        } else {
            "SELECT c.callee_id, r.d + 1 FROM calls c \
             JOIN reachable r ON c.caller_id = r.id \
             WHERE r.d < ?2 AND c.callee_id IS NOT NULL"
        };
        let sql = format!(
            "WITH RECURSIVE reachable(id, d) AS ( \
                 SELECT s.id, 0 FROM symbols s \
                 WHERE s.qualified_name = ?1 OR s.name = ?1 \
                 UNION \
                 {recursive_step} \
             ) \
             SELECT DISTINCT s1.qualified_name, s2.qualified_name \
             FROM calls c \
             JOIN reachable r1 ON c.caller_id = r1.id \
             JOIN reachable r2 ON c.callee_id = r2.id \
             JOIN symbols s1 ON c.caller_id = s1.id \
             JOIN symbols s2 ON c.callee_id = s2.id \
             WHERE c.callee_id IS NOT NULL \
             ORDER BY s1.qualified_name, s2.qualified_name"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(params![qualified_name, depth], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    // ── Imports ─────────────────────────────────────────────────────────

    /// All resolved file-to-file import edges as relative-path pairs.
    pub fn get_all_import_edges(&self) -> Result<Vec<(String, String)>, LibrarianError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT f1.relative_path, f2.relative_path \
                 FROM imports i \
                 JOIN files f1 ON i.from_file_id = f1.id \
                 JOIN files f2 ON i.to_file_id = f2.id \
                 WHERE i.to_file_id IS NOT NULL \
                 ORDER BY f1.relative_path, f2.relative_path",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// What a file imports, and which files import it. Unknown files yield
    /// empty lists.
    pub fn get_file_imports(&self, file_path: &str) -> Result<FileImports, LibrarianError> {
        let conn = self.conn();
        let file_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM files WHERE path = ?1 OR relative_path = ?1",
                [file_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        let Some(file_id) = file_id else {
            return Ok(FileImports {
                imports: Vec::new(),
                imported_by: Vec::new(),
            });
        };

        let mut stmt = conn
            .prepare(
                "SELECT i.to_module, i.import_name, f.relative_path \
                 FROM imports i LEFT JOIN files f ON i.to_file_id = f.id \
                 WHERE i.from_file_id = ?1 ORDER BY i.to_module",
            )
            .map_err(storage_err)?;
        let imports = stmt
            .query_map([file_id], |row| {
                Ok(ImportInfo {
                    to_module: row.get(0)?,
                    import_name: row.get(1)?,
                    resolved_path: row.get(2)?,
                })
            })
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT f.path, f.relative_path FROM imports i \
                 JOIN files f ON i.from_file_id = f.id \
                 WHERE i.to_file_id = ?1 ORDER BY f.relative_path",
            )
            .map_err(storage_err)?;
        let imported_by = stmt
            .query_map([file_id], |row| {
                Ok(ImportedBy {
                    path: row.get(0)?,
                    relative_path: row.get(1)?,
                })
            })
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;

        Ok(FileImports {
            imports,
            imported_by,
        })
    }

    // ── Class hierarchy ─────────────────────────────────────────────────

    /// Ancestors and descendants of a class, each bounded by the hierarchy
    /// depth cap. Unknown classes yield an empty hierarchy.
    pub fn get_class_hierarchy(&self, class_name: &str) -> Result<ClassHierarchy, LibrarianError> {
        let conn = self.conn();
        let root: Option<(i64, String, String, String)> = conn
            .query_row(
                "SELECT s.id, s.name, s.qualified_name, f.relative_path \
                 FROM symbols s JOIN files f ON s.file_id = f.id \
                 WHERE (s.name = ?1 OR s.qualified_name = ?1) AND s.kind = 'class' \
                 ORDER BY length(s.qualified_name) LIMIT 1",
                [class_name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(storage_err)?;

        let Some((class_id, name, qualified_name, relative_path)) = root else {
            return Ok(ClassHierarchy {
                class: None,
                parents: Vec::new(),
                children: Vec::new(),
            });
        };

        let parents = hierarchy_walk(&conn, class_id, true)?;
        let children = hierarchy_walk(&conn, class_id, false)?;

        Ok(ClassHierarchy {
            class: Some(ClassInfo {
                name,
                qualified_name,
                relative_path,
            }),
            parents,
            children,
        })
    }
}

fn hierarchy_walk(
    conn: &Connection,
    class_id: i64,
    ancestors: bool,
) -> Result<Vec<ClassInfo>, LibrarianError> {
    let (seed, step) = if ancestors {
        (
            "SELECT i.parent_id, 1 FROM inherits i \
             WHERE i.child_id = ?1 AND i.parent_id IS NOT NULL",
            "SELECT i2.parent_id, t.depth + 1 FROM inherits i2 \
             JOIN tree t ON i2.child_id = t.id \
             WHERE t.depth < ?2 AND i2.parent_id IS NOT NULL",
        )
    } else {
        (
            "SELECT i.child_id, 1 FROM inherits i \
             WHERE i.parent_id = ?1",
            "SELECT i2.child_id, t.depth + 1 FROM inherits i2 \
             JOIN tree t ON i2.parent_id = t.id \
             WHERE t.depth < ?2",
        )
    };
    let sql = format!(
        "WITH RECURSIVE tree(id, depth) AS ({seed} UNION {step}) \
         SELECT DISTINCT s.name, s.qualified_name, f.relative_path \
         FROM tree t \
         JOIN symbols s ON t.id = s.id \
         JOIN files f ON s.file_id = f.id \
         ORDER BY s.qualified_name"
    );
    let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
    let rows = stmt
        .query_map(params![class_id, HIERARCHY_DEPTH], |row| {
            Ok(ClassInfo {
                name: row.get(0)?,
                qualified_name: row.get(1)?,
                relative_path: row.get(2)?,
            })
        })
        .map_err(storage_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_err)?;
    Ok(rows)
}

// ── Resolution passes ───────────────────────────────────────────────────────

/// Resolve a target name to a symbol id: exact qualified name, then exact
/// simple name, then the suffix after the last `.`/`::` for dotted calls
/// like `self.store.upsert_file`. Ties prefer the referencing file, then
/// the lowest id.
fn resolve_symbol(
    conn: &Connection,
    target: &str,
    from_file_id: i64,
    class_only: bool,
) -> Result<Option<i64>, LibrarianError> {
    let kind_clause = if class_only { "AND kind = 'class'" } else { "" };
    let by_qualified = format!(
        "SELECT id FROM symbols WHERE qualified_name = ?1 {kind_clause} \
         ORDER BY (file_id = ?2) DESC, id LIMIT 1"
    );
    let by_name = format!(
        "SELECT id FROM symbols WHERE name = ?1 {kind_clause} \
         ORDER BY (file_id = ?2) DESC, id LIMIT 1"
    );

    let lookup = |sql: &str, value: &str| -> Result<Option<i64>, LibrarianError> {
        conn.query_row(sql, params![value, from_file_id], |row| row.get(0))
            .optional()
            .map_err(storage_err)
    };

    if let Some(id) = lookup(&by_qualified, target)? {
        return Ok(Some(id));
    }
    if let Some(id) = lookup(&by_name, target)? {
        return Ok(Some(id));
    }

    let suffix = target
        .rsplit("::")
        .next()
        .and_then(|s| s.rsplit('.').next())
        .unwrap_or(target);
    if suffix != target {
        if let Some(id) = lookup(&by_name, suffix)? {
            return Ok(Some(id));
        }
    }

    Ok(None)
}

fn resolve_calls(conn: &Connection) -> Result<(), LibrarianError> {
    let mut stmt = conn
        .prepare(
            "SELECT c.caller_id, c.callee_name, c.line, s.file_id \
             FROM calls c JOIN symbols s ON c.caller_id = s.id \
             WHERE c.callee_id IS NULL",
        )
        .map_err(storage_err)?;
    let pending = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })
        .map_err(storage_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_err)?;
    drop(stmt);

    for (caller_id, callee_name, line, file_id) in pending {
        if let Some(target) = resolve_symbol(conn, &callee_name, file_id, false)? {
            conn.execute(
                "UPDATE calls SET callee_id = ?1 \
                 WHERE caller_id = ?2 AND callee_name = ?3 AND line = ?4",
                params![target, caller_id, callee_name, line],
            )
            .map_err(storage_err)?;
        }
    }
    Ok(())
}

fn resolve_inherits(conn: &Connection) -> Result<(), LibrarianError> {
    let mut stmt = conn
        .prepare(
            "SELECT i.child_id, i.parent_name, s.file_id \
             FROM inherits i JOIN symbols s ON i.child_id = s.id \
             WHERE i.parent_id IS NULL",
        )
        .map_err(storage_err)?;
    let pending = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .map_err(storage_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_err)?;
    drop(stmt);

    for (child_id, parent_name, file_id) in pending {
        if let Some(target) = resolve_symbol(conn, &parent_name, file_id, true)? {
            conn.execute(
                "UPDATE inherits SET parent_id = ?1 \
                 WHERE child_id = ?2 AND parent_name = ?3",
                params![target, child_id, parent_name],
            )
            .map_err(storage_err)?;
        }
    }
    Ok(())
}

fn resolve_imports(conn: &Connection) -> Result<(), LibrarianError> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT from_file_id, to_module FROM imports \
             WHERE to_file_id IS NULL",
        )
        .map_err(storage_err)?;
    let pending = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(storage_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_err)?;
    drop(stmt);

    for (from_file_id, to_module) in pending {
        let fragment = module_path_fragment(&to_module);
        if fragment.is_empty() {
            continue;
        }
        let target: Option<i64> = conn
            .query_row(
                "SELECT id FROM files WHERE relative_path LIKE '%' || ?1 || '%' \
                 ORDER BY length(relative_path) LIMIT 1",
                [&fragment],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        if let Some(target) = target {
            conn.execute(
                "UPDATE imports SET to_file_id = ?1 \
                 WHERE from_file_id = ?2 AND to_module = ?3",
                params![target, from_file_id, to_module],
            )
            .map_err(storage_err)?;
        }
    }
    Ok(())
}

/// Turn a module string as written (`pkg.mod`, `crate::foo`, `./models`)
/// into a slash-separated path fragment for matching relative paths.
fn module_path_fragment(module: &str) -> String {
    let mut trimmed = module.trim();
    while let Some(rest) = trimmed.strip_prefix("./").or_else(|| trimmed.strip_prefix("../")) {
        trimmed = rest;
    }
    trimmed.replace("::", "/").replace('.', "/")
}
