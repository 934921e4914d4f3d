//! File and symbol CRUD, plus the transactional per-file write path.

use crate::{storage_err, symbol_from_row, Store, LIST_LIMIT, LOOKUP_LIMIT, SYMBOL_COLUMNS};
use codelibrarian_core::{FileRecord, LibrarianError, ParseResult, Symbol, SymbolRecord};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

/// Everything needed to upsert one file row.
#[derive(Debug, Clone)]
pub struct FileUpsert {
    pub path: String,
    pub relative_path: String,
    pub language: Option<String>,
    pub last_modified: f64,
    pub content_hash: String,
}

/// Result of writing one file's parse output.
#[derive(Debug, Clone, Copy)]
pub struct FileWriteOutcome {
    pub file_id: i64,
    pub symbols_added: usize,
}

impl Store {
    // ── Files ───────────────────────────────────────────────────────────

    /// Stored content hash for a path, if the file is known.
    pub fn get_file_hash(&self, path: &str) -> Result<Option<String>, LibrarianError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT content_hash FROM files WHERE path = ?1",
            [path],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err)
    }

    /// Insert or update a file row. Returns `(id, unchanged)`, where
    /// `unchanged` means the stored hash already matched.
    pub fn upsert_file(&self, file: &FileUpsert) -> Result<(i64, bool), LibrarianError> {
        let conn = self.conn();
        upsert_file_tx(&conn, file)
    }

    pub fn get_file_id(&self, path: &str) -> Result<Option<i64>, LibrarianError> {
        let conn = self.conn();
        conn.query_row("SELECT id FROM files WHERE path = ?1", [path], |row| {
            row.get(0)
        })
        .optional()
        .map_err(storage_err)
    }

    pub fn list_files(&self) -> Result<Vec<FileRecord>, LibrarianError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, path, relative_path, language, last_modified, content_hash \
                 FROM files ORDER BY relative_path",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FileRecord {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    relative_path: row.get(2)?,
                    language: row.get(3)?,
                    last_modified: row.get(4)?,
                    content_hash: row.get(5)?,
                })
            })
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// Delete a file row and everything it owns. Inbound call/inherit
    /// references into the file are nulled, not removed. Returns true if a
    /// row was deleted.
    pub fn delete_file(&self, path: &str) -> Result<bool, LibrarianError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction().map_err(storage_err)?;
        let file_id: Option<i64> = tx
            .query_row("SELECT id FROM files WHERE path = ?1", [path], |row| {
                row.get(0)
            })
            .optional()
            .map_err(storage_err)?;
        let Some(file_id) = file_id else {
            return Ok(false);
        };
        delete_file_symbols_tx(&tx, file_id)?;
        // Inbound imports keep their rows but lose the resolution; they
        // re-resolve if the file comes back.
        tx.execute(
            "UPDATE imports SET to_file_id = NULL WHERE to_file_id = ?1",
            [file_id],
        )
        .map_err(storage_err)?;
        tx.execute("DELETE FROM files WHERE id = ?1", [file_id])
            .map_err(storage_err)?;
        tx.commit().map_err(storage_err)?;
        Ok(true)
    }

    // ── Per-file write path ─────────────────────────────────────────────

    /// Write one file's parse output atomically: upsert the file row, drop
    /// its previous symbols and outbound edges, insert the new population.
    ///
    /// `known` maps qualified names to symbol ids across the whole pass so
    /// edge endpoints in other files resolve to caller/child ids.
    pub fn write_file_index(
        &self,
        file: &FileUpsert,
        parsed: &ParseResult,
        known: &mut HashMap<String, i64>,
    ) -> Result<FileWriteOutcome, LibrarianError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction().map_err(storage_err)?;

        let (file_id, _) = upsert_file_tx(&tx, file)?;
        delete_file_symbols_tx(&tx, file_id)?;

        // Parents appear before their children in parse order, so each
        // child's parent qualified name is already in the map by the time
        // it is inserted.
        let mut file_ids: HashMap<String, i64> = HashMap::new();
        let mut symbols_added = 0usize;
        for sym in &parsed.symbols {
            let parent_id = sym.parent_qualified_name.as_ref().and_then(|qn| {
                file_ids.get(qn).or_else(|| known.get(qn)).copied()
            });
            let sym_id = insert_symbol_tx(&tx, sym, file_id, parent_id)?;
            file_ids.insert(sym.qualified_name.clone(), sym_id);
            known.insert(sym.qualified_name.clone(), sym_id);
            symbols_added += 1;
        }

        for import in &parsed.edges.imports {
            tx.execute(
                "INSERT OR IGNORE INTO imports (from_file_id, to_module, import_name) \
                 VALUES (?1, ?2, ?3)",
                params![file_id, import.module, import.name.as_deref().unwrap_or("")],
            )
            .map_err(storage_err)?;
        }

        for call in &parsed.edges.calls {
            let caller_id = file_ids.get(&call.caller).or_else(|| known.get(&call.caller));
            if let Some(&caller_id) = caller_id {
                tx.execute(
                    "INSERT OR IGNORE INTO calls (caller_id, callee_name, line) \
                     VALUES (?1, ?2, ?3)",
                    params![caller_id, call.callee, call.line],
                )
                .map_err(storage_err)?;
            }
        }

        for inherit in &parsed.edges.inherits {
            let child_id = file_ids
                .get(&inherit.child)
                .or_else(|| known.get(&inherit.child));
            if let Some(&child_id) = child_id {
                tx.execute(
                    "INSERT OR IGNORE INTO inherits (child_id, parent_name) VALUES (?1, ?2)",
                    params![child_id, inherit.parent],
                )
                .map_err(storage_err)?;
            }
        }

        tx.commit().map_err(storage_err)?;
        Ok(FileWriteOutcome {
            file_id,
            symbols_added,
        })
    }

    // ── Symbol lookups ──────────────────────────────────────────────────

    pub fn get_symbol_by_id(&self, symbol_id: i64) -> Result<Option<SymbolRecord>, LibrarianError> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {SYMBOL_COLUMNS} FROM symbols s JOIN files f ON s.file_id = f.id \
                 WHERE s.id = ?1"
            ),
            [symbol_id],
            symbol_from_row,
        )
        .optional()
        .map_err(storage_err)
    }

    pub fn get_symbol_by_qualified_name(
        &self,
        qualified_name: &str,
    ) -> Result<Option<SymbolRecord>, LibrarianError> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {SYMBOL_COLUMNS} FROM symbols s JOIN files f ON s.file_id = f.id \
                 WHERE s.qualified_name = ?1 LIMIT 1"
            ),
            [qualified_name],
            symbol_from_row,
        )
        .optional()
        .map_err(storage_err)
    }

    /// Exact match on simple or qualified name, shortest qualified name
    /// first.
    pub fn lookup_symbol(&self, name: &str) -> Result<Vec<SymbolRecord>, LibrarianError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SYMBOL_COLUMNS} FROM symbols s JOIN files f ON s.file_id = f.id \
                 WHERE s.name = ?1 OR s.qualified_name = ?1 \
                 ORDER BY length(s.qualified_name) LIMIT ?2"
            ))
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![name, LOOKUP_LIMIT], symbol_from_row)
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// Prefix/substring fallback used when the exact lookup is empty.
    pub fn lookup_symbol_prefix(&self, name: &str) -> Result<Vec<SymbolRecord>, LibrarianError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SYMBOL_COLUMNS} FROM symbols s JOIN files f ON s.file_id = f.id \
                 WHERE s.name LIKE ?1 OR s.qualified_name LIKE ?2 \
                 ORDER BY length(s.qualified_name) LIMIT ?3"
            ))
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(
                params![format!("{name}%"), format!("%{name}%"), LOOKUP_LIMIT],
                symbol_from_row,
            )
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// List symbols with optional kind / name-pattern / file filters.
    pub fn list_symbols(
        &self,
        kind: Option<&str>,
        pattern: Option<&str>,
        file_path: Option<&str>,
    ) -> Result<Vec<SymbolRecord>, LibrarianError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(kind) = kind {
            values.push(Box::new(kind.to_string()));
            conditions.push(format!("s.kind = ?{}", values.len()));
        }
        if let Some(pattern) = pattern {
            values.push(Box::new(pattern.to_string()));
            conditions.push(format!("s.name LIKE ?{}", values.len()));
        }
        if let Some(file_path) = file_path {
            values.push(Box::new(file_path.to_string()));
            conditions.push(format!(
                "(f.path = ?{n} OR f.relative_path = ?{n})",
                n = values.len()
            ));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        values.push(Box::new(LIST_LIMIT));
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols s JOIN files f ON s.file_id = f.id \
             {where_clause} ORDER BY s.qualified_name LIMIT ?{}",
            values.len()
        );

        let conn = self.conn();
        let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(refs.as_slice(), symbol_from_row)
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// All methods whose parent symbol has the given qualified name.
    pub fn get_methods_for_class(
        &self,
        class_qualified_name: &str,
    ) -> Result<Vec<SymbolRecord>, LibrarianError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SYMBOL_COLUMNS} FROM symbols s \
                 JOIN files f ON s.file_id = f.id \
                 JOIN symbols parent ON s.parent_id = parent.id \
                 WHERE parent.qualified_name = ?1 AND s.kind = 'method' \
                 ORDER BY s.name"
            ))
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([class_qualified_name], symbol_from_row)
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// A sample of symbol names for the rewriter vocabulary prompt.
    pub fn symbol_name_sample(&self, limit: usize) -> Result<Vec<String>, LibrarianError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT DISTINCT name FROM symbols ORDER BY name LIMIT ?1")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([limit as i64], |row| row.get(0))
            .map_err(storage_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }
}

fn upsert_file_tx(conn: &Connection, file: &FileUpsert) -> Result<(i64, bool), LibrarianError> {
    let existing: Option<(i64, Option<String>)> = conn
        .query_row(
            "SELECT id, content_hash FROM files WHERE path = ?1",
            [&file.path],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(storage_err)?;

    if let Some((id, hash)) = existing {
        if hash.as_deref() == Some(file.content_hash.as_str()) {
            return Ok((id, true));
        }
        conn.execute(
            "UPDATE files SET relative_path = ?1, language = ?2, last_modified = ?3, \
             content_hash = ?4 WHERE id = ?5",
            params![
                file.relative_path,
                file.language,
                file.last_modified,
                file.content_hash,
                id
            ],
        )
        .map_err(storage_err)?;
        return Ok((id, false));
    }

    conn.execute(
        "INSERT INTO files (path, relative_path, language, last_modified, content_hash) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            file.path,
            file.relative_path,
            file.language,
            file.last_modified,
            file.content_hash
        ],
    )
    .map_err(storage_err)?;
    Ok((conn.last_insert_rowid(), false))
}

/// Remove a file's symbols and outbound edges. Resolved references from
/// other files into this file are nulled so the symbol deletes don't
/// violate foreign keys; they re-resolve if the names return.
fn delete_file_symbols_tx(conn: &Connection, file_id: i64) -> Result<(), LibrarianError> {
    conn.execute("DELETE FROM imports WHERE from_file_id = ?1", [file_id])
        .map_err(storage_err)?;
    conn.execute(
        "UPDATE calls SET callee_id = NULL WHERE callee_id IN \
         (SELECT id FROM symbols WHERE file_id = ?1)",
        [file_id],
    )
    .map_err(storage_err)?;
    conn.execute(
        "UPDATE inherits SET parent_id = NULL WHERE parent_id IN \
         (SELECT id FROM symbols WHERE file_id = ?1)",
        [file_id],
    )
    .map_err(storage_err)?;
    // Children first: the self-referencing parent_id column would otherwise
    // block the delete.
    conn.execute(
        "DELETE FROM symbols WHERE file_id = ?1 AND parent_id IS NOT NULL",
        [file_id],
    )
    .map_err(storage_err)?;
    conn.execute("DELETE FROM symbols WHERE file_id = ?1", [file_id])
        .map_err(storage_err)?;
    Ok(())
}

fn insert_symbol_tx(
    conn: &Connection,
    sym: &Symbol,
    file_id: i64,
    parent_id: Option<i64>,
) -> Result<i64, LibrarianError> {
    conn.execute(
        "INSERT INTO symbols \
         (file_id, name, qualified_name, kind, line_start, line_end, \
          signature, docstring, parameters, return_type, decorators, parent_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            file_id,
            sym.name,
            sym.qualified_name,
            sym.kind.to_string(),
            sym.line_start,
            sym.line_end,
            sym.signature,
            sym.docstring,
            sym.parameters_json(),
            sym.return_type,
            sym.decorators_json(),
            parent_id
        ],
    )
    .map_err(storage_err)?;
    Ok(conn.last_insert_rowid())
}
