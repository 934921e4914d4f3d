//! Full-text and vector search primitives.

use crate::{storage_err, Store, EMBED_BATCH_CEILING};
use codelibrarian_core::LibrarianError;

impl Store {
    // ── Full-text search ────────────────────────────────────────────────

    /// Run an FTS5 query. Returns `(symbol_id, score)` pairs, best first.
    ///
    /// bm25() returns negative values (more negative = better), so the
    /// score is negated. Queries the FTS engine rejects (unbalanced quotes,
    /// bare operators) yield an empty result instead of an error.
    pub fn fts_search(&self, query: &str, limit: usize) -> Result<Vec<(i64, f64)>, LibrarianError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT rowid, bm25(symbols_fts) AS score \
                 FROM symbols_fts WHERE symbols_fts MATCH ?1 \
                 ORDER BY score LIMIT ?2",
            )
            .map_err(storage_err)?;

        let rows = match stmt.query_map(
            rusqlite::params![query, limit as i64],
            |row| Ok((row.get::<_, i64>(0)?, -row.get::<_, f64>(1)?)),
        ) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::debug!("FTS query rejected: {e}");
                return Ok(Vec::new());
            }
        };

        let mut hits = Vec::new();
        for row in rows {
            match row {
                Ok(hit) => hits.push(hit),
                Err(e) => {
                    tracing::debug!("FTS query failed mid-scan: {e}");
                    return Ok(Vec::new());
                }
            }
        }
        Ok(hits)
    }

    // ── Embeddings ──────────────────────────────────────────────────────

    /// Store (or replace) the embedding for a symbol.
    pub fn upsert_embedding(
        &self,
        symbol_id: i64,
        embedding: &[f32],
    ) -> Result<(), LibrarianError> {
        let blob: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO symbol_embeddings (symbol_id, embedding) VALUES (?1, ?2)",
            rusqlite::params![symbol_id, blob],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    /// Drop every stored embedding (used by `--reembed`).
    pub fn clear_embeddings(&self) -> Result<usize, LibrarianError> {
        let conn = self.conn();
        conn.execute("DELETE FROM symbol_embeddings", [])
            .map_err(storage_err)
    }

    pub fn embedding_count(&self) -> Result<usize, LibrarianError> {
        let conn = self.conn();
        conn.query_row("SELECT COUNT(*) FROM symbol_embeddings", [], |row| {
            row.get(0)
        })
        .map_err(storage_err)
    }

    /// Symbols lacking an embedding, as `(id, qualified_name, signature,
    /// docstring)` rows, up to the batch ceiling.
    pub fn symbols_without_embeddings(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<(i64, String, String, String)>, LibrarianError> {
        let limit = limit.map(|l| l as i64).unwrap_or(EMBED_BATCH_CEILING);
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT s.id, s.qualified_name, COALESCE(s.signature, ''), \
                        COALESCE(s.docstring, '') \
                 FROM symbols s \
                 LEFT JOIN symbol_embeddings e ON s.id = e.symbol_id \
                 WHERE e.symbol_id IS NULL \
                 ORDER BY s.id LIMIT ?1",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([limit], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// Nearest-neighbour scan over stored embeddings. Returns
    /// `(symbol_id, cosine_distance)` pairs, nearest first. Rows whose
    /// width doesn't match the query are skipped.
    pub fn vector_search(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<(i64, f64)>, LibrarianError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let query_norm = norm(query);
        if query_norm == 0.0 {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT symbol_id, embedding FROM symbol_embeddings")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(storage_err)?;

        let mut scored: Vec<(i64, f64)> = Vec::new();
        for row in rows {
            let (id, blob) = row.map_err(storage_err)?;
            let stored = decode_embedding(&blob);
            if stored.len() != query.len() {
                continue;
            }
            let stored_norm = norm(&stored);
            if stored_norm == 0.0 {
                continue;
            }
            let dot: f32 = query.iter().zip(&stored).map(|(a, b)| a * b).sum();
            let cosine = f64::from(dot) / (f64::from(query_norm) * f64::from(stored_norm));
            scored.push((id, 1.0 - cosine));
        }

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::test_fixtures::animal_fixture;
    use crate::Store;

    #[test]
    fn fts_finds_docstring_terms() {
        let store = Store::open_in_memory(4).unwrap();
        animal_fixture(&store);

        let hits = store.fts_search("oldest animal", 10).unwrap();
        assert!(!hits.is_empty());
        let best = store.get_symbol_by_id(hits[0].0).unwrap().unwrap();
        assert!(
            best.qualified_name.contains("find_oldest")
                || best.qualified_name.contains("Animal"),
            "unexpected best hit: {}",
            best.qualified_name
        );
        // Scores are positive, best first
        assert!(hits[0].1 > 0.0);
        for pair in hits.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn fts_indexes_file_path() {
        let store = Store::open_in_memory(4).unwrap();
        animal_fixture(&store);
        let hits = store.fts_search("services", 10).unwrap();
        assert!(!hits.is_empty());
    }

    #[test]
    fn fts_empty_query_returns_empty() {
        let store = Store::open_in_memory(4).unwrap();
        animal_fixture(&store);
        assert!(store.fts_search("", 10).unwrap().is_empty());
        assert!(store.fts_search("   ", 10).unwrap().is_empty());
    }

    #[test]
    fn fts_reserved_characters_do_not_error() {
        let store = Store::open_in_memory(4).unwrap();
        animal_fixture(&store);
        // Raw operators that FTS5 rejects must come back empty, not Err.
        assert!(store.fts_search("\"", 10).unwrap().is_empty());
        assert!(store.fts_search("((", 10).unwrap().is_empty());
        assert!(store.fts_search("*", 10).unwrap().is_empty());
    }

    #[test]
    fn vector_search_orders_by_distance() {
        let store = Store::open_in_memory(4).unwrap();
        let known = animal_fixture(&store);

        store
            .upsert_embedding(known["models.Dog.fetch"], &[1.0, 0.0, 0.0, 0.0])
            .unwrap();
        store
            .upsert_embedding(known["models.find_oldest"], &[0.0, 1.0, 0.0, 0.0])
            .unwrap();

        let hits = store.vector_search(&[1.0, 0.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, known["models.Dog.fetch"]);
        assert!(hits[0].1 < 1e-6);
        assert!((hits[1].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn vector_search_skips_mismatched_dimensions() {
        let store = Store::open_in_memory(4).unwrap();
        let known = animal_fixture(&store);

        store
            .upsert_embedding(known["models.Dog.fetch"], &[1.0, 0.0])
            .unwrap();
        let hits = store.vector_search(&[1.0, 0.0, 0.0, 0.0], 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn vector_search_degenerate_query_returns_empty() {
        let store = Store::open_in_memory(4).unwrap();
        let known = animal_fixture(&store);
        store
            .upsert_embedding(known["models.Dog.fetch"], &[1.0, 0.0, 0.0, 0.0])
            .unwrap();

        assert!(store.vector_search(&[], 10).unwrap().is_empty());
        assert!(store
            .vector_search(&[0.0, 0.0, 0.0, 0.0], 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unembedded_symbols_shrink_as_embeddings_land() {
        let store = Store::open_in_memory(4).unwrap();
        let known = animal_fixture(&store);

        let pending = store.symbols_without_embeddings(None).unwrap();
        assert_eq!(pending.len(), 8);
        let (_, qname, _, doc) = pending
            .iter()
            .find(|(id, _, _, _)| *id == known["models.find_oldest"])
            .unwrap()
            .clone();
        assert_eq!(qname, "models.find_oldest");
        assert!(doc.contains("oldest"));

        store
            .upsert_embedding(known["models.find_oldest"], &[0.1, 0.2, 0.3, 0.4])
            .unwrap();
        assert_eq!(store.symbols_without_embeddings(None).unwrap().len(), 7);
        assert_eq!(store.embedding_count().unwrap(), 1);

        assert_eq!(store.clear_embeddings().unwrap(), 1);
        assert_eq!(store.symbols_without_embeddings(None).unwrap().len(), 8);
    }

    #[test]
    fn symbol_without_embedding_never_in_vector_results() {
        let store = Store::open_in_memory(4).unwrap();
        let known = animal_fixture(&store);
        store
            .upsert_embedding(known["models.Dog.fetch"], &[1.0, 0.0, 0.0, 0.0])
            .unwrap();

        let hits = store.vector_search(&[1.0, 1.0, 1.0, 1.0], 10).unwrap();
        assert!(hits.iter().all(|(id, _)| *id == known["models.Dog.fetch"]));
        // The unembedded symbol still shows up in FTS and lookup.
        assert!(!store.fts_search("find_oldest", 10).unwrap().is_empty());
        assert!(!store.lookup_symbol("find_oldest").unwrap().is_empty());
    }
}
