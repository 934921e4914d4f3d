//! The incremental indexer: per-file parse + store, edge resolution, and
//! the embedding pass.

use crate::discovery::discover_files;
use codelibrarian_core::{truncate_chars, Config, LibrarianError};
use codelibrarian_embeddings::EmbeddingClient;
use codelibrarian_parsers::{derive_module_name, CodeParser};
use codelibrarian_store::{FileUpsert, Store};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Counters for one index pass.
#[derive(Debug, Default)]
pub struct IndexStats {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub symbols_added: usize,
    pub embeddings_added: usize,
    pub errors: Vec<String>,
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scanned: {}, Indexed: {}, Skipped (unchanged): {}, Symbols: {}, Embeddings: {}",
            self.files_scanned,
            self.files_indexed,
            self.files_skipped,
            self.symbols_added,
            self.embeddings_added,
        )
    }
}

/// Orchestrates one pass: discovery, per-file parse + store, edge
/// resolution, embeddings.
pub struct Indexer<'a> {
    store: &'a Store,
    config: &'a Config,
    embedder: Option<&'a EmbeddingClient>,
    parser: CodeParser,
}

impl<'a> Indexer<'a> {
    pub fn new(store: &'a Store, config: &'a Config, embedder: Option<&'a EmbeddingClient>) -> Self {
        Self {
            store,
            config,
            embedder,
            parser: CodeParser::new(),
        }
    }

    /// Index the whole project root.
    ///
    /// Incremental by default: unchanged files (by content hash) are
    /// skipped. `full` re-parses everything and deletes files that have
    /// vanished from disk. `reembed` wipes stored embeddings first.
    pub fn index_root(&self, full: bool, reembed: bool) -> Result<IndexStats, LibrarianError> {
        let files = discover_files(self.config)?;
        self.run(files, full, reembed, full)
    }

    /// Index a specific list of files (e.g. from a git hook).
    pub fn index_files(
        &self,
        paths: &[PathBuf],
        full: bool,
    ) -> Result<IndexStats, LibrarianError> {
        let mut files = Vec::new();
        for path in paths {
            if !path.exists() {
                continue;
            }
            if let Some(language) = self.config.language_for_file(path) {
                files.push((path.clone(), language.to_string()));
            }
        }
        self.run(files, full, false, false)
    }

    fn run(
        &self,
        files: Vec<(PathBuf, String)>,
        full: bool,
        reembed: bool,
        delete_vanished: bool,
    ) -> Result<IndexStats, LibrarianError> {
        let mut stats = IndexStats {
            files_scanned: files.len(),
            ..Default::default()
        };
        let root = self.config.index_root();

        // qualified_name -> symbol id across the whole pass, so edges in
        // one file can reference symbols written earlier in the pass.
        let mut known: HashMap<String, i64> = HashMap::new();

        for (path, language) in &files {
            match self.index_single_file(path, language, &root, full, &mut known) {
                Ok(None) => stats.files_skipped += 1,
                Ok(Some(symbols)) => {
                    stats.files_indexed += 1;
                    stats.symbols_added += symbols;
                }
                Err(err) => {
                    tracing::warn!("Failed to index {}: {err}", path.display());
                    stats.errors.push(format!("{}: {err}", path.display()));
                }
            }
        }

        if delete_vanished {
            self.delete_vanished_files(&files)?;
        }

        self.store.resolve_graph_edges()?;

        if self.config.embeddings.enabled {
            if let Some(embedder) = self.embedder {
                if reembed {
                    self.store.clear_embeddings()?;
                }
                stats.embeddings_added = self.embed_pending(embedder)?;
            }
        }

        tracing::info!("Index pass complete: {stats}");
        Ok(stats)
    }

    /// Index one file. Returns the number of symbols written, or None when
    /// the file was skipped (unchanged or unreadable).
    fn index_single_file(
        &self,
        path: &Path,
        language: &str,
        root: &Path,
        full: bool,
        known: &mut HashMap<String, i64>,
    ) -> Result<Option<usize>, LibrarianError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!("Failed to read {}: {err}", path.display());
                return Ok(None);
            }
        };

        let content_hash = file_hash(&bytes);
        let path_str = path.to_string_lossy().into_owned();

        if !full && self.store.get_file_hash(&path_str)?.as_deref() == Some(&content_hash) {
            return Ok(None);
        }

        let module_name = derive_module_name(path, root);
        let parsed = self.parser.parse(language, &bytes, &module_name);

        let relative_path = path
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path_str.clone())
            });
        let last_modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let upsert = FileUpsert {
            path: path_str,
            relative_path,
            language: Some(language.to_string()),
            last_modified,
            content_hash,
        };
        let outcome = self.store.write_file_index(&upsert, &parsed, known)?;
        Ok(Some(outcome.symbols_added))
    }

    /// Full-mode cleanup: drop store rows for files no longer on disk.
    fn delete_vanished_files(
        &self,
        discovered: &[(PathBuf, String)],
    ) -> Result<(), LibrarianError> {
        let on_disk: HashSet<&Path> = discovered.iter().map(|(p, _)| p.as_path()).collect();
        for file in self.store.list_files()? {
            let path = PathBuf::from(&file.path);
            if !on_disk.contains(path.as_path()) && !path.exists() {
                tracing::info!("Removing vanished file {}", file.path);
                self.store.delete_file(&file.path)?;
            }
        }
        Ok(())
    }

    /// Embed symbols lacking vectors, in config-sized batches. Any service
    /// failure aborts the phase; the pass itself still succeeds.
    fn embed_pending(&self, embedder: &EmbeddingClient) -> Result<usize, LibrarianError> {
        let batch_size = self.config.embeddings.batch_size.max(1);
        let max_chars = self.config.embeddings.max_chars;
        let dimensions = self.store.embedding_dimensions();
        let mut count = 0usize;

        loop {
            let pending = self
                .store
                .symbols_without_embeddings(Some(batch_size * 4))?;
            if pending.is_empty() {
                break;
            }

            for chunk in pending.chunks(batch_size) {
                let texts: Vec<String> = chunk
                    .iter()
                    .map(|(_, qname, signature, docstring)| {
                        embedding_text(qname, signature, docstring, max_chars)
                    })
                    .collect();

                let vectors = match embedder.embed_batch(&texts) {
                    Ok(vectors) => vectors,
                    Err(err) => {
                        tracing::warn!("Embedding pass aborted: {err}");
                        return Ok(count);
                    }
                };
                if vectors.len() != chunk.len() {
                    tracing::warn!(
                        "Embedding pass aborted: got {} vectors for {} inputs",
                        vectors.len(),
                        chunk.len()
                    );
                    return Ok(count);
                }

                for ((symbol_id, _, _, _), vector) in chunk.iter().zip(vectors) {
                    if vector.len() != dimensions {
                        tracing::warn!(
                            "Embedding pass aborted: dimension mismatch ({} != {dimensions})",
                            vector.len()
                        );
                        return Ok(count);
                    }
                    self.store.upsert_embedding(*symbol_id, &vector)?;
                    count += 1;
                }
            }
        }

        Ok(count)
    }
}

fn embedding_text(qname: &str, signature: &str, docstring: &str, max_chars: usize) -> String {
    let mut text = format!("{qname}\n{signature}");
    if !docstring.is_empty() {
        text.push('\n');
        text.push_str(docstring);
    }
    truncate_chars(&text, max_chars)
}

fn file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
