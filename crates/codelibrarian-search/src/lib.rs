//! codelibrarian-search: the hybrid search engine.
//!
//! Routes graph-intent queries to graph traversal, fuses FTS and vector
//! hits for everything else, and optionally consults an LLM rewriter for
//! natural-language queries.

mod intent;

pub use intent::{classify, GraphIntent};

use codelibrarian_core::{
    Focus, LibrarianError, MatchType, RewrittenQuery, SearchResult, SymbolRecord,
};
use codelibrarian_embeddings::{EmbeddingClient, QueryRewriter};
use codelibrarian_store::{ClassHierarchy, FileImports, Store};
use std::collections::HashMap;
use std::path::Path;

/// Raw BM25 scores rarely exceed this for short documents; dividing by it
/// brings typical values into [0, 1].
const BM25_SCALE: f64 = 10.0;

/// How many symbol names are offered to the rewriter as vocabulary.
const REWRITE_VOCABULARY_SIZE: usize = 50;

/// Score multiplier applied against the focus bias.
const FOCUS_MULTIPLIER: f64 = 0.5;

const QUESTION_WORDS: &[&str] = &[
    "how", "what", "where", "why", "when", "which", "who", "does", "is", "are", "can", "do",
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "of", "in", "on", "to", "for", "and", "or", "is", "are", "do", "does",
    "it", "this", "that", "with", "by", "from", "i", "we", "you", "my",
];

/// Flags accepted by [`Searcher::search`].
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub limit: usize,
    pub semantic_only: bool,
    pub text_only: bool,
    /// Force a rewriter round-trip even when the heuristic would skip it.
    pub rewrite: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            semantic_only: false,
            text_only: false,
            rewrite: false,
        }
    }
}

/// All query types over the indexed codebase.
pub struct Searcher<'a> {
    store: &'a Store,
    embedder: Option<&'a EmbeddingClient>,
    rewriter: Option<&'a QueryRewriter>,
}

impl<'a> Searcher<'a> {
    pub fn new(
        store: &'a Store,
        embedder: Option<&'a EmbeddingClient>,
        rewriter: Option<&'a QueryRewriter>,
    ) -> Self {
        Self {
            store,
            embedder,
            rewriter,
        }
    }

    // ── Hybrid search (primary entry point) ─────────────────────────────

    pub fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, LibrarianError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(intent) = intent::classify(query) {
            return self.graph_results(&intent, options.limit);
        }

        let mut scored = self.hybrid(query, options, false)?;
        let mut rewriter_consulted = false;

        if self.rewriter.is_some() && (options.rewrite || should_rewrite(query)) {
            rewriter_consulted = true;
            if let Some(rewritten) = self.consult_rewriter(query) {
                scored = self.merge_rewritten(scored, &rewritten, options)?;
            }
        }

        if scored.is_empty() && self.rewriter.is_some() && !rewriter_consulted {
            if let Some(rewritten) = self.consult_rewriter(query) {
                scored = self.merge_rewritten(scored, &rewritten, options)?;
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(options.limit);
        self.hydrate(scored)
    }

    // ── Symbol lookup ───────────────────────────────────────────────────

    /// Exact lookup by simple or qualified name, falling back to a prefix
    /// scan.
    pub fn lookup_symbol(&self, name: &str) -> Result<Vec<SymbolRecord>, LibrarianError> {
        let exact = self.store.lookup_symbol(name)?;
        if !exact.is_empty() {
            return Ok(exact);
        }
        self.store.lookup_symbol_prefix(name)
    }

    // ── Navigation queries ──────────────────────────────────────────────

    pub fn get_callers(&self, name: &str, depth: u32) -> Result<Vec<SymbolRecord>, LibrarianError> {
        self.store.get_callers(name, depth)
    }

    pub fn get_callees(&self, name: &str, depth: u32) -> Result<Vec<SymbolRecord>, LibrarianError> {
        self.store.get_callees(name, depth)
    }

    pub fn get_file_imports(&self, file_path: &str) -> Result<FileImports, LibrarianError> {
        self.store.get_file_imports(file_path)
    }

    // ── Structural queries ──────────────────────────────────────────────

    pub fn list_symbols(
        &self,
        kind: Option<&str>,
        pattern: Option<&str>,
        file_path: Option<&str>,
    ) -> Result<Vec<SymbolRecord>, LibrarianError> {
        self.store.list_symbols(kind, pattern, file_path)
    }

    pub fn get_class_hierarchy(&self, name: &str) -> Result<ClassHierarchy, LibrarianError> {
        self.store.get_class_hierarchy(name)
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn graph_results(
        &self,
        intent: &GraphIntent,
        limit: usize,
    ) -> Result<Vec<SearchResult>, LibrarianError> {
        let symbols = match intent {
            GraphIntent::Callers(name) => self.store.get_callers(name, 1)?,
            GraphIntent::Callees(name) => self.store.get_callees(name, 1)?,
            GraphIntent::Hierarchy(name) => {
                let hierarchy = self.store.get_class_hierarchy(name)?;
                let mut symbols = Vec::new();
                let qnames = hierarchy
                    .class
                    .iter()
                    .chain(hierarchy.parents.iter())
                    .chain(hierarchy.children.iter())
                    .map(|c| c.qualified_name.clone());
                for qname in qnames {
                    if let Some(record) = self.store.get_symbol_by_qualified_name(&qname)? {
                        symbols.push(record);
                    }
                }
                symbols
            }
        };

        Ok(symbols
            .into_iter()
            .take(limit)
            .map(|symbol| SearchResult {
                symbol,
                score: 1.0,
                match_type: MatchType::Graph,
            })
            .collect())
    }

    /// One FTS + vector round for a query string.
    ///
    /// `prefer_or` skips the AND attempt (used for rewritten term sets,
    /// which are alternatives rather than a phrase).
    fn hybrid(
        &self,
        query: &str,
        options: &SearchOptions,
        prefer_or: bool,
    ) -> Result<Vec<(i64, f64, MatchType)>, LibrarianError> {
        let fetch = options.limit.max(1) * 2;
        let mut fts_hits: HashMap<i64, f64> = HashMap::new();
        let mut vec_hits: HashMap<i64, f64> = HashMap::new();

        if !options.text_only {
            if let Some(embedder) = self.embedder {
                match embedder.embed_one(query) {
                    Ok(vector) => {
                        for (id, distance) in self.store.vector_search(&vector, fetch)? {
                            vec_hits.insert(id, (1.0 - distance / 2.0).max(0.0));
                        }
                    }
                    Err(err) => {
                        tracing::debug!("Query embedding failed, text-only fallback: {err}");
                    }
                }
            }
        }

        if !options.semantic_only {
            let and_query = sanitize_fts_query(query, prefer_or);
            let mut hits = self.store.fts_search(&and_query, fetch)?;
            if hits.is_empty() && !prefer_or {
                let or_query = sanitize_fts_query(query, true);
                if or_query != and_query {
                    hits = self.store.fts_search(&or_query, fetch)?;
                }
            }
            for (id, score) in hits {
                fts_hits.insert(id, (score / BM25_SCALE).clamp(0.0, 1.0));
            }
        }

        let mut scored = Vec::new();
        let all_ids: std::collections::HashSet<i64> =
            fts_hits.keys().chain(vec_hits.keys()).copied().collect();
        for id in all_ids {
            let fts = fts_hits.get(&id).copied().unwrap_or(0.0);
            let vec = vec_hits.get(&id).copied().unwrap_or(0.0);
            let sources = (fts > 0.0) as u32 + (vec > 0.0) as u32;
            if sources == 0 {
                continue;
            }
            let combined = (fts + vec) / f64::from(sources);
            let match_type = if fts > 0.0 && vec > 0.0 {
                MatchType::Hybrid
            } else if fts > 0.0 {
                MatchType::Fulltext
            } else {
                MatchType::Semantic
            };
            scored.push((id, combined, match_type));
        }
        Ok(scored)
    }

    fn consult_rewriter(&self, query: &str) -> Option<RewrittenQuery> {
        let rewriter = self.rewriter?;
        let vocabulary = self
            .store
            .symbol_name_sample(REWRITE_VOCABULARY_SIZE)
            .unwrap_or_default();
        rewriter.rewrite(query, &vocabulary)
    }

    /// Rerun hybrid search with the rewriter's OR-joined terms, keep the
    /// max score per symbol across both rounds, then bias by focus.
    fn merge_rewritten(
        &self,
        original: Vec<(i64, f64, MatchType)>,
        rewritten: &RewrittenQuery,
        options: &SearchOptions,
    ) -> Result<Vec<(i64, f64, MatchType)>, LibrarianError> {
        let term_query = rewritten.terms.join(" ");
        let rewritten_scored = self.hybrid(&term_query, options, true)?;

        let mut merged: HashMap<i64, (f64, MatchType)> = HashMap::new();
        for (id, score, match_type) in original.into_iter().chain(rewritten_scored) {
            let better = merged.get(&id).map_or(true, |(existing, _)| *existing < score);
            if better {
                merged.insert(id, (score, match_type));
            }
        }

        let mut scored = Vec::with_capacity(merged.len());
        for (id, (mut score, match_type)) in merged {
            if rewritten.focus != Focus::All {
                if let Some(record) = self.store.get_symbol_by_id(id)? {
                    let is_test = is_test_path(&record.relative_path);
                    let penalised = match rewritten.focus {
                        Focus::Implementation => is_test,
                        Focus::Tests => !is_test,
                        Focus::All => false,
                    };
                    if penalised {
                        score *= FOCUS_MULTIPLIER;
                    }
                }
            }
            scored.push((id, score, match_type));
        }
        Ok(scored)
    }

    fn hydrate(
        &self,
        scored: Vec<(i64, f64, MatchType)>,
    ) -> Result<Vec<SearchResult>, LibrarianError> {
        let mut results = Vec::with_capacity(scored.len());
        for (id, score, match_type) in scored {
            if let Some(symbol) = self.store.get_symbol_by_id(id)? {
                results.push(SearchResult {
                    symbol,
                    score,
                    match_type,
                });
            }
        }
        Ok(results)
    }
}

// ── Query shaping helpers ───────────────────────────────────────────────────

/// Quote terms containing FTS5-reserved characters; join with implicit AND
/// or explicit OR.
pub fn sanitize_fts_query(query: &str, or_mode: bool) -> String {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter_map(|term| {
            let needs_quoting = term.chars().any(|c| !c.is_alphanumeric() && c != '_');
            if needs_quoting {
                // Terms with no searchable characters at all are dropped.
                if !term.chars().any(char::is_alphanumeric) {
                    return None;
                }
                Some(format!("\"{}\"", term.replace('"', "\"\"")))
            } else {
                Some(term.to_string())
            }
        })
        .collect();

    if or_mode {
        terms.join(" OR ")
    } else {
        terms.join(" ")
    }
}

/// Conservative trigger for the rewriter: a question-shaped query made of
/// prose, with no identifier-like tokens.
pub fn should_rewrite(query: &str) -> bool {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.is_empty() {
        return false;
    }
    if tokens.iter().any(|t| looks_like_identifier(t)) {
        return false;
    }

    let first = tokens[0].to_lowercase();
    let question_shaped = QUESTION_WORDS.contains(&first.as_str()) || query.trim_end().ends_with('?');
    if !question_shaped {
        return false;
    }

    let non_stop = tokens
        .iter()
        .map(|t| t.trim_end_matches('?').to_lowercase())
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(&t.as_str()))
        .count();
    non_stop >= 3
}

fn looks_like_identifier(token: &str) -> bool {
    let token = token.trim_end_matches(['?', ',', '.']);
    if token.contains('_') || token.contains("::") || token.contains('.') || token.contains('(') {
        return true;
    }
    // camelCase / mixedCase
    let chars: Vec<char> = token.chars().collect();
    chars
        .windows(2)
        .any(|w| w[0].is_lowercase() && w[1].is_uppercase())
}

/// Test-file convention used by the focus bias.
pub fn is_test_path(relative_path: &str) -> bool {
    let path = Path::new(relative_path);
    let in_test_dir = path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("test") | Some("tests") | Some("__tests__")
        )
    });
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    in_test_dir
        || file_name.starts_with("test_")
        || file_name.contains("_test.")
        || file_name.contains(".test.")
        || file_name.contains(".spec.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use codelibrarian_core::{
        CallEdge, GraphEdges, InheritEdge, ParseResult, Symbol, SymbolKind,
    };
    use codelibrarian_store::{FileUpsert, Store};
    use std::collections::HashMap as StdHashMap;

    fn symbol(name: &str, qname: &str, kind: SymbolKind, doc: &str) -> Symbol {
        Symbol {
            name: name.to_string(),
            qualified_name: qname.to_string(),
            kind,
            line_start: 1,
            line_end: 2,
            signature: format!("def {name}()"),
            docstring: doc.to_string(),
            parameters: vec![],
            return_type: None,
            decorators: vec![],
            parent_qualified_name: None,
        }
    }

    fn upsert(path: &str) -> FileUpsert {
        FileUpsert {
            path: path.to_string(),
            relative_path: path.trim_start_matches('/').to_string(),
            language: Some("python".to_string()),
            last_modified: 0.0,
            content_hash: format!("hash-{path}"),
        }
    }

    /// Store with the animal fixture plus a test file, embeddings for two
    /// symbols.
    fn fixture() -> (Store, StdHashMap<String, i64>) {
        let store = Store::open_in_memory(4).unwrap();
        let mut known = StdHashMap::new();

        let models = ParseResult {
            symbols: vec![
                {
                    let mut s = symbol("Animal", "models.Animal", SymbolKind::Class, "Base class for all animals.");
                    s.signature = "class Animal".to_string();
                    s
                },
                {
                    let mut s = symbol("Dog", "models.Dog", SymbolKind::Class, "A dog.");
                    s.signature = "class Dog(Animal)".to_string();
                    s
                },
                symbol(
                    "find_oldest",
                    "models.find_oldest",
                    SymbolKind::Function,
                    "Return the oldest animal from a list.",
                ),
                symbol("helper", "models.helper", SymbolKind::Function, ""),
            ],
            edges: GraphEdges {
                imports: vec![],
                calls: vec![CallEdge {
                    caller: "models.helper".to_string(),
                    callee: "find_oldest".to_string(),
                    line: 9,
                }],
                inherits: vec![InheritEdge {
                    child: "models.Dog".to_string(),
                    parent: "Animal".to_string(),
                }],
            },
        };
        store
            .write_file_index(&upsert("/repo/models.py"), &models, &mut known)
            .unwrap();

        let tests_file = ParseResult {
            symbols: vec![symbol(
                "test_find_oldest",
                "tests.test_models.test_find_oldest",
                SymbolKind::Function,
                "Checks the oldest animal lookup.",
            )],
            edges: GraphEdges::default(),
        };
        store
            .write_file_index(&upsert("/repo/tests/test_models.py"), &tests_file, &mut known)
            .unwrap();

        store.resolve_graph_edges().unwrap();
        (store, known)
    }

    #[test]
    fn empty_query_returns_empty() {
        let (store, _) = fixture();
        let searcher = Searcher::new(&store, None, None);
        assert!(searcher
            .search("", &SearchOptions::default())
            .unwrap()
            .is_empty());
        assert!(searcher
            .search("   ", &SearchOptions::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn fulltext_search_finds_docstring() {
        let (store, _) = fixture();
        let searcher = Searcher::new(&store, None, None);
        let results = searcher
            .search("oldest animal", &SearchOptions::default())
            .unwrap();
        assert!(!results.is_empty());
        assert!(results
            .iter()
            .any(|r| r.symbol.qualified_name.ends_with("find_oldest")));
        assert!(results
            .iter()
            .all(|r| r.match_type == MatchType::Fulltext));
        assert!(results.iter().all(|r| r.score >= 0.0 && r.score <= 1.0));
    }

    #[test]
    fn without_embedder_no_semantic_or_hybrid() {
        let (store, known) = fixture();
        // Even with stored embeddings, no embedder means no vector round.
        store
            .upsert_embedding(known["models.find_oldest"], &[1.0, 0.0, 0.0, 0.0])
            .unwrap();
        let searcher = Searcher::new(&store, None, None);
        let results = searcher
            .search("find_oldest", &SearchOptions::default())
            .unwrap();
        assert!(!results.is_empty());
        assert!(results
            .iter()
            .all(|r| r.match_type == MatchType::Fulltext));
    }

    #[test]
    fn graph_intent_routes_to_callers() {
        let (store, _) = fixture();
        let searcher = Searcher::new(&store, None, None);
        let results = searcher
            .search("callers of find_oldest", &SearchOptions::default())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol.qualified_name, "models.helper");
        assert_eq!(results[0].match_type, MatchType::Graph);
        assert!((results[0].score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn graph_intent_routes_to_hierarchy() {
        let (store, _) = fixture();
        let searcher = Searcher::new(&store, None, None);
        let results = searcher
            .search("hierarchy of Animal", &SearchOptions::default())
            .unwrap();
        let qnames: Vec<&str> = results
            .iter()
            .map(|r| r.symbol.qualified_name.as_str())
            .collect();
        assert!(qnames.contains(&"models.Animal"));
        assert!(qnames.contains(&"models.Dog"));
        assert!(results.iter().all(|r| r.match_type == MatchType::Graph));
    }

    #[test]
    fn graph_intent_missing_target_is_empty() {
        let (store, _) = fixture();
        let searcher = Searcher::new(&store, None, None);
        let results = searcher
            .search("callers of does_not_exist", &SearchOptions::default())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn lookup_falls_back_to_prefix() {
        let (store, _) = fixture();
        let searcher = Searcher::new(&store, None, None);
        assert_eq!(searcher.lookup_symbol("Dog").unwrap().len(), 1);
        let prefix = searcher.lookup_symbol("find_old").unwrap();
        assert!(prefix
            .iter()
            .any(|s| s.qualified_name == "models.find_oldest"));
    }

    #[test]
    fn reserved_character_query_is_safe() {
        let (store, _) = fixture();
        let searcher = Searcher::new(&store, None, None);
        let results = searcher
            .search("\"*()^", &SearchOptions::default())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn limit_is_honoured() {
        let (store, _) = fixture();
        let searcher = Searcher::new(&store, None, None);
        let options = SearchOptions {
            limit: 1,
            ..Default::default()
        };
        let results = searcher.search("animal oldest find", &options).unwrap();
        assert!(results.len() <= 1);
    }

    // ── Helper behaviour ────────────────────────────────────────────────

    #[test]
    fn sanitize_quotes_special_terms() {
        assert_eq!(sanitize_fts_query("plain words", false), "plain words");
        assert_eq!(
            sanitize_fts_query("foo-bar baz", false),
            "\"foo-bar\" baz"
        );
        assert_eq!(sanitize_fts_query("a b", true), "a OR b");
        // Pure operator soup collapses to nothing.
        assert_eq!(sanitize_fts_query("* ( )", false), "");
    }

    #[test]
    fn rewrite_heuristic_triggers_on_prose_questions() {
        assert!(should_rewrite("how does the indexer cache files"));
        assert!(should_rewrite("where is the oldest animal found?"));
    }

    #[test]
    fn rewrite_heuristic_skips_code_queries() {
        assert!(!should_rewrite("find_oldest"));
        assert!(!should_rewrite("how does upsert_file work"));
        assert!(!should_rewrite("parseFile usage"));
        assert!(!should_rewrite("models.Dog"));
        assert!(!should_rewrite("oldest animal"));
        assert!(!should_rewrite("what now?"));
    }

    #[test]
    fn test_path_convention() {
        assert!(is_test_path("tests/test_models.py"));
        assert!(is_test_path("src/__tests__/app.test.ts"));
        assert!(is_test_path("pkg/store_test.go"));
        assert!(is_test_path("test_cli.py"));
        assert!(!is_test_path("src/models.py"));
        assert!(!is_test_path("src/contest.py"));
    }

    // ── Rewriter integration (mocked) ───────────────────────────────────

    fn rewriter_with_body(server: &mut mockito::Server, body: &str) -> QueryRewriter {
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "choices": [{"message": {"content": body}}]
                })
                .to_string(),
            )
            .create();
        QueryRewriter::new(&codelibrarian_core::QueryRewriteConfig {
            enabled: true,
            api_url: format!("{}/v1/chat/completions", server.url()),
            model: "test".to_string(),
            timeout: 5.0,
        })
        .unwrap()
    }

    #[test]
    fn forced_rewrite_merges_term_results() {
        let (store, _) = fixture();
        let mut server = mockito::Server::new();
        let rewriter = rewriter_with_body(
            &mut server,
            r#"{"terms": ["find_oldest"], "focus": "all"}"#,
        );
        let searcher = Searcher::new(&store, None, Some(&rewriter));

        // The original query matches nothing; the rewritten terms do.
        let options = SearchOptions {
            rewrite: true,
            ..Default::default()
        };
        let results = searcher.search("animal age maximum", &options).unwrap();
        assert!(results
            .iter()
            .any(|r| r.symbol.qualified_name == "models.find_oldest"));
    }

    #[test]
    fn implementation_focus_halves_test_files() {
        let (store, _) = fixture();
        let mut server = mockito::Server::new();
        let rewriter = rewriter_with_body(
            &mut server,
            r#"{"terms": ["oldest"], "focus": "implementation"}"#,
        );
        let searcher = Searcher::new(&store, None, Some(&rewriter));

        let options = SearchOptions {
            rewrite: true,
            ..Default::default()
        };
        let results = searcher.search("oldest", &options).unwrap();
        let impl_result = results
            .iter()
            .find(|r| r.symbol.qualified_name == "models.find_oldest");
        let test_result = results
            .iter()
            .find(|r| r.symbol.qualified_name.starts_with("tests."));
        if let (Some(implementation), Some(test)) = (impl_result, test_result) {
            assert!(implementation.score > test.score);
        }
    }

    #[test]
    fn zero_result_fallback_consults_rewriter_once() {
        let (store, _) = fixture();
        let mut server = mockito::Server::new();
        let rewriter = rewriter_with_body(
            &mut server,
            r#"{"terms": ["find_oldest"], "focus": "all"}"#,
        );
        let searcher = Searcher::new(&store, None, Some(&rewriter));

        let results = searcher
            .search("zzz qqq vvv", &SearchOptions::default())
            .unwrap();
        assert!(results
            .iter()
            .any(|r| r.symbol.qualified_name == "models.find_oldest"));
    }

    #[test]
    fn rewriter_failure_keeps_original_results() {
        let (store, _) = fixture();
        let config = codelibrarian_core::QueryRewriteConfig {
            enabled: true,
            // Nothing listens here; every call fails.
            api_url: "http://127.0.0.1:1/v1/chat/completions".to_string(),
            model: "test".to_string(),
            timeout: 0.2,
        };
        let rewriter = QueryRewriter::new(&config).unwrap();
        let searcher = Searcher::new(&store, None, Some(&rewriter));

        let options = SearchOptions {
            rewrite: true,
            ..Default::default()
        };
        let results = searcher.search("oldest animal", &options).unwrap();
        assert!(results
            .iter()
            .any(|r| r.symbol.qualified_name.ends_with("find_oldest")));
    }
}
