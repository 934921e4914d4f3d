//! Data model shared between the parsers, store, indexer, and search engine.

use serde::{Deserialize, Serialize};

use crate::LibrarianError;

// ── Symbol kinds ────────────────────────────────────────────────────────────

/// The kind of a parsed code symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Module,
}

impl SymbolKind {
    /// All kinds, in the order used by `status` output.
    pub const ALL: [SymbolKind; 4] = [
        Self::Function,
        Self::Method,
        Self::Class,
        Self::Module,
    ];
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Method => write!(f, "method"),
            Self::Class => write!(f, "class"),
            Self::Module => write!(f, "module"),
        }
    }
}

impl std::str::FromStr for SymbolKind {
    type Err = LibrarianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "function" => Ok(Self::Function),
            "method" => Ok(Self::Method),
            "class" => Ok(Self::Class),
            "module" => Ok(Self::Module),
            _ => Err(LibrarianError::InvalidSymbolKind(s.to_string())),
        }
    }
}

// ── Parser output ───────────────────────────────────────────────────────────

/// A single parameter of a function or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_annotation: Option<String>,
    pub default: Option<String>,
}

impl Parameter {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_annotation: None,
            default: None,
        }
    }
}

/// A parsed code symbol (function, method, class, or module).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    /// Simple name (e.g. "fetch").
    pub name: String,
    /// Fully qualified name (e.g. "models.Dog.fetch").
    pub qualified_name: String,
    pub kind: SymbolKind,
    /// 1-based first line of the definition.
    pub line_start: u32,
    /// 1-based last line of the definition, inclusive.
    pub line_end: u32,
    /// Single-line, language-idiomatic signature.
    pub signature: String,
    /// Documentation adjacent to the definition, empty if absent.
    pub docstring: String,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    pub decorators: Vec<String>,
    /// Qualified name of the containing class, if nested.
    pub parent_qualified_name: Option<String>,
}

impl Symbol {
    pub fn parameters_json(&self) -> String {
        serde_json::to_string(&self.parameters).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn decorators_json(&self) -> String {
        serde_json::to_string(&self.decorators).unwrap_or_else(|_| "[]".to_string())
    }

    /// Text submitted to the embedding service, truncated to `max_chars`.
    pub fn embedding_text(&self, max_chars: usize) -> String {
        let mut text = format!("{}\n{}", self.qualified_name, self.signature);
        if !self.docstring.is_empty() {
            text.push('\n');
            text.push_str(&self.docstring);
        }
        truncate_chars(&text, max_chars)
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// An import edge as written in source: module string plus optional binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEdge {
    pub module: String,
    pub name: Option<String>,
}

/// A call site inside a function or method body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    /// Qualified name of the calling symbol.
    pub caller: String,
    /// Target name exactly as written (may be dotted).
    pub callee: String,
    /// 1-based line of the call site.
    pub line: u32,
}

/// An inheritance edge from a class-like definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritEdge {
    pub child: String,
    pub parent: String,
}

/// Graph relationships extracted from a single file, unresolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphEdges {
    pub imports: Vec<ImportEdge>,
    pub calls: Vec<CallEdge>,
    pub inherits: Vec<InheritEdge>,
}

/// Output of a parser for a single file.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub symbols: Vec<Symbol>,
    pub edges: GraphEdges,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
            && self.edges.imports.is_empty()
            && self.edges.calls.is_empty()
            && self.edges.inherits.is_empty()
    }
}

// ── Stored records ──────────────────────────────────────────────────────────

/// A file row as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub relative_path: String,
    pub language: Option<String>,
    pub last_modified: Option<f64>,
    pub content_hash: Option<String>,
}

/// A symbol row hydrated with its file paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub id: i64,
    #[serde(skip_serializing, default)]
    pub file_id: i64,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub relative_path: String,
    pub line_start: Option<u32>,
    pub line_end: Option<u32>,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    pub decorators: Vec<String>,
    #[serde(skip_serializing, default)]
    pub parent_id: Option<i64>,
}

// ── Search results ──────────────────────────────────────────────────────────

/// How a search result was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Fulltext,
    Semantic,
    Hybrid,
    Graph,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fulltext => write!(f, "fulltext"),
            Self::Semantic => write!(f, "semantic"),
            Self::Hybrid => write!(f, "hybrid"),
            Self::Graph => write!(f, "graph"),
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub symbol: SymbolRecord,
    pub score: f64,
    pub match_type: MatchType,
}

// ── Query rewriting ─────────────────────────────────────────────────────────

/// Advisory bias from the query rewriter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Focus {
    Implementation,
    Tests,
    All,
}

/// A natural-language query rewritten into code search terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewrittenQuery {
    pub terms: Vec<String>,
    pub focus: Focus,
}
