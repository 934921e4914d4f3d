//! The common extraction contract both parser strategies implement.

use codelibrarian_core::ParseResult;
use tree_sitter::Tree;

/// Per-language symbol extraction from a parsed tree-sitter AST.
///
/// Implementations must never fail: anything unparseable yields an empty
/// `ParseResult`.
pub trait SymbolExtractor: Send + Sync {
    /// Language tag this extractor handles (e.g. "python").
    fn language_name(&self) -> &str;

    /// File extensions this extractor handles (e.g. &["py"]).
    fn file_extensions(&self) -> &[&str];

    /// The tree-sitter grammar for configuring the parser.
    fn tree_sitter_language(&self) -> tree_sitter::Language;

    /// Extract symbols and unresolved edges from a parsed tree.
    ///
    /// `module_name` is the dot-joined module path of the file, used as the
    /// qualified-name prefix for top-level symbols.
    fn extract(&self, tree: &Tree, source: &[u8], module_name: &str) -> ParseResult;
}

/// UTF-8 text spanned by a node.
pub(crate) fn node_text(node: tree_sitter::Node<'_>, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or("").to_string()
}

/// Collapse a multi-line span into a single-line signature.
pub(crate) fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
