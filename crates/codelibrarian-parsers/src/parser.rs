//! Parsing coordinator: maps a language tag to its extractor and shields
//! callers from parse failures.

use crate::extractor::SymbolExtractor;
use crate::generic::GenericExtractor;
use crate::languages;
use crate::python::PythonExtractor;
use codelibrarian_core::ParseResult;
use std::path::Path;
use tree_sitter::Parser;

/// Coordinates extraction across all registered languages.
pub struct CodeParser {
    extractors: Vec<Box<dyn SymbolExtractor>>,
}

impl CodeParser {
    /// Create a parser with the deep Python extractor and one generic
    /// extractor per supported grammar.
    pub fn new() -> Self {
        let mut extractors: Vec<Box<dyn SymbolExtractor>> =
            vec![Box::new(PythonExtractor::new())];
        for spec in languages::all_specs() {
            extractors.push(Box::new(GenericExtractor::new(spec)));
        }
        Self { extractors }
    }

    /// Parse one file's bytes with the extractor for `language`.
    ///
    /// Unknown languages, grammar setup failures, and syntax trees the
    /// parser cannot produce all yield an empty `ParseResult`.
    pub fn parse(&self, language: &str, source: &[u8], module_name: &str) -> ParseResult {
        let Some(extractor) = self.extractor_for(language) else {
            tracing::debug!("No extractor for language {language}");
            return ParseResult::default();
        };

        let mut parser = Parser::new();
        if parser
            .set_language(&extractor.tree_sitter_language())
            .is_err()
        {
            tracing::warn!("Failed to configure {language} grammar");
            return ParseResult::default();
        }

        match parser.parse(source, None) {
            Some(tree) => extractor.extract(&tree, source, module_name),
            None => {
                tracing::debug!("Parse produced no tree for a {language} file");
                ParseResult::default()
            }
        }
    }

    pub fn supports_language(&self, language: &str) -> bool {
        self.extractor_for(language).is_some()
    }

    fn extractor_for(&self, language: &str) -> Option<&dyn SymbolExtractor> {
        self.extractors
            .iter()
            .find(|e| e.language_name() == language)
            .map(|e| e.as_ref())
    }
}

impl Default for CodeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a file path into a dot-joined module name relative to the root.
///
/// The extension is stripped from the last component and a Python
/// `__init__` collapses into its package.
pub fn derive_module_name(file_path: &Path, root: &Path) -> String {
    let relative = file_path.strip_prefix(root).unwrap_or(file_path);
    let mut parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if let Some(last) = parts.last_mut() {
        let stem = Path::new(&*last)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| last.clone());
        *last = stem;
        if last == "__init__" {
            parts.pop();
        }
    }

    if parts.is_empty() {
        file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        parts.join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_python_source() {
        let parser = CodeParser::new();
        let result = parser.parse("python", b"def hello():\n    pass\n", "mod");
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].qualified_name, "mod.hello");
    }

    #[test]
    fn parses_rust_source() {
        let parser = CodeParser::new();
        let result = parser.parse("rust", b"pub fn hello() {}\n", "lib");
        assert_eq!(result.symbols.len(), 1);
        assert_eq!(result.symbols[0].qualified_name, "lib::hello");
    }

    #[test]
    fn unknown_language_yields_empty() {
        let parser = CodeParser::new();
        let result = parser.parse("cobol", b"IDENTIFICATION DIVISION.", "mod");
        assert!(result.is_empty());
    }

    #[test]
    fn syntax_errors_yield_symbols_not_panics() {
        let parser = CodeParser::new();
        // tree-sitter error-recovers; broken input must never propagate.
        let result = parser.parse("python", b"def broken(:\n  ???", "mod");
        assert!(result.symbols.len() <= 1);
    }

    #[test]
    fn supports_configured_languages() {
        let parser = CodeParser::new();
        for lang in ["python", "typescript", "javascript", "rust", "java", "cpp"] {
            assert!(parser.supports_language(lang), "missing {lang}");
        }
        assert!(!parser.supports_language("haskell"));
    }

    #[test]
    fn module_name_from_nested_path() {
        let root = Path::new("/repo");
        assert_eq!(
            derive_module_name(Path::new("/repo/pkg/mod/file.py"), root),
            "pkg.mod.file"
        );
        assert_eq!(
            derive_module_name(Path::new("/repo/pkg/__init__.py"), root),
            "pkg"
        );
        assert_eq!(
            derive_module_name(Path::new("/repo/src/main.rs"), root),
            "src.main"
        );
        assert_eq!(derive_module_name(Path::new("/repo/top.js"), root), "top");
    }

    #[test]
    fn module_name_outside_root_uses_full_path() {
        let root = Path::new("/repo");
        assert_eq!(
            derive_module_name(Path::new("/elsewhere/file.py"), root),
            "elsewhere.file"
        );
    }
}
