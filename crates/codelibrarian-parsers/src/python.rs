//! Deep Python extractor.
//!
//! Walks the full tree-sitter-python AST and produces complete symbol
//! metadata: parameters with annotations and defaults, decorators, return
//! types, docstrings, plus import, call, and inheritance edges. This is the
//! reference extractor for field coverage.

use crate::extractor::{node_text, SymbolExtractor};
use codelibrarian_core::{
    CallEdge, ImportEdge, InheritEdge, Parameter, ParseResult, Symbol, SymbolKind,
};
use tree_sitter::{Node, Tree};

/// Bare calls to these names are noise in a call graph; dotted calls are
/// never filtered.
const PYTHON_BUILTINS: &[&str] = &[
    "abs", "all", "any", "bin", "bool", "bytearray", "bytes", "callable", "chr", "classmethod",
    "compile", "complex", "delattr", "dict", "dir", "divmod", "enumerate", "eval", "exec",
    "filter", "float", "format", "frozenset", "getattr", "globals", "hasattr", "hash", "hex",
    "id", "input", "int", "isinstance", "issubclass", "iter", "len", "list", "locals", "map",
    "max", "memoryview", "min", "next", "object", "oct", "open", "ord", "pow", "print",
    "property", "range", "repr", "reversed", "round", "set", "setattr", "slice", "sorted",
    "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip",
];

/// Python extractor built on tree-sitter-python.
pub struct PythonExtractor;

impl PythonExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolExtractor for PythonExtractor {
    fn language_name(&self) -> &str {
        "python"
    }

    fn file_extensions(&self) -> &[&str] {
        &["py"]
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn extract(&self, tree: &Tree, source: &[u8], module_name: &str) -> ParseResult {
        let mut visitor = Visitor {
            source,
            module_name,
            result: ParseResult::default(),
            class_stack: Vec::new(),
        };
        visitor.walk(tree.root_node(), &[]);
        visitor.result
    }
}

struct Visitor<'a> {
    source: &'a [u8],
    module_name: &'a str,
    result: ParseResult,
    /// Qualified names of enclosing classes.
    class_stack: Vec<String>,
}

impl<'a> Visitor<'a> {
    fn walk(&mut self, node: Node<'a>, decorators: &[String]) {
        match node.kind() {
            "function_definition" => {
                self.handle_function(node, decorators);
                return;
            }
            "class_definition" => {
                self.handle_class(node, decorators);
                return;
            }
            "decorated_definition" => {
                let decs = self.collect_decorators(node);
                if let Some(definition) = node.child_by_field_name("definition") {
                    self.walk(definition, &decs);
                }
                return;
            }
            "import_statement" => {
                self.handle_import(node);
                return;
            }
            "import_from_statement" => {
                self.handle_import_from(node);
                return;
            }
            _ => {}
        }

        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.walk(child, &[]);
            }
        }
    }

    fn qualify(&self, name: &str) -> String {
        match self.class_stack.last() {
            Some(class) => format!("{class}.{name}"),
            None => format!("{}.{name}", self.module_name),
        }
    }

    // ── Definitions ─────────────────────────────────────────────────────

    fn handle_function(&mut self, node: Node<'a>, decorators: &[String]) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let qualified = self.qualify(&name);
        let kind = if self.class_stack.is_empty() {
            SymbolKind::Function
        } else {
            SymbolKind::Method
        };

        let parameters = self.extract_parameters(node);
        let return_type = node
            .child_by_field_name("return_type")
            .map(|n| node_text(n, self.source));
        let is_async = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .any(|c| c.kind() == "async");
        let signature = build_signature(&name, &parameters, return_type.as_deref(), is_async);
        let docstring = self.extract_docstring(node);

        self.result.symbols.push(Symbol {
            name,
            qualified_name: qualified.clone(),
            kind,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            signature,
            docstring,
            parameters,
            return_type,
            decorators: decorators.to_vec(),
            parent_qualified_name: self.class_stack.last().cloned(),
        });

        if let Some(body) = node.child_by_field_name("body") {
            self.collect_calls(body, &qualified);
            // Nested definitions get their own symbols; calls inside them
            // are attributed there, not here.
            for i in 0..body.child_count() {
                if let Some(child) = body.child(i) {
                    self.walk_nested_definitions(child);
                }
            }
        }
    }

    /// Visit only class/function definitions (and decorated wrappers)
    /// inside a function body.
    fn walk_nested_definitions(&mut self, node: Node<'a>) {
        match node.kind() {
            "function_definition" | "class_definition" | "decorated_definition" => {
                self.walk(node, &[]);
            }
            _ => {
                for i in 0..node.child_count() {
                    if let Some(child) = node.child(i) {
                        self.walk_nested_definitions(child);
                    }
                }
            }
        }
    }

    fn handle_class(&mut self, node: Node<'a>, decorators: &[String]) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source);
        let qualified = self.qualify(&name);

        let mut bases: Vec<String> = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            for i in 0..superclasses.child_count() {
                if let Some(child) = superclasses.child(i) {
                    if matches!(child.kind(), "identifier" | "attribute") {
                        bases.push(node_text(child, self.source));
                    }
                }
            }
        }

        let signature = if bases.is_empty() {
            format!("class {name}")
        } else {
            format!("class {name}({})", bases.join(", "))
        };
        let docstring = self.extract_docstring(node);

        self.result.symbols.push(Symbol {
            name,
            qualified_name: qualified.clone(),
            kind: SymbolKind::Class,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            signature,
            docstring,
            parameters: vec![],
            return_type: None,
            decorators: decorators.to_vec(),
            parent_qualified_name: self.class_stack.last().cloned(),
        });

        for base in bases {
            self.result.edges.inherits.push(InheritEdge {
                child: qualified.clone(),
                parent: base,
            });
        }

        self.class_stack.push(qualified);
        if let Some(body) = node.child_by_field_name("body") {
            for i in 0..body.child_count() {
                if let Some(child) = body.child(i) {
                    self.walk(child, &[]);
                }
            }
        }
        self.class_stack.pop();
    }

    fn collect_decorators(&self, node: Node<'a>) -> Vec<String> {
        let mut decorators = Vec::new();
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                if child.kind() == "decorator" {
                    let raw = node_text(child, self.source);
                    let trimmed = raw.trim_start_matches('@');
                    // Keep the decorator name, drop any argument list.
                    let name = trimmed.split('(').next().unwrap_or(trimmed).trim();
                    decorators.push(name.to_string());
                }
            }
        }
        decorators
    }

    // ── Parameters ──────────────────────────────────────────────────────

    fn extract_parameters(&self, node: Node<'a>) -> Vec<Parameter> {
        let mut params = Vec::new();
        let Some(param_list) = node.child_by_field_name("parameters") else {
            return params;
        };
        for i in 0..param_list.child_count() {
            let Some(child) = param_list.child(i) else {
                continue;
            };
            match child.kind() {
                "identifier" => {
                    let name = node_text(child, self.source);
                    if name != "self" && name != "cls" {
                        params.push(Parameter::named(name));
                    }
                }
                "typed_parameter" => {
                    let name = child
                        .child(0)
                        .map(|n| node_text(n, self.source))
                        .unwrap_or_default();
                    let type_annotation = child
                        .child_by_field_name("type")
                        .map(|n| node_text(n, self.source));
                    params.push(Parameter {
                        name,
                        type_annotation,
                        default: None,
                    });
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| node_text(n, self.source))
                        .unwrap_or_default();
                    let type_annotation = child
                        .child_by_field_name("type")
                        .map(|n| node_text(n, self.source));
                    let default = child
                        .child_by_field_name("value")
                        .map(|n| node_text(n, self.source));
                    params.push(Parameter {
                        name,
                        type_annotation,
                        default,
                    });
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    params.push(Parameter::named(node_text(child, self.source)));
                }
                _ => {}
            }
        }
        params
    }

    // ── Docstrings ──────────────────────────────────────────────────────

    /// The first statement of the body, when it is a string expression.
    fn extract_docstring(&self, node: Node<'a>) -> String {
        let Some(body) = node.child_by_field_name("body") else {
            return String::new();
        };
        let Some(first) = body.child(0) else {
            return String::new();
        };
        if first.kind() != "expression_statement" {
            return String::new();
        }
        let Some(expr) = first.child(0) else {
            return String::new();
        };
        if expr.kind() != "string" {
            return String::new();
        }
        let raw = node_text(expr, self.source);
        strip_string_quotes(&raw).trim().to_string()
    }

    // ── Calls ───────────────────────────────────────────────────────────

    /// Record call sites within `node`, skipping nested definitions.
    fn collect_calls(&mut self, node: Node<'a>, caller: &str) {
        if matches!(node.kind(), "function_definition" | "class_definition") {
            return;
        }
        if node.kind() == "call" {
            if let Some(function) = node.child_by_field_name("function") {
                if let Some(name) = call_target_name(function, self.source) {
                    let bare = !name.contains('.');
                    if !(bare && PYTHON_BUILTINS.contains(&name.as_str())) {
                        self.result.edges.calls.push(CallEdge {
                            caller: caller.to_string(),
                            callee: name,
                            line: node.start_position().row as u32 + 1,
                        });
                    }
                }
            }
        }
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.collect_calls(child, caller);
            }
        }
    }

    // ── Imports ─────────────────────────────────────────────────────────

    fn handle_import(&mut self, node: Node<'a>) {
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let module = match name.kind() {
                "dotted_name" => node_text(name, self.source),
                "aliased_import" => name
                    .child_by_field_name("name")
                    .map(|n| node_text(n, self.source))
                    .unwrap_or_default(),
                _ => continue,
            };
            if !module.is_empty() {
                self.result.edges.imports.push(ImportEdge {
                    module,
                    name: None,
                });
            }
        }
    }

    fn handle_import_from(&mut self, node: Node<'a>) {
        let module = node
            .child_by_field_name("module_name")
            .map(|n| node_text(n, self.source))
            .unwrap_or_default();

        let mut cursor = node.walk();
        let mut any = false;
        for name in node.children_by_field_name("name", &mut cursor) {
            let binding = match name.kind() {
                "dotted_name" => Some(node_text(name, self.source)),
                "aliased_import" => name
                    .child_by_field_name("name")
                    .map(|n| node_text(n, self.source)),
                _ => None,
            };
            if let Some(binding) = binding {
                any = true;
                self.result.edges.imports.push(ImportEdge {
                    module: module.clone(),
                    name: Some(binding),
                });
            }
        }
        // `from module import *` has no name children.
        if !any && !module.is_empty() {
            self.result.edges.imports.push(ImportEdge {
                module,
                name: None,
            });
        }
    }
}

/// Name of a call target: a bare identifier or a dotted attribute chain.
fn call_target_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source)),
        "attribute" => {
            let text = node_text(node, source);
            // Subscripted or parenthesised receivers produce noisy names.
            if text.len() <= 100 && !text.contains(['(', '[', '\n']) {
                Some(text)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn build_signature(
    name: &str,
    params: &[Parameter],
    return_type: Option<&str>,
    is_async: bool,
) -> String {
    let prefix = if is_async { "async def" } else { "def" };
    let rendered: Vec<String> = params
        .iter()
        .map(|p| {
            let mut part = p.name.clone();
            if let Some(ref t) = p.type_annotation {
                part.push_str(&format!(": {t}"));
            }
            if let Some(ref d) = p.default {
                part.push_str(&format!(" = {d}"));
            }
            part
        })
        .collect();
    let mut sig = format!("{prefix} {name}({})", rendered.join(", "));
    if let Some(ret) = return_type {
        sig.push_str(&format!(" -> {ret}"));
    }
    sig
}

fn strip_string_quotes(raw: &str) -> &str {
    let raw = raw
        .trim_start_matches("r\"\"\"")
        .trim_start_matches("r'''")
        .trim_start_matches("\"\"\"")
        .trim_start_matches("'''");
    let raw = raw.trim_end_matches("\"\"\"").trim_end_matches("'''");
    raw.trim_matches(['"', '\''])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(source: &str) -> ParseResult {
        let extractor = PythonExtractor::new();
        let mut parser = Parser::new();
        parser
            .set_language(&extractor.tree_sitter_language())
            .expect("set python language");
        let tree = parser.parse(source.as_bytes(), None).expect("parse");
        extractor.extract(&tree, source.as_bytes(), "mod")
    }

    #[test]
    fn function_with_docstring_and_annotations() {
        let result = parse(
            r#"
def add(a: int, b: int = 2) -> int:
    """Adds two numbers."""
    return a + b
"#,
        );
        assert_eq!(result.symbols.len(), 1);
        let sym = &result.symbols[0];
        assert_eq!(sym.name, "add");
        assert_eq!(sym.qualified_name, "mod.add");
        assert_eq!(sym.kind, SymbolKind::Function);
        assert_eq!(sym.line_start, 2);
        assert_eq!(sym.docstring, "Adds two numbers.");
        assert_eq!(sym.return_type.as_deref(), Some("int"));
        assert_eq!(sym.signature, "def add(a: int, b: int = 2) -> int");
        assert_eq!(sym.parameters.len(), 2);
        assert_eq!(sym.parameters[0].type_annotation.as_deref(), Some("int"));
        assert_eq!(sym.parameters[1].default.as_deref(), Some("2"));
    }

    #[test]
    fn class_with_methods_and_parent_links() {
        let result = parse(
            r#"
class Dog:
    """A dog."""

    def __init__(self, name: str):
        self.name = name

    def bark(self) -> str:
        return "Woof!"
"#,
        );
        let dog = result.symbols.iter().find(|s| s.name == "Dog").unwrap();
        assert_eq!(dog.kind, SymbolKind::Class);
        assert_eq!(dog.docstring, "A dog.");

        let bark = result.symbols.iter().find(|s| s.name == "bark").unwrap();
        assert_eq!(bark.kind, SymbolKind::Method);
        assert_eq!(bark.qualified_name, "mod.Dog.bark");
        assert_eq!(bark.parent_qualified_name.as_deref(), Some("mod.Dog"));
        // self is skipped
        let init = result.symbols.iter().find(|s| s.name == "__init__").unwrap();
        assert_eq!(init.parameters.len(), 1);
        assert_eq!(init.parameters[0].name, "name");
    }

    #[test]
    fn inheritance_edges_per_base() {
        let result = parse(
            r#"
class MyClass(Base1, pkg.Base2):
    pass
"#,
        );
        assert_eq!(result.edges.inherits.len(), 2);
        assert_eq!(result.edges.inherits[0].child, "mod.MyClass");
        assert_eq!(result.edges.inherits[0].parent, "Base1");
        assert_eq!(result.edges.inherits[1].parent, "pkg.Base2");
        let sym = &result.symbols[0];
        assert_eq!(sym.signature, "class MyClass(Base1, pkg.Base2)");
    }

    #[test]
    fn nested_class_qualified_names() {
        let result = parse(
            r#"
class Outer:
    class Inner:
        def inner_method(self):
            pass
"#,
        );
        assert!(result
            .symbols
            .iter()
            .any(|s| s.qualified_name == "mod.Outer.Inner"));
        let method = result
            .symbols
            .iter()
            .find(|s| s.name == "inner_method")
            .unwrap();
        assert_eq!(method.qualified_name, "mod.Outer.Inner.inner_method");
        assert_eq!(
            method.parent_qualified_name.as_deref(),
            Some("mod.Outer.Inner")
        );
    }

    #[test]
    fn decorators_without_arguments() {
        let result = parse(
            r#"
@staticmethod
@functools.lru_cache(maxsize=32)
def cached():
    pass
"#,
        );
        let sym = &result.symbols[0];
        assert_eq!(
            sym.decorators,
            vec!["staticmethod".to_string(), "functools.lru_cache".to_string()]
        );
    }

    #[test]
    fn call_edges_with_lines_and_builtin_filter() {
        let result = parse(
            r#"
def a():
    b()
    print("hi")
    obj.method()
"#,
        );
        let callees: Vec<(&str, u32)> = result
            .edges
            .calls
            .iter()
            .map(|c| (c.callee.as_str(), c.line))
            .collect();
        assert!(callees.contains(&("b", 3)));
        assert!(callees.contains(&("obj.method", 5)));
        assert!(!callees.iter().any(|(name, _)| *name == "print"));
        assert!(result.edges.calls.iter().all(|c| c.caller == "mod.a"));
    }

    #[test]
    fn nested_function_calls_attributed_to_inner() {
        let result = parse(
            r#"
def outer():
    def inner():
        target()
    inner()
"#,
        );
        let inner_call = result
            .edges
            .calls
            .iter()
            .find(|c| c.callee == "target")
            .unwrap();
        assert_eq!(inner_call.caller, "mod.inner");
        let outer_call = result
            .edges
            .calls
            .iter()
            .find(|c| c.callee == "inner")
            .unwrap();
        assert_eq!(outer_call.caller, "mod.outer");
    }

    #[test]
    fn imports_plain_from_and_aliased() {
        let result = parse(
            r#"
import os
import numpy as np
from pathlib import Path
from collections import defaultdict, OrderedDict
from x import *
"#,
        );
        let modules: Vec<(&str, Option<&str>)> = result
            .edges
            .imports
            .iter()
            .map(|i| (i.module.as_str(), i.name.as_deref()))
            .collect();
        assert!(modules.contains(&("os", None)));
        assert!(modules.contains(&("numpy", None)));
        assert!(modules.contains(&("pathlib", Some("Path"))));
        assert!(modules.contains(&("collections", Some("defaultdict"))));
        assert!(modules.contains(&("collections", Some("OrderedDict"))));
        assert!(modules.contains(&("x", None)));
    }

    #[test]
    fn async_function_signature() {
        let result = parse("async def go(x):\n    pass\n");
        assert_eq!(result.symbols[0].signature, "async def go(x)");
    }

    #[test]
    fn splat_parameters_keep_markers() {
        let result = parse("def f(a, *args, **kwargs):\n    pass\n");
        let names: Vec<&str> = result.symbols[0]
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "*args", "**kwargs"]);
    }

    #[test]
    fn multiline_docstring_preserved() {
        let result = parse(
            "def documented():\n    \"\"\"\n    First line.\n    Second line.\n    \"\"\"\n    pass\n",
        );
        let doc = &result.symbols[0].docstring;
        assert!(doc.contains("First line."));
        assert!(doc.contains("Second line."));
    }

    #[test]
    fn same_bytes_parse_identically() {
        let src = "class A:\n    def m(self):\n        helper()\n";
        let first = parse(src);
        let second = parse(src);
        let names = |r: &ParseResult| -> Vec<String> {
            r.symbols.iter().map(|s| s.qualified_name.clone()).collect()
        };
        assert_eq!(names(&first), names(&second));
        assert_eq!(first.edges.calls, second.edges.calls);
    }
}
