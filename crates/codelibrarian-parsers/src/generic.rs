//! Grammar-driven generic extractor.
//!
//! One walker covers every non-Python language, configured by a small
//! per-language node-type map (`LangSpec`): which node kinds declare
//! functions, classes, and scope containers, where names and parameter
//! lists live, how imports are written, and what a doc comment looks like.

use crate::extractor::{node_text, single_line, SymbolExtractor};
use codelibrarian_core::{
    truncate_chars, CallEdge, ImportEdge, InheritEdge, Parameter, ParseResult, Symbol, SymbolKind,
};
use tree_sitter::{Node, Tree};

/// Signature length cap for languages with sprawling declarations.
const SIGNATURE_CAP: usize = 300;

/// Bare JS/TS identifiers excluded from the call graph, plus any member
/// chain rooted at one of the runtime namespaces below.
const JS_GLOBAL_CALLS: &[&str] = &[
    "require", "parseInt", "parseFloat", "isNaN", "setTimeout", "setInterval", "clearTimeout",
    "clearInterval", "encodeURIComponent", "decodeURIComponent", "String", "Number", "Boolean",
    "Array", "Object", "Promise", "Error",
];
const JS_NAMESPACE_ROOTS: &[&str] = &["console.", "JSON.", "Math.", "Object.", "Array."];

/// How a language writes imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStyle {
    None,
    /// `import { a, b } from "module"`
    EsModule,
    /// `import java.util.List;`
    JavaImport,
    /// `#include "header.h"` / `#include <vector>`
    CppInclude,
    /// `use crate::module::Item;`
    RustUse,
}

/// Whether (and how) call edges are extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStyle {
    None,
    /// `call_expression` with a `function` field (TS/JS).
    EsCall,
}

/// Node-type map describing one language to the generic walker.
pub struct LangSpec {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    pub language: fn() -> tree_sitter::Language,
    /// Scope separator in qualified names ("." or "::").
    pub separator: &'static str,
    /// Node kinds that define functions or methods.
    pub function_kinds: &'static [&'static str],
    /// Node kinds that define class-like symbols.
    pub class_kinds: &'static [&'static str],
    /// Scope containers that are not symbols themselves (Rust `impl`).
    pub container_kinds: &'static [&'static str],
    /// Child node kinds that carry a definition's name.
    pub name_kinds: &'static [&'static str],
    /// Node kinds holding the parameter list.
    pub param_list_kinds: &'static [&'static str],
    /// Children of a class node that list its bases/interfaces.
    pub heritage_kinds: &'static [&'static str],
    /// Comment node kinds eligible as doc comments.
    pub comment_kinds: &'static [&'static str],
    pub imports: ImportStyle,
    pub calls: CallStyle,
}

/// The generic extractor: `LangSpec`-configured walker over a tree-sitter
/// CST.
pub struct GenericExtractor {
    spec: LangSpec,
}

impl GenericExtractor {
    pub fn new(spec: LangSpec) -> Self {
        Self { spec }
    }
}

impl SymbolExtractor for GenericExtractor {
    fn language_name(&self) -> &str {
        self.spec.name
    }

    fn file_extensions(&self) -> &[&str] {
        self.spec.extensions
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        (self.spec.language)()
    }

    fn extract(&self, tree: &Tree, source: &[u8], module_name: &str) -> ParseResult {
        let mut walker = Walker {
            spec: &self.spec,
            source,
            module_name,
            result: ParseResult::default(),
            scope: Vec::new(),
        };
        walker.walk(tree.root_node(), None);
        walker.result
    }
}

struct Walker<'a> {
    spec: &'a LangSpec,
    source: &'a [u8],
    module_name: &'a str,
    result: ParseResult,
    /// Qualified names of enclosing classes/impl blocks.
    scope: Vec<String>,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, node: Node<'a>, caller: Option<&str>) {
        let kind = node.kind();

        if self.spec.class_kinds.contains(&kind) {
            self.handle_class(node);
            return;
        }
        if self.spec.container_kinds.contains(&kind) {
            self.handle_container(node);
            return;
        }
        if self.spec.function_kinds.contains(&kind) {
            self.handle_function(node);
            return;
        }

        match self.spec.imports {
            ImportStyle::EsModule if kind == "import_statement" => {
                self.handle_es_import(node);
                return;
            }
            ImportStyle::JavaImport if kind == "import_declaration" => {
                self.handle_java_import(node);
                return;
            }
            ImportStyle::CppInclude if kind == "preproc_include" => {
                self.handle_cpp_include(node);
                return;
            }
            ImportStyle::RustUse if kind == "use_declaration" => {
                self.handle_rust_use(node);
                return;
            }
            _ => {}
        }

        if self.spec.calls == CallStyle::EsCall && kind == "call_expression" {
            if let Some(caller) = caller {
                self.handle_es_call(node, caller);
            }
        }

        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.walk(child, caller);
            }
        }
    }

    fn qualify(&self, name: &str) -> String {
        match self.scope.last() {
            Some(outer) => format!("{outer}{}{name}", self.spec.separator),
            None => format!("{}{}{name}", self.module_name, self.spec.separator),
        }
    }

    // ── Definitions ─────────────────────────────────────────────────────

    fn handle_class(&mut self, node: Node<'a>) {
        let Some(name_node) = find_name_node(node, self.spec.name_kinds) else {
            return;
        };
        let name = node_text(name_node, self.source);
        let qualified = self.qualify(&name);

        let bases = self.heritage_bases(node);
        for base in &bases {
            self.result.edges.inherits.push(InheritEdge {
                child: qualified.clone(),
                parent: base.clone(),
            });
        }

        self.result.symbols.push(Symbol {
            name,
            qualified_name: qualified.clone(),
            kind: SymbolKind::Class,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            signature: signature_of(node, self.source),
            docstring: self.doc_comment(node),
            parameters: vec![],
            return_type: None,
            decorators: vec![],
            parent_qualified_name: self.scope.last().cloned(),
        });

        self.scope.push(qualified);
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.walk(child, None);
            }
        }
        self.scope.pop();
    }

    /// A scope container (Rust `impl`): qualifies members but emits no
    /// symbol of its own.
    fn handle_container(&mut self, node: Node<'a>) {
        let type_name = node
            .child_by_field_name("type")
            .and_then(|t| {
                if self.spec.name_kinds.contains(&t.kind()) {
                    Some(t)
                } else {
                    find_name_node(t, self.spec.name_kinds)
                }
            })
            .or_else(|| find_name_node(node, self.spec.name_kinds));
        let Some(type_name) = type_name else {
            return;
        };
        let qualified = self.qualify(&node_text(type_name, self.source));

        self.scope.push(qualified);
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.walk(child, None);
            }
        }
        self.scope.pop();
    }

    fn handle_function(&mut self, node: Node<'a>) {
        let Some(name_node) = find_name_node(node, self.spec.name_kinds) else {
            // Anonymous functions (arrow functions, lambdas) are skipped.
            return;
        };
        let name = node_text(name_node, self.source);
        if name.is_empty() {
            return;
        }
        let qualified = self.qualify(&name);
        let kind = if self.scope.is_empty() {
            SymbolKind::Function
        } else {
            SymbolKind::Method
        };

        self.result.symbols.push(Symbol {
            name,
            qualified_name: qualified.clone(),
            kind,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            signature: signature_of(node, self.source),
            docstring: self.doc_comment(node),
            parameters: self.extract_params(node),
            return_type: self.extract_return_type(node),
            decorators: vec![],
            parent_qualified_name: self.scope.last().cloned(),
        });

        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.walk(child, Some(&qualified));
            }
        }
    }

    // ── Heritage ────────────────────────────────────────────────────────

    fn heritage_bases(&self, node: Node<'a>) -> Vec<String> {
        let mut bases = Vec::new();
        for i in 0..node.child_count() {
            let Some(child) = node.child(i) else { continue };
            if self.spec.heritage_kinds.contains(&child.kind()) {
                collect_base_names(child, self.source, &mut bases);
            }
        }
        bases
    }

    // ── Parameters ──────────────────────────────────────────────────────

    fn extract_params(&self, node: Node<'a>) -> Vec<Parameter> {
        let mut params = Vec::new();
        let Some(list) = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .find(|c| self.spec.param_list_kinds.contains(&c.kind()))
        else {
            return params;
        };

        for i in 0..list.child_count() {
            let Some(child) = list.child(i) else { continue };
            match child.kind() {
                "identifier" => params.push(Parameter::named(node_text(child, self.source))),
                "self_parameter" => params.push(Parameter::named("self")),
                "rest_pattern" => params.push(Parameter::named(node_text(child, self.source))),
                "required_parameter" | "optional_parameter" => {
                    if let Some(p) = self.ts_parameter(child) {
                        params.push(p);
                    }
                }
                "assignment_pattern" => {
                    let name = child
                        .child_by_field_name("left")
                        .map(|n| node_text(n, self.source));
                    let default = child
                        .child_by_field_name("right")
                        .map(|n| node_text(n, self.source));
                    if let Some(name) = name {
                        params.push(Parameter {
                            name,
                            type_annotation: None,
                            default,
                        });
                    }
                }
                "parameter" | "formal_parameter" | "parameter_declaration" => {
                    if let Some(p) = self.typed_parameter(child) {
                        params.push(p);
                    }
                }
                _ => {}
            }
        }
        params
    }

    /// TS required/optional parameter: pattern + optional type annotation.
    fn ts_parameter(&self, node: Node<'a>) -> Option<Parameter> {
        let name_node = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .find(|c| matches!(c.kind(), "identifier" | "rest_pattern"))?;
        let type_annotation = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .find(|c| c.kind() == "type_annotation")
            .map(|t| {
                node_text(t, self.source)
                    .trim_start_matches(':')
                    .trim()
                    .to_string()
            });
        Some(Parameter {
            name: node_text(name_node, self.source),
            type_annotation,
            default: None,
        })
    }

    /// Rust/Java/C++ parameter: a name child plus a best-effort type child.
    fn typed_parameter(&self, node: Node<'a>) -> Option<Parameter> {
        let name_node = find_name_node(node, &["identifier", "field_identifier"])?;
        let type_annotation = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .find(|c| {
                matches!(
                    c.kind(),
                    "type_identifier"
                        | "primitive_type"
                        | "reference_type"
                        | "generic_type"
                        | "scoped_type_identifier"
                        | "pointer_type"
                        | "integral_type"
                        | "floating_point_type"
                        | "boolean_type"
                        | "array_type"
                )
            })
            .map(|t| node_text(t, self.source));
        Some(Parameter {
            name: node_text(name_node, self.source),
            type_annotation,
            default: None,
        })
    }

    fn extract_return_type(&self, node: Node<'a>) -> Option<String> {
        if let Some(ret) = node.child_by_field_name("return_type") {
            let text = node_text(ret, self.source);
            let trimmed = text.trim_start_matches("->").trim_start_matches(':').trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        // TS puts the return annotation in a plain type_annotation child
        // after the parameter list.
        let annotation = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .find(|c| c.kind() == "type_annotation")?;
        let text = node_text(annotation, self.source);
        let trimmed = text.trim_start_matches(':').trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    // ── Doc comments ────────────────────────────────────────────────────

    /// Comment block immediately preceding the definition; a non-comment
    /// sibling in between resets the block.
    fn doc_comment(&self, node: Node<'a>) -> String {
        let Some(parent) = node.parent() else {
            return String::new();
        };
        let mut lines: Vec<String> = Vec::new();
        for i in 0..parent.child_count() {
            let Some(child) = parent.child(i) else { continue };
            if child == node {
                break;
            }
            if self.spec.comment_kinds.contains(&child.kind()) {
                lines.push(clean_comment(&node_text(child, self.source)));
            } else {
                lines.clear();
            }
        }
        lines.retain(|l| !l.is_empty());
        lines.join("\n")
    }

    // ── Imports ─────────────────────────────────────────────────────────

    fn handle_es_import(&mut self, node: Node<'a>) {
        let Some(source_node) = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .find(|c| c.kind() == "string")
        else {
            return;
        };
        let module = node_text(source_node, self.source)
            .trim_matches(['\'', '"', '`'])
            .to_string();

        let mut bindings: Vec<String> = Vec::new();
        collect_es_bindings(node, self.source, &mut bindings);
        if bindings.is_empty() {
            self.result.edges.imports.push(ImportEdge { module, name: None });
        } else {
            for binding in bindings {
                self.result.edges.imports.push(ImportEdge {
                    module: module.clone(),
                    name: Some(binding),
                });
            }
        }
    }

    fn handle_java_import(&mut self, node: Node<'a>) {
        let module = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
            .map(|n| node_text(n, self.source));
        if let Some(module) = module {
            self.result.edges.imports.push(ImportEdge { module, name: None });
        }
    }

    fn handle_cpp_include(&mut self, node: Node<'a>) {
        let module = node
            .child_by_field_name("path")
            .map(|n| node_text(n, self.source))
            .map(|t| t.trim_matches(['"', '<', '>']).to_string());
        if let Some(module) = module {
            if !module.is_empty() {
                self.result.edges.imports.push(ImportEdge { module, name: None });
            }
        }
    }

    fn handle_rust_use(&mut self, node: Node<'a>) {
        let Some(argument) = node.child_by_field_name("argument") else {
            return;
        };
        // Module strings keep the path form as written.
        let module = single_line(&node_text(argument, self.source));
        if !module.is_empty() {
            self.result.edges.imports.push(ImportEdge { module, name: None });
        }
    }

    // ── Calls ───────────────────────────────────────────────────────────

    fn handle_es_call(&mut self, node: Node<'a>, caller: &str) {
        if let Some(function) = node.child_by_field_name("function") {
            if matches!(function.kind(), "identifier" | "member_expression") {
                let name = node_text(function, self.source);
                if name.len() <= 100 && !is_js_global_call(&name) {
                    self.result.edges.calls.push(CallEdge {
                        caller: caller.to_string(),
                        callee: name,
                        line: node.start_position().row as u32 + 1,
                    });
                }
            }
        }
    }
}

// ── Free helpers ────────────────────────────────────────────────────────────

/// Find the node carrying a definition's name. C-family grammars nest the
/// name inside declarators, so those are searched before direct children.
fn find_name_node<'t>(node: Node<'t>, name_kinds: &[&str]) -> Option<Node<'t>> {
    for i in 0..node.child_count() {
        let Some(child) = node.child(i) else { continue };
        match child.kind() {
            "function_declarator" | "pointer_declarator" | "reference_declarator" => {
                if let Some(found) = find_name_node(child, name_kinds) {
                    return Some(found);
                }
            }
            "qualified_identifier" => {
                if let Some(name) = child.child_by_field_name("name") {
                    return Some(name);
                }
            }
            _ => {}
        }
    }
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .find(|c| name_kinds.contains(&c.kind()))
}

/// Collect base-class names from a heritage subtree, keeping each topmost
/// matching node whole.
fn collect_base_names(node: Node<'_>, source: &[u8], out: &mut Vec<String>) {
    if matches!(
        node.kind(),
        "identifier"
            | "type_identifier"
            | "member_expression"
            | "scoped_type_identifier"
            | "scoped_identifier"
            | "generic_type"
    ) {
        out.push(node_text(node, source));
        return;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect_base_names(child, source, out);
        }
    }
}

fn collect_es_bindings(node: Node<'_>, source: &[u8], out: &mut Vec<String>) {
    for i in 0..node.child_count() {
        let Some(child) = node.child(i) else { continue };
        if child.kind() == "import_clause" {
            for j in 0..child.child_count() {
                let Some(part) = child.child(j) else { continue };
                match part.kind() {
                    "identifier" => out.push(node_text(part, source)),
                    "named_imports" => {
                        for k in 0..part.child_count() {
                            let Some(spec) = part.child(k) else { continue };
                            if spec.kind() == "import_specifier" {
                                if let Some(name) = spec
                                    .child_by_field_name("name")
                                    .or_else(|| spec.child(0))
                                {
                                    out.push(node_text(name, source));
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

fn is_js_global_call(name: &str) -> bool {
    if JS_GLOBAL_CALLS.contains(&name) {
        return true;
    }
    JS_NAMESPACE_ROOTS.iter().any(|root| name.starts_with(root))
}

/// Single-line signature: the declaration text up to its body or
/// terminator.
fn signature_of(node: Node<'_>, source: &[u8]) -> String {
    let text = node_text(node, source);
    let cut = match text.find(['{', ';']) {
        Some(idx) => &text[..idx],
        None => text.as_str(),
    };
    truncate_chars(single_line(cut).trim(), SIGNATURE_CAP)
}

fn clean_comment(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let mut line = line.trim();
        for marker in ["/**", "/*!", "/*", "*/", "///", "//!", "//"] {
            line = line.strip_prefix(marker).unwrap_or(line);
        }
        let line = line.trim_end_matches("*/").trim_start_matches('*').trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines.join("\n")
}
