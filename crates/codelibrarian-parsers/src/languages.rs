//! Per-language node-type maps for the generic extractor.

use crate::generic::{CallStyle, ImportStyle, LangSpec};

/// All languages the generic extractor covers.
pub fn all_specs() -> Vec<LangSpec> {
    vec![typescript(), javascript(), rust(), java(), cpp()]
}

fn typescript() -> LangSpec {
    LangSpec {
        name: "typescript",
        extensions: &["ts", "tsx"],
        language: || tree_sitter_typescript::LANGUAGE_TSX.into(),
        separator: ".",
        function_kinds: &[
            "function_declaration",
            "generator_function_declaration",
            "method_definition",
        ],
        class_kinds: &["class_declaration"],
        container_kinds: &[],
        name_kinds: &["identifier", "type_identifier", "property_identifier"],
        param_list_kinds: &["formal_parameters"],
        heritage_kinds: &["class_heritage"],
        comment_kinds: &["comment"],
        imports: ImportStyle::EsModule,
        calls: CallStyle::EsCall,
    }
}

fn javascript() -> LangSpec {
    LangSpec {
        name: "javascript",
        extensions: &["js", "jsx", "mjs"],
        language: || tree_sitter_javascript::LANGUAGE.into(),
        separator: ".",
        function_kinds: &[
            "function_declaration",
            "generator_function_declaration",
            "method_definition",
        ],
        class_kinds: &["class_declaration"],
        container_kinds: &[],
        name_kinds: &["identifier", "property_identifier"],
        param_list_kinds: &["formal_parameters"],
        heritage_kinds: &["class_heritage"],
        comment_kinds: &["comment"],
        imports: ImportStyle::EsModule,
        calls: CallStyle::EsCall,
    }
}

fn rust() -> LangSpec {
    LangSpec {
        name: "rust",
        extensions: &["rs"],
        language: || tree_sitter_rust::LANGUAGE.into(),
        separator: "::",
        function_kinds: &["function_item", "function_signature_item"],
        class_kinds: &["struct_item", "enum_item", "trait_item"],
        container_kinds: &["impl_item"],
        name_kinds: &["identifier", "type_identifier"],
        param_list_kinds: &["parameters"],
        heritage_kinds: &[],
        comment_kinds: &["line_comment", "block_comment"],
        imports: ImportStyle::RustUse,
        calls: CallStyle::None,
    }
}

fn java() -> LangSpec {
    LangSpec {
        name: "java",
        extensions: &["java"],
        language: || tree_sitter_java::LANGUAGE.into(),
        separator: ".",
        function_kinds: &["method_declaration", "constructor_declaration"],
        class_kinds: &[
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
        ],
        container_kinds: &[],
        name_kinds: &["identifier"],
        param_list_kinds: &["formal_parameters"],
        heritage_kinds: &["superclass", "super_interfaces"],
        comment_kinds: &["line_comment", "block_comment", "comment"],
        imports: ImportStyle::JavaImport,
        calls: CallStyle::None,
    }
}

fn cpp() -> LangSpec {
    LangSpec {
        name: "cpp",
        extensions: &["cpp", "cc", "cxx", "c", "h", "hpp"],
        language: || tree_sitter_cpp::LANGUAGE.into(),
        separator: "::",
        function_kinds: &["function_definition"],
        class_kinds: &["class_specifier", "struct_specifier"],
        container_kinds: &[],
        name_kinds: &["identifier", "type_identifier", "field_identifier"],
        param_list_kinds: &["parameter_list"],
        heritage_kinds: &["base_class_clause"],
        comment_kinds: &["comment"],
        imports: ImportStyle::CppInclude,
        calls: CallStyle::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specs_cover_configured_languages() {
        let names: Vec<&str> = all_specs().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["typescript", "javascript", "rust", "java", "cpp"]
        );
    }

    #[test]
    fn extensions_do_not_overlap() {
        let mut seen = std::collections::HashSet::new();
        for spec in all_specs() {
            for ext in spec.extensions {
                assert!(seen.insert(*ext), "duplicate extension {ext}");
            }
        }
    }
}
