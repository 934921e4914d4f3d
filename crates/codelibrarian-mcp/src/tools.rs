//! Per-tool handlers. Missing targets return empty sequences, never
//! errors.

use crate::diagrams;
use crate::types::ToolResult;
use crate::McpServer;
use codelibrarian_core::LibrarianError;
use codelibrarian_search::{SearchOptions, Searcher};
use serde_json::{json, Value};
use std::path::Path;

impl McpServer {
    pub(crate) fn dispatch_tool(&self, name: &str, args: &Value) -> ToolResult {
        let result = match name {
            "search_code" => self.tool_search_code(args),
            "lookup_symbol" => self.tool_lookup_symbol(args),
            "list_symbols" => self.tool_list_symbols(args),
            "get_callers" => self.tool_get_callers(args),
            "get_callees" => self.tool_get_callees(args),
            "count_callers" => self.tool_count_callers(args),
            "count_callees" => self.tool_count_callees(args),
            "get_class_hierarchy" => self.tool_get_class_hierarchy(args),
            "get_file_imports" => self.tool_get_file_imports(args),
            "generate_class_diagram" => self.tool_generate_class_diagram(args),
            "generate_call_graph" => self.tool_generate_call_graph(args),
            "generate_import_graph" => self.tool_generate_import_graph(args),
            _ => return ToolResult::tool_error(format!("Unknown tool: {name}")),
        };
        match result {
            Ok(value) => ToolResult::json(&value),
            Err(err) => ToolResult::tool_error(err.to_string()),
        }
    }

    fn searcher(&self) -> Searcher<'_> {
        Searcher::new(self.store(), self.embedder(), self.rewriter())
    }

    fn tool_search_code(&self, args: &Value) -> Result<Value, LibrarianError> {
        let query = str_arg(args, "query").unwrap_or_default();
        let limit = usize_arg(args, "limit").unwrap_or(10);
        let mode = str_arg(args, "mode").unwrap_or("hybrid");
        let rewrite = args
            .get("rewrite")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let options = SearchOptions {
            limit,
            semantic_only: mode == "semantic",
            text_only: mode == "fulltext",
            rewrite,
        };
        let results = self.searcher().search(query, &options)?;
        Ok(serde_json::to_value(results)?)
    }

    fn tool_lookup_symbol(&self, args: &Value) -> Result<Value, LibrarianError> {
        let name = str_arg(args, "name").unwrap_or_default();
        let symbols = self.searcher().lookup_symbol(name)?;
        Ok(serde_json::to_value(symbols)?)
    }

    fn tool_list_symbols(&self, args: &Value) -> Result<Value, LibrarianError> {
        let symbols = self.searcher().list_symbols(
            str_arg(args, "kind"),
            str_arg(args, "pattern"),
            str_arg(args, "file_path"),
        )?;
        Ok(serde_json::to_value(symbols)?)
    }

    fn tool_get_callers(&self, args: &Value) -> Result<Value, LibrarianError> {
        let qname = str_arg(args, "qualified_name").unwrap_or_default();
        let depth = u32_arg(args, "depth").unwrap_or(1);
        let symbols = self.searcher().get_callers(qname, depth)?;
        Ok(serde_json::to_value(symbols)?)
    }

    fn tool_get_callees(&self, args: &Value) -> Result<Value, LibrarianError> {
        let qname = str_arg(args, "qualified_name").unwrap_or_default();
        let depth = u32_arg(args, "depth").unwrap_or(1);
        let symbols = self.searcher().get_callees(qname, depth)?;
        Ok(serde_json::to_value(symbols)?)
    }

    fn tool_count_callers(&self, args: &Value) -> Result<Value, LibrarianError> {
        let qname = str_arg(args, "qualified_name").unwrap_or_default();
        let count = self.store().count_callers(qname)?;
        Ok(json!({ "count": count, "qualified_name": qname }))
    }

    fn tool_count_callees(&self, args: &Value) -> Result<Value, LibrarianError> {
        let qname = str_arg(args, "qualified_name").unwrap_or_default();
        let count = self.store().count_callees(qname)?;
        Ok(json!({ "count": count, "qualified_name": qname }))
    }

    fn tool_get_class_hierarchy(&self, args: &Value) -> Result<Value, LibrarianError> {
        let name = str_arg(args, "class_name").unwrap_or_default();
        let hierarchy = self.store().get_class_hierarchy(name)?;
        Ok(serde_json::to_value(hierarchy)?)
    }

    fn tool_get_file_imports(&self, args: &Value) -> Result<Value, LibrarianError> {
        let file_path = str_arg(args, "file_path").unwrap_or_default();
        let resolved = self.resolve_file_path(file_path);
        let imports = self.store().get_file_imports(&resolved)?;
        Ok(serde_json::to_value(imports)?)
    }

    fn tool_generate_class_diagram(&self, args: &Value) -> Result<Value, LibrarianError> {
        let name = str_arg(args, "class_name").unwrap_or_default();
        let diagram = diagrams::mermaid_class_diagram(self.store(), name)?;
        if diagram.is_empty() {
            Ok(json!({ "error": "Class not found" }))
        } else {
            Ok(json!({ "mermaid": diagram }))
        }
    }

    fn tool_generate_call_graph(&self, args: &Value) -> Result<Value, LibrarianError> {
        let qname = str_arg(args, "qualified_name").unwrap_or_default();
        let depth = u32_arg(args, "depth").unwrap_or(2);
        let callers = str_arg(args, "direction") == Some("callers");
        let diagram = diagrams::mermaid_call_graph(self.store(), qname, depth, callers)?;
        if diagram.is_empty() {
            Ok(json!({ "error": "Symbol not found or no edges" }))
        } else {
            Ok(json!({ "mermaid": diagram }))
        }
    }

    fn tool_generate_import_graph(&self, args: &Value) -> Result<Value, LibrarianError> {
        let file_path = str_arg(args, "file_path");
        let diagram = diagrams::mermaid_import_graph(self.store(), file_path)?;
        if diagram.is_empty() {
            Ok(json!({ "error": "No import edges found" }))
        } else {
            Ok(json!({ "mermaid": diagram }))
        }
    }

    /// Resolve a relative tool argument against the index root so both
    /// relative and absolute paths find the file row.
    fn resolve_file_path(&self, file_path: &str) -> String {
        let path = Path::new(file_path);
        if path.is_absolute() || self.config().project_root.as_os_str().is_empty() {
            file_path.to_string()
        } else {
            self.config()
                .index_root()
                .join(path)
                .to_string_lossy()
                .into_owned()
        }
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn usize_arg(args: &Value, key: &str) -> Option<usize> {
    args.get(key).and_then(|v| v.as_u64()).map(|v| v as usize)
}

fn u32_arg(args: &Value, key: &str) -> Option<u32> {
    args.get(key).and_then(|v| v.as_u64()).map(|v| v as u32)
}
