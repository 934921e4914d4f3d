//! codelibrarian-mcp: MCP server over stdio (JSON-RPC 2.0).
//!
//! Exposes the index to LLM clients through twelve tools: search_code,
//! lookup_symbol, list_symbols, get_callers, get_callees, count_callers,
//! count_callees, get_class_hierarchy, get_file_imports, plus the three
//! Mermaid diagram generators.
//!
//! Transport: newline-delimited JSON-RPC messages on stdin/stdout. All
//! logging goes to stderr; stdout is reserved for JSON-RPC only.

pub mod diagrams;
mod tools;
mod types;

pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolContent, ToolResult};

use codelibrarian_core::Config;
use codelibrarian_embeddings::{EmbeddingClient, QueryRewriter};
use codelibrarian_store::Store;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};

/// MCP server holding the store and optional HTTP collaborators.
///
/// Tool calls are dispatched sequentially from the stdio loop, so a single
/// store handle serves every request.
pub struct McpServer {
    pub name: String,
    pub version: String,
    config: Config,
    store: Store,
    embedder: Option<EmbeddingClient>,
    rewriter: Option<QueryRewriter>,
}

impl McpServer {
    /// Build a server from loaded configuration, opening the index database
    /// and wiring the embedding/rewriter clients the config enables.
    pub fn from_config(config: Config) -> Result<Self, codelibrarian_core::LibrarianError> {
        let store = Store::open(&config.db_path(), config.embeddings.dimensions)?;
        let embedder = if config.embeddings.enabled {
            EmbeddingClient::new(&config.embeddings).ok()
        } else {
            None
        };
        let rewriter = if config.query_rewrite.enabled {
            QueryRewriter::new(&config.query_rewrite)
        } else {
            None
        };
        Ok(Self {
            name: "codelibrarian".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            store,
            embedder,
            rewriter,
        })
    }

    /// A server over an existing store (used by tests).
    pub fn with_store(config: Config, store: Store) -> Self {
        Self {
            name: "codelibrarian".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            store,
            embedder: None,
            rewriter: None,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn embedder(&self) -> Option<&EmbeddingClient> {
        self.embedder.as_ref()
    }

    pub(crate) fn rewriter(&self) -> Option<&QueryRewriter> {
        self.rewriter.as_ref()
    }

    /// Run the server: read newline-delimited JSON-RPC from stdin, write
    /// responses to stdout. Blocks until stdin closes.
    pub fn run(&self) -> io::Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut stdout = stdout.lock();

        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(err) => {
                    let response =
                        JsonRpcResponse::error(Value::Null, -32700, format!("Parse error: {err}"));
                    write_response(&mut stdout, &response)?;
                    continue;
                }
            };

            // Notifications (no id) get no response.
            let Some(id) = request.id else {
                self.handle_notification(&request.method);
                continue;
            };

            let response = self.handle_request(&request.method, request.params.as_ref(), id);
            write_response(&mut stdout, &response)?;
        }

        Ok(())
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" => {
                tracing::info!("Client initialized, codelibrarian MCP server ready");
            }
            "notifications/cancelled" => {
                tracing::debug!("Request cancelled by client");
            }
            _ => {
                tracing::debug!("Unknown notification: {method}");
            }
        }
    }

    pub fn handle_request(
        &self,
        method: &str,
        params: Option<&Value>,
        id: Value,
    ) -> JsonRpcResponse {
        match method {
            "initialize" => self.handle_initialize(id),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tool_definitions() })),
            "tools/call" => self.handle_tools_call(id, params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            _ => JsonRpcResponse::error(id, -32601, format!("Method not found: {method}")),
        }
    }

    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": { "listChanged": false }
                },
                "serverInfo": {
                    "name": self.name,
                    "version": self.version
                }
            }),
        )
    }

    fn handle_tools_call(&self, id: Value, params: Option<&Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, -32602, "Missing params");
        };
        let tool_name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let result = self.dispatch_tool(tool_name, &arguments);
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => JsonRpcResponse::error(id, -32603, format!("Serialization error: {err}")),
        }
    }
}

pub(crate) fn write_response<W: Write>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> io::Result<()> {
    let serialized = serde_json::to_string(response)
        .unwrap_or_else(|_| r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"serialization failure"}}"#.to_string());
    writeln!(writer, "{serialized}")?;
    writer.flush()
}

/// Tool schemas advertised by `tools/list`.
fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "search_code",
            "description": "Hybrid semantic + full-text search across all indexed code symbols. Returns functions, methods, and classes matching the query with file path and line number.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Natural language or keyword search query" },
                    "limit": { "type": "integer", "default": 10, "description": "Maximum number of results to return" },
                    "mode": {
                        "type": "string",
                        "enum": ["hybrid", "semantic", "fulltext"],
                        "default": "hybrid",
                        "description": "Search mode"
                    },
                    "rewrite": { "type": "boolean", "default": false, "description": "Force LLM-based query rewriting for better natural language understanding" }
                },
                "required": ["query"]
            }
        }),
        json!({
            "name": "lookup_symbol",
            "description": "Look up a code symbol by exact name or qualified name. Returns full signature, docstring, parameters, return type, file path and line number.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Symbol name (e.g. 'parse_config' or 'MyClass.my_method')" }
                },
                "required": ["name"]
            }
        }),
        json!({
            "name": "list_symbols",
            "description": "List symbols filtered by kind, name pattern, or file. Useful for structural queries like 'all classes in module x'.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "kind": { "type": "string", "enum": ["function", "method", "class", "module"], "description": "Filter by symbol kind" },
                    "pattern": { "type": "string", "description": "SQL LIKE pattern for name filtering (e.g. 'get_%')" },
                    "file_path": { "type": "string", "description": "Filter to symbols in this file" }
                }
            }
        }),
        json!({
            "name": "get_callers",
            "description": "Find all functions/methods that call the specified symbol.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "qualified_name": { "type": "string", "description": "Qualified name of the symbol" },
                    "depth": { "type": "integer", "default": 1, "description": "How many call-graph hops to traverse" }
                },
                "required": ["qualified_name"]
            }
        }),
        json!({
            "name": "get_callees",
            "description": "Find all functions/methods called by the specified symbol.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "qualified_name": { "type": "string", "description": "Qualified name of the symbol" },
                    "depth": { "type": "integer", "default": 1, "description": "How many call-graph hops to traverse" }
                },
                "required": ["qualified_name"]
            }
        }),
        json!({
            "name": "count_callers",
            "description": "Return the number of direct callers of a symbol. Efficient alternative to get_callers when only the count is needed.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "qualified_name": { "type": "string", "description": "Qualified name of the symbol" }
                },
                "required": ["qualified_name"]
            }
        }),
        json!({
            "name": "count_callees",
            "description": "Return the number of direct callees of a symbol. Efficient alternative to get_callees when only the count is needed.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "qualified_name": { "type": "string", "description": "Qualified name of the symbol" }
                },
                "required": ["qualified_name"]
            }
        }),
        json!({
            "name": "get_class_hierarchy",
            "description": "Get the inheritance hierarchy for a class: its parent classes and all known subclasses.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "class_name": { "type": "string", "description": "Class name or qualified class name" }
                },
                "required": ["class_name"]
            }
        }),
        json!({
            "name": "get_file_imports",
            "description": "Show what modules a file imports and what other files import it.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Path to the file (relative or absolute)" }
                },
                "required": ["file_path"]
            }
        }),
        json!({
            "name": "generate_class_diagram",
            "description": "Generate a Mermaid class hierarchy diagram for a given class, showing parents, children, and methods.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "class_name": { "type": "string", "description": "Class name or qualified class name" }
                },
                "required": ["class_name"]
            }
        }),
        json!({
            "name": "generate_call_graph",
            "description": "Generate a Mermaid call graph diagram rooted at a function/method, showing caller or callee relationships.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "qualified_name": { "type": "string", "description": "Qualified name of the root symbol" },
                    "depth": { "type": "integer", "default": 2, "description": "Number of hops to traverse" },
                    "direction": {
                        "type": "string",
                        "enum": ["callees", "callers"],
                        "default": "callees",
                        "description": "Traverse forward (callees) or backward (callers)"
                    }
                },
                "required": ["qualified_name"]
            }
        }),
        json!({
            "name": "generate_import_graph",
            "description": "Generate a Mermaid diagram of file-to-file import dependencies, optionally scoped to a single file.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "description": "Optional file path to scope the graph to" }
                }
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use codelibrarian_core::Config;
    use codelibrarian_store::Store;
    use serde_json::json;

    fn server() -> McpServer {
        McpServer::with_store(Config::default(), Store::open_in_memory(4).unwrap())
    }

    #[test]
    fn initialize_reports_server_info() {
        let server = server();
        let response = server.handle_request("initialize", None, json!(1));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["result"]["serverInfo"]["name"], "codelibrarian");
        assert_eq!(value["result"]["protocolVersion"], "2024-11-05");
    }

    #[test]
    fn tools_list_contains_all_tools() {
        let server = server();
        let response = server.handle_request("tools/list", None, json!(2));
        let value = serde_json::to_value(&response).unwrap();
        let tools = value["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 12);
        let names: Vec<&str> = tools
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"search_code"));
        assert!(names.contains(&"get_class_hierarchy"));
        assert!(names.contains(&"generate_import_graph"));
    }

    #[test]
    fn unknown_method_is_jsonrpc_error() {
        let server = server();
        let response = server.handle_request("bogus/method", None, json!(3));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"]["code"], -32601);
    }

    #[test]
    fn ping_returns_empty_object() {
        let server = server();
        let response = server.handle_request("ping", None, json!(4));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["result"], json!({}));
    }

    #[test]
    fn tools_call_requires_params() {
        let server = server();
        let response = server.handle_request("tools/call", None, json!(5));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"]["code"], -32602);
    }
}
