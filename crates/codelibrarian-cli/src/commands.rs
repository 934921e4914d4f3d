//! Command implementations. Each returns the process exit code: 0 on
//! success, 1 on configuration errors and on "not found" where the user
//! expected a hit.

use anyhow::Context;
use codelibrarian_core::Config;
use codelibrarian_embeddings::{EmbeddingClient, QueryRewriter};
use codelibrarian_index::Indexer;
use codelibrarian_mcp::McpServer;
use codelibrarian_search::{SearchOptions, Searcher};
use codelibrarian_store::Store;
use std::path::{Path, PathBuf};

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(root) => Config::load(root).context("failed to load configuration"),
        None => Config::load_from_cwd().context("failed to load configuration"),
    }
}

fn open_store(config: &Config) -> anyhow::Result<Store> {
    Store::open(&config.db_path(), config.embeddings.dimensions)
        .context("failed to open index database")
}

/// The store must already exist for read-only commands; a missing database
/// means `init`/`index` was never run.
fn open_existing_store(config: &Config) -> anyhow::Result<Option<Store>> {
    if !config.db_path().exists() {
        eprintln!("No index found. Run 'codelibrarian init && codelibrarian index' first.");
        return Ok(None);
    }
    Ok(Some(open_store(config)?))
}

pub fn cmd_init(path: &Path) -> anyhow::Result<i32> {
    let root = path
        .canonicalize()
        .with_context(|| format!("project root {} does not exist", path.display()))?;

    let config_file = Config::write_default(&root)?;
    println!("Created {}", config_file.display());

    let config = Config::load(&root)?;
    let _store = open_store(&config)?;
    println!("Initialised database at {}", config.db_path().display());
    println!("Done. Run 'codelibrarian index' to index the codebase.");
    Ok(0)
}

pub fn cmd_index(
    full: bool,
    reembed: bool,
    files: &[PathBuf],
    path: Option<&Path>,
) -> anyhow::Result<i32> {
    let config = load_config(path)?;
    let store = open_store(&config)?;

    let embedder = if config.embeddings.enabled {
        let client = EmbeddingClient::new(&config.embeddings)?;
        match client.check_connection() {
            Ok(message) => {
                tracing::info!("Embedding service: {message}");
                Some(client)
            }
            Err(err) => {
                eprintln!("Warning: embeddings disabled — {err}");
                None
            }
        }
    } else {
        None
    };

    let indexer = Indexer::new(&store, &config, embedder.as_ref());
    let stats = if files.is_empty() {
        indexer.index_root(full, reembed)?
    } else {
        indexer.index_files(files, full)?
    };

    println!("\nIndex complete: {stats}");
    if !stats.errors.is_empty() {
        eprintln!("\nErrors ({}):", stats.errors.len());
        for error in stats.errors.iter().take(10) {
            eprintln!("  {error}");
        }
    }
    Ok(0)
}

pub fn cmd_status(path: Option<&Path>) -> anyhow::Result<i32> {
    let config = load_config(path)?;
    let Some(store) = open_existing_store(&config)? else {
        return Ok(1);
    };

    let stats = store.stats()?;
    println!("Database: {}", config.db_path().display());
    println!("Files indexed:   {}", stats.files);
    println!("Symbols:");
    for (kind, count) in &stats.symbols {
        println!("  {kind:<12} {count:>6}");
    }
    println!("Embeddings:      {}", stats.embeddings);
    Ok(0)
}

pub fn cmd_search(
    query: &str,
    limit: usize,
    semantic_only: bool,
    text_only: bool,
    rewrite: bool,
    path: Option<&Path>,
) -> anyhow::Result<i32> {
    let config = load_config(path)?;
    let Some(store) = open_existing_store(&config)? else {
        return Ok(1);
    };

    let embedder = if config.embeddings.enabled && !text_only {
        EmbeddingClient::new(&config.embeddings).ok()
    } else {
        None
    };
    let rewriter = if config.query_rewrite.enabled {
        QueryRewriter::new(&config.query_rewrite)
    } else {
        None
    };

    let searcher = Searcher::new(&store, embedder.as_ref(), rewriter.as_ref());
    let options = SearchOptions {
        limit,
        semantic_only,
        text_only,
        rewrite,
    };
    let results = searcher.search(query, &options)?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(1);
    }

    println!("{:>6}  {:<8}  {:<40}  Location", "Score", "Kind", "Symbol");
    println!("{}", "-".repeat(80));
    for result in results {
        let symbol = &result.symbol;
        let location = format!(
            "{}:{}",
            symbol.relative_path,
            symbol.line_start.unwrap_or(0)
        );
        println!(
            "{:6.3}  {:<8}  {:<40}  {location}",
            result.score,
            symbol.kind.to_string(),
            symbol.qualified_name
        );
    }
    Ok(0)
}

pub fn cmd_lookup(name: &str, path: Option<&Path>) -> anyhow::Result<i32> {
    let config = load_config(path)?;
    let Some(store) = open_existing_store(&config)? else {
        return Ok(1);
    };

    let searcher = Searcher::new(&store, None, None);
    let results = searcher.lookup_symbol(name)?;
    if results.is_empty() {
        println!("Symbol '{name}' not found.");
        return Ok(1);
    }

    for symbol in results {
        println!("\n{}", "=".repeat(60));
        println!("Name:      {}", symbol.name);
        println!("Qualified: {}", symbol.qualified_name);
        println!("Kind:      {}", symbol.kind);
        println!(
            "File:      {}:{}-{}",
            symbol.relative_path,
            symbol.line_start.unwrap_or(0),
            symbol.line_end.unwrap_or(0)
        );
        if let Some(signature) = &symbol.signature {
            if !signature.is_empty() {
                println!("Signature: {signature}");
            }
        }
        if let Some(return_type) = &symbol.return_type {
            println!("Returns:   {return_type}");
        }
        if !symbol.parameters.is_empty() {
            println!("Parameters:");
            for parameter in &symbol.parameters {
                let mut line = format!("  {}", parameter.name);
                if let Some(annotation) = &parameter.type_annotation {
                    line.push_str(&format!(": {annotation}"));
                }
                if let Some(default) = &parameter.default {
                    line.push_str(&format!(" = {default}"));
                }
                println!("{line}");
            }
        }
        if !symbol.decorators.is_empty() {
            println!("Decorators: {}", symbol.decorators.join(", "));
        }
        if let Some(docstring) = &symbol.docstring {
            if !docstring.is_empty() {
                let shown: String = docstring.chars().take(500).collect();
                println!("\nDocstring:\n  {shown}");
            }
        }
    }
    Ok(0)
}

pub fn cmd_callers(name: &str, depth: u32, path: Option<&Path>) -> anyhow::Result<i32> {
    let config = load_config(path)?;
    let Some(store) = open_existing_store(&config)? else {
        return Ok(1);
    };
    let results = store.get_callers(name, depth)?;
    print_symbol_table(&results, &format!("No callers found for '{name}'."))
}

pub fn cmd_callees(name: &str, depth: u32, path: Option<&Path>) -> anyhow::Result<i32> {
    let config = load_config(path)?;
    let Some(store) = open_existing_store(&config)? else {
        return Ok(1);
    };
    let results = store.get_callees(name, depth)?;
    print_symbol_table(&results, &format!("No callees found for '{name}'."))
}

pub fn cmd_hierarchy(name: &str, path: Option<&Path>) -> anyhow::Result<i32> {
    let config = load_config(path)?;
    let Some(store) = open_existing_store(&config)? else {
        return Ok(1);
    };

    let hierarchy = store.get_class_hierarchy(name)?;
    let Some(class) = hierarchy.class else {
        println!("Class '{name}' not found.");
        return Ok(1);
    };

    println!("{} ({})", class.qualified_name, class.relative_path);
    println!("Parents:");
    if hierarchy.parents.is_empty() {
        println!("  (none)");
    }
    for parent in &hierarchy.parents {
        println!("  {} ({})", parent.qualified_name, parent.relative_path);
    }
    println!("Children:");
    if hierarchy.children.is_empty() {
        println!("  (none)");
    }
    for child in &hierarchy.children {
        println!("  {} ({})", child.qualified_name, child.relative_path);
    }
    Ok(0)
}

pub fn cmd_serve(path: Option<&Path>) -> anyhow::Result<i32> {
    let config = load_config(path)?;
    let server = McpServer::from_config(config)?;
    server.run()?;
    Ok(0)
}

fn print_symbol_table(
    results: &[codelibrarian_core::SymbolRecord],
    empty_message: &str,
) -> anyhow::Result<i32> {
    if results.is_empty() {
        println!("{empty_message}");
        return Ok(1);
    }
    println!("{:<10}  {:<45}  Location", "Kind", "Symbol");
    println!("{}", "-".repeat(80));
    for symbol in results {
        let location = format!(
            "{}:{}",
            symbol.relative_path,
            symbol.line_start.unwrap_or(0)
        );
        println!(
            "{:<10}  {:<45}  {location}",
            symbol.kind.to_string(),
            symbol.qualified_name
        );
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn init_creates_config_and_database() {
        let dir = tempfile::tempdir().unwrap();
        let code = cmd_init(dir.path()).unwrap();
        assert_eq!(code, 0);
        assert!(dir.path().join(".codelibrarian/config.toml").exists());
        assert!(dir.path().join(".codelibrarian/index.db").exists());
    }

    #[test]
    fn status_without_index_is_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let code = cmd_status(Some(dir.path())).unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn index_then_lookup_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("models.py"),
            "class Animal:\n    def speak(self):\n        pass\n",
        )
        .unwrap();
        cmd_init(dir.path()).unwrap();

        // Embeddings talk to a live service; disable for the test run.
        fs::write(
            dir.path().join(".codelibrarian/config.toml"),
            "[embeddings]\nenabled = false\n",
        )
        .unwrap();

        let code = cmd_index(false, false, &[], Some(dir.path())).unwrap();
        assert_eq!(code, 0);

        assert_eq!(cmd_status(Some(dir.path())).unwrap(), 0);
        assert_eq!(cmd_lookup("Animal", Some(dir.path())).unwrap(), 0);
        assert_eq!(cmd_lookup("Zebra", Some(dir.path())).unwrap(), 1);
        assert_eq!(cmd_hierarchy("Animal", Some(dir.path())).unwrap(), 0);
        assert_eq!(
            cmd_search("speak", 10, false, true, false, Some(dir.path())).unwrap(),
            0
        );
        assert_eq!(
            cmd_search("no match here at all", 10, false, true, false, Some(dir.path())).unwrap(),
            1
        );
    }
}
