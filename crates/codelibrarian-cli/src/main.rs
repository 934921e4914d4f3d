//! codelibrarian CLI entry point.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "codelibrarian",
    about = "Self-maintaining code index for LLMs and humans"
)]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialise .codelibrarian/ in the project root
    Init {
        /// Project root directory (defaults to current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Index the codebase
    Index {
        /// Reindex all files (ignore hash cache) and drop vanished files
        #[arg(long)]
        full: bool,

        /// Regenerate all embeddings
        #[arg(long)]
        reembed: bool,

        /// Index specific files only (e.g. from git hooks)
        #[arg(long)]
        files: Vec<PathBuf>,

        /// Project root (default: auto-detect)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Show index statistics
    Status {
        /// Project root
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Search the code index with a natural language or keyword query
    Search {
        query: String,

        /// Max results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,

        #[arg(long)]
        semantic_only: bool,

        #[arg(long)]
        text_only: bool,

        /// Force LLM query rewriting
        #[arg(long)]
        rewrite: bool,

        /// Project root
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Look up a symbol by name and show its full details
    Lookup {
        name: String,

        /// Project root
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Find all functions/methods that call the named symbol
    Callers {
        name: String,

        /// Call-graph hops to traverse
        #[arg(short, long, default_value = "1")]
        depth: u32,

        /// Project root
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Find all functions/methods called by the named symbol
    Callees {
        name: String,

        /// Call-graph hops to traverse
        #[arg(short, long, default_value = "1")]
        depth: u32,

        /// Project root
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Show the inheritance hierarchy for a class
    Hierarchy {
        name: String,

        /// Project root
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Start the MCP server on stdio
    Serve {
        /// Project root
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout is reserved for command output and, in
    // serve mode, JSON-RPC.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codelibrarian=info".parse()?),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Init { path } => commands::cmd_init(&path)?,
        Commands::Index {
            full,
            reembed,
            files,
            path,
        } => commands::cmd_index(full, reembed, &files, path.as_deref())?,
        Commands::Status { path } => commands::cmd_status(path.as_deref())?,
        Commands::Search {
            query,
            limit,
            semantic_only,
            text_only,
            rewrite,
            path,
        } => commands::cmd_search(
            &query,
            limit,
            semantic_only,
            text_only,
            rewrite,
            path.as_deref(),
        )?,
        Commands::Lookup { name, path } => commands::cmd_lookup(&name, path.as_deref())?,
        Commands::Callers { name, depth, path } => {
            commands::cmd_callers(&name, depth, path.as_deref())?
        }
        Commands::Callees { name, depth, path } => {
            commands::cmd_callees(&name, depth, path.as_deref())?
        }
        Commands::Hierarchy { name, path } => commands::cmd_hierarchy(&name, path.as_deref())?,
        Commands::Serve { path } => commands::cmd_serve(path.as_deref())?,
    };

    std::process::exit(exit_code);
}
