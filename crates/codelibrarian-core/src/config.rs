//! Project configuration.
//!
//! Loads a TOML config from `<project>/.codelibrarian/config.toml`; every
//! section and field falls back to defaults when absent.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::LibrarianError;

/// Directory holding the config file and index database.
pub const CONFIG_DIR: &str = ".codelibrarian";

/// File extensions mapped to language tags.
pub const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("py", "python"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("rs", "rust"),
    ("java", "java"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("cxx", "cpp"),
    ("c", "cpp"),
    ("h", "cpp"),
    ("hpp", "cpp"),
];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub embeddings: EmbeddingsConfig,
    pub database: DatabaseConfig,
    pub query_rewrite: QueryRewriteConfig,

    /// Project root directory the config was loaded for.
    #[serde(skip)]
    pub project_root: PathBuf,
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub root: String,
    pub exclude: Vec<String>,
    pub languages: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            exclude: vec![
                "node_modules/".to_string(),
                ".git/".to_string(),
                "__pycache__/".to_string(),
                "target/".to_string(),
                "dist/".to_string(),
                "build/".to_string(),
                ".codelibrarian/".to_string(),
                "*.min.js".to_string(),
                "*.min.css".to_string(),
                "*.lock".to_string(),
            ],
            languages: vec![
                "python".to_string(),
                "typescript".to_string(),
                "javascript".to_string(),
                "rust".to_string(),
                "java".to_string(),
                "cpp".to_string(),
            ],
        }
    }
}

/// `[embeddings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub api_url: String,
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    /// Character cap per embedded text (~400 tokens for a 512-token window).
    pub max_chars: usize,
    pub enabled: bool,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:11434/v1/embeddings".to_string(),
            model: "nomic-embed-text-v2-moe".to_string(),
            dimensions: 768,
            batch_size: 32,
            max_chars: 1600,
            enabled: true,
        }
    }
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: format!("{CONFIG_DIR}/index.db"),
        }
    }
}

/// `[query_rewrite]` section (optional collaborator).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRewriteConfig {
    pub enabled: bool,
    pub api_url: String,
    pub model: String,
    /// Request timeout in seconds.
    pub timeout: f64,
}

impl Default for QueryRewriteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "http://localhost:11434/v1/chat/completions".to_string(),
            model: "qwen2.5:3b".to_string(),
            timeout: 5.0,
        }
    }
}

impl Config {
    /// Load configuration for the given project root, or defaults if no
    /// config file exists.
    pub fn load(project_root: &Path) -> Result<Self, LibrarianError> {
        let config_file = project_root.join(CONFIG_DIR).join("config.toml");
        let mut config = if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)?;
            toml::from_str(&content).map_err(|e| LibrarianError::Config(e.to_string()))?
        } else {
            Self::default()
        };
        config.project_root = project_root.to_path_buf();
        Ok(config)
    }

    /// Load from the current directory, walking up to the project root.
    pub fn load_from_cwd() -> Result<Self, LibrarianError> {
        let cwd = std::env::current_dir()?;
        let root = find_project_root(&cwd);
        Self::load(&root)
    }

    /// Write the default config TOML to `<root>/.codelibrarian/config.toml`.
    pub fn write_default(project_root: &Path) -> Result<PathBuf, LibrarianError> {
        let config_dir = project_root.join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir)?;
        let config_file = config_dir.join("config.toml");
        if !config_file.exists() {
            std::fs::write(&config_file, DEFAULT_CONFIG_TOML)?;
        }
        Ok(config_file)
    }

    /// Root directory to index.
    pub fn index_root(&self) -> PathBuf {
        let root = Path::new(&self.index.root);
        if root.as_os_str() == "." {
            self.project_root.clone()
        } else {
            self.project_root.join(root)
        }
    }

    /// Absolute path of the index database.
    pub fn db_path(&self) -> PathBuf {
        let p = PathBuf::from(&self.database.path);
        if p.is_absolute() {
            p
        } else {
            self.project_root.join(p)
        }
    }

    /// Compile the exclude patterns into a matcher.
    pub fn exclude_matcher(&self) -> Result<ExcludeMatcher, LibrarianError> {
        ExcludeMatcher::new(&self.index.exclude)
    }

    /// Detect the language tag for a file, if its extension maps to one of
    /// the enabled languages.
    pub fn language_for_file(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        let lang = LANGUAGE_EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, l)| *l)?;
        if self.index.languages.iter().any(|l| l == lang) {
            Some(lang)
        } else {
            None
        }
    }
}

/// Compiled exclude-glob matcher.
///
/// Each configured pattern matches both a path component (directories like
/// `node_modules/`) and a file name glob (`*.min.js`), anywhere in the tree.
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    set: GlobSet,
}

impl ExcludeMatcher {
    pub fn new(patterns: &[String]) -> Result<Self, LibrarianError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let trimmed = pattern.trim_end_matches('/');
            if trimmed.is_empty() {
                continue;
            }
            for glob in [format!("**/{trimmed}"), format!("**/{trimmed}/**")] {
                builder.add(
                    Glob::new(&glob).map_err(|e| LibrarianError::Config(e.to_string()))?,
                );
            }
        }
        let set = builder
            .build()
            .map_err(|e| LibrarianError::Config(e.to_string()))?;
        Ok(Self { set })
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.set.is_match(path)
    }
}

/// Walk up from `start` to find the directory containing `.codelibrarian/`
/// or `.git/`; falls back to `start` itself.
pub fn find_project_root(start: &Path) -> PathBuf {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_DIR).exists() || current.join(".git").exists() {
            return current;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return start.to_path_buf(),
        }
    }
}

/// Config template written by `codelibrarian init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"[index]
root = "."
exclude = [
    "node_modules/",
    ".git/",
    "__pycache__/",
    "target/",
    "dist/",
    "build/",
    ".codelibrarian/",
    "*.min.js",
]
languages = ["python", "typescript", "javascript", "rust", "java", "cpp"]

[embeddings]
api_url    = "http://localhost:11434/v1/embeddings"
model      = "nomic-embed-text-v2-moe"
dimensions = 768
batch_size = 32
max_chars  = 1600
enabled    = true

[database]
path = ".codelibrarian/index.db"

[query_rewrite]
enabled = false
api_url = "http://localhost:11434/v1/chat/completions"
model   = "qwen2.5:3b"
timeout = 5.0
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("parse back");
        assert_eq!(parsed.embeddings.dimensions, 768);
        assert_eq!(parsed.embeddings.batch_size, 32);
        assert!(parsed.embeddings.enabled);
        assert!(!parsed.query_rewrite.enabled);
    }

    #[test]
    fn partial_toml_uses_defaults_for_missing_fields() {
        let partial = r#"
[embeddings]
dimensions = 4
enabled = false
"#;
        let config: Config = toml::from_str(partial).expect("partial parse");
        assert_eq!(config.embeddings.dimensions, 4);
        assert!(!config.embeddings.enabled);
        assert_eq!(config.embeddings.batch_size, 32);
        assert_eq!(config.index.root, ".");
    }

    #[test]
    fn default_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TOML).expect("template parse");
        assert_eq!(config.database.path, ".codelibrarian/index.db");
        assert!((config.query_rewrite.timeout - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.project_root, dir.path());
        assert_eq!(config.embeddings.dimensions, 768);
    }

    #[test]
    fn load_reads_user_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            "[index]\nlanguages = [\"python\"]\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.index.languages, vec!["python"]);
        // Untouched sections keep defaults
        assert_eq!(config.embeddings.max_chars, 1600);
    }

    #[test]
    fn db_path_resolves_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(
            config.db_path(),
            dir.path().join(".codelibrarian/index.db")
        );
    }

    #[test]
    fn language_detection_respects_enabled_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load(dir.path()).unwrap();
        assert_eq!(config.language_for_file(Path::new("a/b.py")), Some("python"));
        assert_eq!(config.language_for_file(Path::new("a/b.rs")), Some("rust"));
        assert_eq!(config.language_for_file(Path::new("a/b.tsx")), Some("typescript"));
        assert_eq!(config.language_for_file(Path::new("a/b.txt")), None);

        config.index.languages = vec!["python".to_string()];
        assert_eq!(config.language_for_file(Path::new("a/b.rs")), None);
    }

    #[test]
    fn exclude_matcher_matches_directories_and_globs() {
        let matcher = ExcludeMatcher::new(&[
            "node_modules/".to_string(),
            "__pycache__/".to_string(),
            "*.min.js".to_string(),
        ])
        .unwrap();

        assert!(matcher.is_excluded(Path::new("a/node_modules/lib/index.js")));
        assert!(matcher.is_excluded(Path::new("pkg/__pycache__")));
        assert!(matcher.is_excluded(Path::new("dist/app.min.js")));
        assert!(!matcher.is_excluded(Path::new("src/main.py")));
        assert!(!matcher.is_excluded(Path::new("src/app.js")));
    }

    #[test]
    fn find_project_root_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let nested = dir.path().join("src/deep/nested");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_project_root(&nested), dir.path());
    }

    #[test]
    fn write_default_creates_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::write_default(dir.path()).unwrap();
        assert!(path.exists());
        std::fs::write(&path, "[index]\nroot = \"src\"\n").unwrap();
        // A second call must not clobber the user's file.
        Config::write_default(dir.path()).unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.index.root, "src");
    }
}
