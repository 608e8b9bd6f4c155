//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/bdx.sqlite"
//!
//! [git]
//! root = "./repos"
//! exclude_globs = ["**/vendor/**"]
//!
//! [search]
//! page_limit = 20
//! max_limit = 100
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use blobdex_core::preview::PreviewParams;
use blobdex_core::IndexerOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub git: GitConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    /// Repositories live at `<root>/<organization>/<project>/<repository>[.git]`.
    pub root: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}
fn default_batch_size() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Largest page size a client may request.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_preview_context_lines")]
    pub preview_context_lines: usize,
    #[serde(default = "default_max_previews")]
    pub max_previews: usize,
    /// Preview lines longer than this are cut around their first match.
    #[serde(default = "default_preview_max_line_bytes")]
    pub preview_max_line_bytes: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            max_limit: default_max_limit(),
            preview_context_lines: default_preview_context_lines(),
            max_previews: default_max_previews(),
            preview_max_line_bytes: default_preview_max_line_bytes(),
        }
    }
}

fn default_page_limit() -> usize {
    20
}
fn default_max_limit() -> usize {
    100
}
fn default_preview_context_lines() -> usize {
    3
}
fn default_max_previews() -> usize {
    5
}
fn default_preview_max_line_bytes() -> usize {
    240
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    pub fn indexer_options(&self) -> IndexerOptions {
        IndexerOptions {
            page_limit: self.search.page_limit,
            max_limit: self.search.max_limit,
            preview: PreviewParams {
                context_lines: self.search.preview_context_lines,
                max_previews: self.search.max_previews,
                max_line_bytes: self.search.preview_max_line_bytes,
            },
            ..IndexerOptions::default()
        }
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.search.page_limit == 0 {
        anyhow::bail!("search.page_limit must be >= 1");
    }
    if config.search.max_limit < config.search.page_limit {
        anyhow::bail!("search.max_limit must be >= search.page_limit");
    }
    if config.search.max_previews == 0 {
        anyhow::bail!("search.max_previews must be >= 1");
    }
    if config.search.preview_max_line_bytes == 0 {
        anyhow::bail!("search.preview_max_line_bytes must be >= 1");
    }
    if config.git.batch_size == 0 {
        anyhow::bail!("git.batch_size must be >= 1");
    }

    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config(
            r#"
            [db]
            path = "data/bdx.sqlite"

            [git]
            root = "repos"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.search.page_limit, 20);
        assert_eq!(cfg.git.batch_size, 500);
        assert_eq!(cfg.git.max_file_bytes, 1024 * 1024);
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");

        let opts = cfg.indexer_options();
        assert_eq!(opts.page_limit, 20);
        assert_eq!(opts.max_limit, 100);
        assert_eq!(opts.preview.context_lines, 3);
        assert_eq!(opts.preview.max_line_bytes, 240);
    }

    #[test]
    fn test_rejects_zero_page_limit() {
        let err = parse_config(
            r#"
            [db]
            path = "x"
            [git]
            root = "r"
            [search]
            page_limit = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("page_limit"));
    }

    #[test]
    fn test_rejects_max_limit_below_page_limit() {
        let err = parse_config(
            r#"
            [db]
            path = "x"
            [git]
            root = "r"
            [search]
            page_limit = 50
            max_limit = 10
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_limit"));
    }

    #[test]
    fn test_rejects_missing_git_section() {
        assert!(parse_config("[db]\npath = \"x\"\n").is_err());
    }
}
