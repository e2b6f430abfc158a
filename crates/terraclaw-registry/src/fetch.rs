//! Template fetchers — pluggable by source scheme.
//!
//! Each fetcher materializes a source into a destination directory and
//! returns the resolved version string: the commit hash for git sources,
//! a content digest otherwise. The registry keys dispatch off the source
//! URL, never off fetcher internals.

use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use terraclaw_core::{Result, TerraclawError};
use walkdir::WalkDir;

/// Directories never copied into or hashed in the cache.
const SKIP_DIRS: [&str; 2] = [".git", ".terraform"];

/// A capability that can materialize one class of template source.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Whether this fetcher recognizes the source location.
    fn handles(&self, source: &str) -> bool;

    /// Fetch `source` (at `git_ref` where applicable) into `dest`.
    /// Returns the resolved version. `dest` exists and is empty.
    async fn fetch(&self, source: &str, git_ref: Option<&str>, dest: &Path) -> Result<String>;
}

fn skip_entry(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|n| SKIP_DIRS.contains(&n))
}

/// Recursive copy of `src` into `dest`, skipping VCS/tool internals.
pub(crate) fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).into_iter().filter_entry(|e| !skip_entry(e)) {
        let entry = entry.map_err(|e| TerraclawError::Fetch(format!("walk {}: {e}", src.display())))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| TerraclawError::Fetch(format!("walk {}: {e}", src.display())))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Content digest of a directory tree: sha256 over sorted relative paths
/// and file bytes, so the version is stable across copies.
pub(crate) fn tree_digest(dir: &Path) -> Result<String> {
    let mut files: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| !skip_entry(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();

    let mut hasher = Sha256::new();
    for path in files {
        if let Ok(rel) = path.strip_prefix(dir) {
            hasher.update(rel.to_string_lossy().as_bytes());
        }
        hasher.update(std::fs::read(&path)?);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

// ─── Local paths ──────────────────────────────────────────────

/// Copies a local directory (`file://` URL or bare path).
#[derive(Debug, Default)]
pub struct LocalFetcher;

impl LocalFetcher {
    fn source_path(source: &str) -> &str {
        source.strip_prefix("file://").unwrap_or(source)
    }
}

#[async_trait]
impl Fetcher for LocalFetcher {
    fn handles(&self, source: &str) -> bool {
        source.starts_with("file://") || !source.contains("://")
    }

    async fn fetch(&self, source: &str, _git_ref: Option<&str>, dest: &Path) -> Result<String> {
        let src = Path::new(Self::source_path(source));
        if !src.is_dir() {
            return Err(TerraclawError::Fetch(format!(
                "local template source '{}' is not a directory",
                src.display()
            )));
        }
        copy_tree(src, dest)?;
        tree_digest(dest)
    }
}

// ─── Git repositories ─────────────────────────────────────────

/// Shallow-clones a git repository (`git://`, `git+https://`, or `*.git`).
#[derive(Debug, Default)]
pub struct GitFetcher;

impl GitFetcher {
    fn clone_url(source: &str) -> &str {
        source.strip_prefix("git+").unwrap_or(source)
    }

    async fn git(args: &[&str], cwd: Option<&Path>) -> Result<String> {
        let mut cmd = tokio::process::Command::new("git");
        cmd.args(args).kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        let out = cmd
            .output()
            .await
            .map_err(|e| TerraclawError::Fetch(format!("failed to run git: {e}")))?;
        if !out.status.success() {
            return Err(TerraclawError::Fetch(format!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    fn handles(&self, source: &str) -> bool {
        source.starts_with("git://")
            || source.starts_with("git+")
            || source.trim_end_matches('/').ends_with(".git")
    }

    async fn fetch(&self, source: &str, git_ref: Option<&str>, dest: &Path) -> Result<String> {
        let url = Self::clone_url(source);
        let dest_str = dest.to_string_lossy().into_owned();

        let mut args = vec!["clone", "--depth", "1", "--quiet"];
        if let Some(r) = git_ref {
            args.extend(["--branch", r]);
        }
        args.extend([url, dest_str.as_str()]);
        Self::git(&args, None).await?;

        let head = Self::git(&["rev-parse", "HEAD"], Some(dest)).await?;

        // The cache holds materialized content only.
        std::fs::remove_dir_all(dest.join(".git")).ok();
        Ok(head)
    }
}

// ─── Remote files ─────────────────────────────────────────────

/// Downloads a single remote configuration file over HTTP(S) into `main.tf`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn handles(&self, source: &str) -> bool {
        (source.starts_with("http://") || source.starts_with("https://"))
            && !source.trim_end_matches('/').ends_with(".git")
    }

    async fn fetch(&self, source: &str, _git_ref: Option<&str>, dest: &Path) -> Result<String> {
        let resp = self
            .client
            .get(source)
            .send()
            .await
            .map_err(|e| TerraclawError::Fetch(format!("GET {source}: {e}")))?;
        if !resp.status().is_success() {
            return Err(TerraclawError::Fetch(format!(
                "GET {source}: status {}",
                resp.status()
            )));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| TerraclawError::Fetch(format!("GET {source}: {e}")))?;

        std::fs::write(dest.join("main.tf"), &body)?;
        Ok(format!("sha256:{:x}", Sha256::digest(&body)))
    }
}
