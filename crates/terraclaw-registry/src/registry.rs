//! The template registry — add/list/get/update/remove/validate/resolve.
//!
//! Cache mutation is funneled through this type: fetches land in a staging
//! directory and are swapped in only on full success, so a failed update
//! leaves the previous cache byte-identical. Readers (`validate`, `resolve`)
//! only ever see a complete cache directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use terraclaw_core::{Result, TerraclawError};
use walkdir::WalkDir;

use crate::db::RegistryDb;
use crate::fetch::{Fetcher, GitFetcher, HttpFetcher, LocalFetcher, copy_tree};
use crate::record::TemplateRecord;

/// Manages template records and their local cache directories.
pub struct TemplateRegistry {
    db: Mutex<RegistryDb>,
    templates_dir: PathBuf,
    fetchers: Vec<Box<dyn Fetcher>>,
    fetch_timeout: Duration,
}

impl TemplateRegistry {
    /// Create a registry with the default fetcher set (local, git, http).
    pub fn new(db: RegistryDb, templates_dir: PathBuf, fetch_timeout: Duration) -> Self {
        Self {
            db: Mutex::new(db),
            templates_dir,
            // Order matters: git claims `*.git` URLs before http sees them.
            fetchers: vec![
                Box::new(GitFetcher),
                Box::new(HttpFetcher::new()),
                Box::new(LocalFetcher),
            ],
            fetch_timeout,
        }
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.templates_dir.join(name)
    }

    /// Cache directory adjusted for the template's recorded sub-path.
    fn content_root(&self, rec: &TemplateRecord) -> PathBuf {
        match rec.sub_path.as_deref() {
            Some(sub) if !sub.is_empty() => self.cache_dir(&rec.name).join(sub),
            _ => self.cache_dir(&rec.name),
        }
    }

    fn with_db<T>(&self, f: impl FnOnce(&RegistryDb) -> Result<T>) -> Result<T> {
        let db = self
            .db
            .lock()
            .map_err(|_| TerraclawError::Persistence("registry db lock poisoned".into()))?;
        f(&db)
    }

    /// Fetch `source` into a fresh staging directory. On any failure the
    /// staging directory is removed and nothing else is touched.
    async fn fetch_to_staging(
        &self,
        name: &str,
        source: &str,
        git_ref: Option<&str>,
    ) -> Result<(PathBuf, String)> {
        let fetcher = self
            .fetchers
            .iter()
            .find(|f| f.handles(source))
            .ok_or_else(|| {
                TerraclawError::Fetch(format!("no fetcher recognizes source '{source}'"))
            })?;

        let staging = self
            .templates_dir
            .join(".staging")
            .join(format!("{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&staging)?;

        let fetched = tokio::time::timeout(self.fetch_timeout, fetcher.fetch(source, git_ref, &staging))
            .await
            .unwrap_or_else(|_| {
                Err(TerraclawError::Fetch(format!(
                    "fetch of '{source}' timed out after {}s",
                    self.fetch_timeout.as_secs()
                )))
            });

        match fetched {
            Ok(version) => Ok((staging, version)),
            Err(e) => {
                std::fs::remove_dir_all(&staging).ok();
                Err(e)
            }
        }
    }

    /// Atomically replace the cache directory with fully fetched staging
    /// content. The old cache survives until the new one is in place.
    fn swap_cache(&self, name: &str, staging: &Path) -> Result<()> {
        let cache = self.cache_dir(name);
        let trash = self
            .templates_dir
            .join(".staging")
            .join(format!("{name}-trash-{}", uuid::Uuid::new_v4()));

        if cache.exists() {
            std::fs::rename(&cache, &trash)?;
        }
        if let Err(e) = std::fs::rename(staging, &cache) {
            // Roll the old cache back before reporting.
            if trash.exists() {
                std::fs::rename(&trash, &cache).ok();
            }
            std::fs::remove_dir_all(staging).ok();
            return Err(e.into());
        }
        std::fs::remove_dir_all(&trash).ok();
        Ok(())
    }

    // ─── Operations ───────────────────────────────────────────

    /// Register a new template: fetch, cache, record.
    pub async fn add(
        &self,
        name: &str,
        source: &str,
        sub_path: Option<&str>,
        git_ref: Option<&str>,
        description: &str,
    ) -> Result<TemplateRecord> {
        if name.is_empty()
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(TerraclawError::Validation(format!(
                "template name '{name}' is not filesystem-safe"
            )));
        }
        if self.with_db(|db| db.get(name))?.is_some() {
            return Err(TerraclawError::AlreadyExists(format!("template '{name}'")));
        }

        let (staging, version) = self.fetch_to_staging(name, source, git_ref).await?;
        self.swap_cache(name, &staging)?;

        let now = Utc::now();
        let rec = TemplateRecord {
            name: name.to_string(),
            source: source.to_string(),
            sub_path: sub_path.filter(|s| !s.is_empty()).map(str::to_string),
            git_ref: git_ref.filter(|s| !s.is_empty()).map(str::to_string),
            version,
            description: description.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.with_db(|db| db.insert(&rec))?;
        tracing::info!("📦 Template added: '{}' from {} ({})", name, source, rec.version);
        Ok(rec)
    }

    /// All records. No external I/O.
    pub fn list(&self) -> Result<Vec<TemplateRecord>> {
        self.with_db(|db| db.list())
    }

    /// One record by name.
    pub fn get(&self, name: &str) -> Result<TemplateRecord> {
        self.with_db(|db| db.get(name))?
            .ok_or_else(|| TerraclawError::NotFound(format!("template '{name}'")))
    }

    /// Re-fetch from the recorded source at the recorded ref.
    /// On fetch failure the previous cache is left untouched.
    pub async fn update(&self, name: &str) -> Result<TemplateRecord> {
        let rec = self.get(name)?;
        let (staging, version) = self
            .fetch_to_staging(name, &rec.source, rec.git_ref.as_deref())
            .await?;
        self.swap_cache(name, &staging)?;

        let now = Utc::now();
        self.with_db(|db| db.touch_version(name, &version, now))?;
        tracing::info!("📦 Template updated: '{}' → {}", name, version);
        Ok(TemplateRecord { version, updated_at: now, ..rec })
    }

    /// Remove the record and cache.
    ///
    /// The registry does not track workspace references itself; the caller
    /// supplies `used_by` (a referencing workspace name) from its own view,
    /// and `force` overrides the check.
    pub fn remove(&self, name: &str, force: bool, used_by: Option<&str>) -> Result<()> {
        self.get(name)?;
        if let Some(ws) = used_by {
            if !force {
                return Err(TerraclawError::InUse(name.to_string(), ws.to_string()));
            }
        }
        self.with_db(|db| db.delete(name))?;
        std::fs::remove_dir_all(self.cache_dir(name)).ok();
        tracing::info!("🧹 Template removed: '{}'", name);
        Ok(())
    }

    /// Structural check of the cached content, without applying anything:
    /// the cache must exist and contain at least one non-empty
    /// configuration file under the recorded sub-path.
    pub fn validate(&self, name: &str) -> Result<()> {
        let rec = self.get(name)?;
        let root = self.content_root(&rec);
        if !root.is_dir() {
            return Err(TerraclawError::Validation(format!(
                "template '{name}': cached content missing at {} (try an update)",
                root.display()
            )));
        }

        let has_config = WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .any(|e| {
                let p = e.path();
                let named_tf = p
                    .to_string_lossy()
                    .ends_with(".tf.json")
                    || p.extension().is_some_and(|x| x == "tf");
                named_tf && e.metadata().map(|m| m.len() > 0).unwrap_or(false)
            });
        if !has_config {
            return Err(TerraclawError::Validation(format!(
                "template '{name}': no non-empty .tf or .tf.json file under {}",
                root.display()
            )));
        }
        Ok(())
    }

    /// Materialize the cached template into `dest`, binding the supplied
    /// variable overrides. The shared cache is never mutated. Template files
    /// overwrite their counterparts in `dest`; files the template does not
    /// ship (notably local terraform state) are left in place.
    pub fn resolve(
        &self,
        name: &str,
        variables: &HashMap<String, String>,
        dest: &Path,
    ) -> Result<()> {
        let rec = self.get(name)?;
        let root = self.content_root(&rec);
        if !root.is_dir() {
            return Err(TerraclawError::Validation(format!(
                "template '{name}': cached content missing at {} (try an update)",
                root.display()
            )));
        }

        std::fs::create_dir_all(dest)?;
        copy_tree(&root, dest)?;

        if !variables.is_empty() {
            let vars = serde_json::to_string_pretty(variables)?;
            std::fs::write(dest.join("terraclaw.auto.tfvars.json"), vars)?;
        }
        tracing::debug!("📦 Template '{}' resolved into {}", name, dest.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        registry: TemplateRegistry,
        root: PathBuf,
        src: PathBuf,
    }

    fn fixture(tag: &str) -> Fixture {
        let root = std::env::temp_dir().join(format!("terraclaw-test-registry-{tag}"));
        std::fs::remove_dir_all(&root).ok();
        let src = root.join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("main.tf"), "resource \"null_resource\" \"a\" {}").unwrap();

        let registry = TemplateRegistry::new(
            RegistryDb::open_in_memory().unwrap(),
            root.join("templates"),
            Duration::from_secs(30),
        );
        Fixture { registry, root, src }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.root).ok();
        }
    }

    #[tokio::test]
    async fn test_add_get_round_trip() {
        let f = fixture("roundtrip");
        let source = format!("file://{}", f.src.display());
        let rec = f.registry.add("t1", &source, None, Some("main"), "demo").await.unwrap();
        assert!(rec.version.starts_with("sha256:"));

        let got = f.registry.get("t1").unwrap();
        assert_eq!(got.source, source);
        assert_eq!(got.git_ref.as_deref(), Some("main"));
        assert_eq!(got.description, "demo");
        assert_eq!(got.sub_path, None);
        assert_eq!(f.registry.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_duplicate_rejected() {
        let f = fixture("dup");
        let source = f.src.to_string_lossy().into_owned();
        f.registry.add("t1", &source, None, None, "").await.unwrap();
        let err = f.registry.add("t1", &source, None, None, "").await.unwrap_err();
        assert_eq!(err.kind(), "already_exists");
    }

    #[tokio::test]
    async fn test_add_unknown_scheme() {
        let f = fixture("scheme");
        let err = f.registry.add("t1", "ftp://host/x", None, None, "").await.unwrap_err();
        assert_eq!(err.kind(), "fetch_error");
    }

    #[tokio::test]
    async fn test_remove_then_get_not_found() {
        let f = fixture("remove");
        let source = f.src.to_string_lossy().into_owned();
        f.registry.add("t1", &source, None, None, "").await.unwrap();

        f.registry.remove("t1", false, None).unwrap();
        assert_eq!(f.registry.get("t1").unwrap_err().kind(), "not_found");
        assert_eq!(f.registry.remove("t1", false, None).unwrap_err().kind(), "not_found");
    }

    #[tokio::test]
    async fn test_remove_in_use_needs_force() {
        let f = fixture("inuse");
        let source = f.src.to_string_lossy().into_owned();
        f.registry.add("t1", &source, None, None, "").await.unwrap();

        let err = f.registry.remove("t1", false, Some("w1")).unwrap_err();
        assert_eq!(err.kind(), "in_use");
        // Still present
        assert!(f.registry.get("t1").is_ok());

        f.registry.remove("t1", true, Some("w1")).unwrap();
        assert_eq!(f.registry.get("t1").unwrap_err().kind(), "not_found");
    }

    #[tokio::test]
    async fn test_update_failure_leaves_cache_untouched() {
        let f = fixture("atomic");
        let source = f.src.to_string_lossy().into_owned();
        f.registry.add("t1", &source, None, None, "").await.unwrap();

        let cached = f.root.join("templates/t1/main.tf");
        let before = std::fs::read(&cached).unwrap();

        // Break the source, then try to update.
        std::fs::remove_dir_all(&f.src).unwrap();
        let err = f.registry.update("t1").await.unwrap_err();
        assert_eq!(err.kind(), "fetch_error");

        assert_eq!(std::fs::read(&cached).unwrap(), before);
    }

    #[tokio::test]
    async fn test_update_success_bumps_version() {
        let f = fixture("bump");
        let source = f.src.to_string_lossy().into_owned();
        let rec = f.registry.add("t1", &source, None, None, "").await.unwrap();

        std::fs::write(f.src.join("main.tf"), "resource \"null_resource\" \"b\" {}").unwrap();
        let updated = f.registry.update("t1").await.unwrap();
        assert_ne!(updated.version, rec.version);
        assert!(updated.updated_at >= rec.updated_at);

        let content = std::fs::read_to_string(f.root.join("templates/t1/main.tf")).unwrap();
        assert!(content.contains("\"b\""));
    }

    #[tokio::test]
    async fn test_validate() {
        let f = fixture("validate");
        let source = f.src.to_string_lossy().into_owned();
        f.registry.add("good", &source, None, None, "").await.unwrap();
        f.registry.validate("good").unwrap();

        // No configuration files at all.
        let empty_src = f.root.join("empty-src");
        std::fs::create_dir_all(&empty_src).unwrap();
        std::fs::write(empty_src.join("README.md"), "docs only").unwrap();
        f.registry
            .add("empty", empty_src.to_str().unwrap(), None, None, "")
            .await
            .unwrap();
        assert_eq!(f.registry.validate("empty").unwrap_err().kind(), "validation_error");

        assert_eq!(f.registry.validate("missing").unwrap_err().kind(), "not_found");
    }

    #[tokio::test]
    async fn test_resolve_binds_variables() {
        let f = fixture("resolve");
        let source = format!("file://{}", f.src.display());
        f.registry.add("t1", &source, None, Some("main"), "demo").await.unwrap();

        let dest = f.root.join("work/w1");
        let vars = HashMap::from([("x".to_string(), "y".to_string())]);
        f.registry.resolve("t1", &vars, &dest).unwrap();

        assert!(dest.join("main.tf").exists());
        let bound = std::fs::read_to_string(dest.join("terraclaw.auto.tfvars.json")).unwrap();
        assert!(bound.contains("\"x\""));
        assert!(bound.contains("\"y\""));

        // Shared cache untouched by resolution.
        assert!(!f.root.join("templates/t1/terraclaw.auto.tfvars.json").exists());

        // Re-resolving keeps workspace-local files (terraform state).
        std::fs::write(dest.join("terraform.tfstate"), "{}").unwrap();
        f.registry.resolve("t1", &vars, &dest).unwrap();
        assert!(dest.join("terraform.tfstate").exists());
    }

    #[tokio::test]
    async fn test_resolve_with_sub_path() {
        let f = fixture("subpath");
        std::fs::create_dir_all(f.src.join("infra")).unwrap();
        std::fs::write(f.src.join("infra/net.tf"), "# net").unwrap();
        let source = f.src.to_string_lossy().into_owned();
        f.registry.add("t1", &source, Some("infra"), None, "").await.unwrap();

        f.registry.validate("t1").unwrap();

        let dest = f.root.join("work/w1");
        f.registry.resolve("t1", &HashMap::new(), &dest).unwrap();
        assert!(dest.join("net.tf").exists());
        assert!(!dest.join("main.tf").exists());
    }
}
