// File: snapshot.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use crate::normalizer::Normalizer;

const SNAPSHOT_FILE: &str = "snapshot.html";
const HISTORY_DIR: &str = "history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Development,
    Testing,
}

impl Environment {
    /// CI always writes production snapshots; local debugging flags select
    /// the development tree.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("GITHUB_ACTIONS").ok().as_deref(),
            std::env::var("DEBUG_FETCH").ok().as_deref(),
            std::env::var("DEVELOPMENT_MODE").ok().as_deref(),
        )
    }

    pub fn from_vars(
        github_actions: Option<&str>,
        debug_fetch: Option<&str>,
        development_mode: Option<&str>,
    ) -> Self {
        if github_actions.map(|v| v.eq_ignore_ascii_case("true")) == Some(true) {
            return Environment::Production;
        }
        let set = |value: Option<&str>| value.map(|v| !v.is_empty()).unwrap_or(false);
        if set(debug_fetch) || set(development_mode) {
            return Environment::Development;
        }
        Environment::Production
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Testing => "testing",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub slug: String,
    pub raw_content: String,
    pub canonical_text: String,
    pub fetched_at: DateTime<Utc>,
}

/// Latest raw snapshot per slug, plus a bounded history of replaced versions.
pub struct SnapshotStore {
    root: PathBuf,
    environment: Environment,
    history_depth: usize,
    normalizer: Arc<Normalizer>,
}

impl SnapshotStore {
    pub fn new(
        base_dir: &Path,
        environment: Environment,
        history_depth: usize,
        normalizer: Arc<Normalizer>,
    ) -> Self {
        Self {
            root: base_dir.join(environment.as_str()),
            environment,
            history_depth,
            normalizer,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn snapshot_path(&self, slug: &str) -> PathBuf {
        self.root.join(slug).join(SNAPSHOT_FILE)
    }

    fn history_dir(&self, slug: &str) -> PathBuf {
        self.root.join(slug).join(HISTORY_DIR)
    }

    pub fn get(&self, slug: &str) -> Result<Option<Snapshot>> {
        let path = self.snapshot_path(slug);
        if !path.is_file() {
            return Ok(None);
        }

        let raw_content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("Failed to stat snapshot {}", path.display()))?;
        let canonical_text = self.normalizer.normalize(&raw_content, slug);

        Ok(Some(Snapshot {
            slug: slug.to_string(),
            raw_content,
            canonical_text,
            fetched_at: DateTime::<Utc>::from(modified),
        }))
    }

    /// Replaces the stored snapshot. The caller decides whether the change is
    /// worth storing.
    pub fn put(&self, slug: &str, raw_content: &str, canonical_text: &str) -> Result<Snapshot> {
        let dir = self.root.join(slug);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot directory {}", dir.display()))?;

        let path = self.snapshot_path(slug);
        if path.is_file() && self.history_depth > 0 {
            if let Err(e) = self.archive(slug, &path) {
                warn!("Could not archive previous snapshot of {}: {:#}", slug, e);
            }
        }

        write_atomic(&path, raw_content.as_bytes())?;
        info!("Stored snapshot for {} at {}", slug, path.display());

        Ok(Snapshot {
            slug: slug.to_string(),
            raw_content: raw_content.to_string(),
            canonical_text: canonical_text.to_string(),
            fetched_at: Utc::now(),
        })
    }

    fn archive(&self, slug: &str, current: &Path) -> Result<()> {
        let history = self.history_dir(slug);
        fs::create_dir_all(&history)
            .with_context(|| format!("Failed to create history directory {}", history.display()))?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let mut counter = 0u32;
        let mut target = history.join(format!("{}-{:04}.html", stamp, counter));
        while target.exists() {
            counter += 1;
            target = history.join(format!("{}-{:04}.html", stamp, counter));
        }

        fs::rename(current, &target)
            .with_context(|| format!("Failed to move snapshot to {}", target.display()))?;
        debug!("Archived previous snapshot of {} to {}", slug, target.display());

        self.prune_history(slug)
    }

    fn prune_history(&self, slug: &str) -> Result<()> {
        let entries = self.history(slug)?;
        if entries.len() <= self.history_depth {
            return Ok(());
        }
        let excess = entries.len() - self.history_depth;
        for old in entries.iter().take(excess) {
            fs::remove_file(old)
                .with_context(|| format!("Failed to remove {}", old.display()))?;
            debug!("Pruned history entry {}", old.display());
        }
        Ok(())
    }

    /// Archived versions of a slug, oldest first.
    pub fn history(&self, slug: &str) -> Result<Vec<PathBuf>> {
        let dir = self.history_dir(slug);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map(|ext| ext == "html").unwrap_or(false))
            .collect::<Vec<_>>();
        entries.sort();
        Ok(entries)
    }

    pub fn slugs(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut slugs = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list {}", self.root.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join(SNAPSHOT_FILE).is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect::<Vec<_>>();
        slugs.sort();
        Ok(slugs)
    }
}

/// Writes via a temp file in the target directory and renames into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(contents)
        .context("Failed to write temp file")?;
    tmp.flush().context("Failed to flush temp file")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move temp file to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::NormalizerRules;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store(dir: &TempDir, depth: usize) -> SnapshotStore {
        let normalizer = Arc::new(Normalizer::new(NormalizerRules::default()).unwrap());
        SnapshotStore::new(dir.path(), Environment::Testing, depth, normalizer)
    }

    #[test]
    fn test_environment_selection() {
        assert_eq!(
            Environment::from_vars(Some("true"), Some("1"), None),
            Environment::Production
        );
        assert_eq!(
            Environment::from_vars(None, Some("1"), None),
            Environment::Development
        );
        assert_eq!(
            Environment::from_vars(Some("false"), None, Some("yes")),
            Environment::Development
        );
        assert_eq!(
            Environment::from_vars(None, Some(""), None),
            Environment::Production
        );
        assert_eq!(Environment::from_vars(None, None, None), Environment::Production);
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir, 10).get("absent").unwrap().is_none());
    }

    #[test]
    fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 10);
        store
            .put("example", "<p>Rule one.</p>", "Rule one.")
            .unwrap();

        let path = dir.path().join("testing").join("example").join("snapshot.html");
        assert!(path.is_file());

        let snapshot = store.get("example").unwrap().unwrap();
        assert_eq!(snapshot.raw_content, "<p>Rule one.</p>");
        assert_eq!(snapshot.canonical_text, "Rule one.");
        assert_eq!(snapshot.slug, "example");
    }

    #[test]
    fn test_overwrite_archives_previous_version() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 10);
        store.put("example", "<p>v1</p>", "v1").unwrap();
        store.put("example", "<p>v2</p>", "v2").unwrap();

        let history = store.history("example").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(fs::read_to_string(&history[0]).unwrap(), "<p>v1</p>");
        assert_eq!(
            store.get("example").unwrap().unwrap().raw_content,
            "<p>v2</p>"
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 3);
        for version in 0..6 {
            store
                .put("example", &format!("<p>v{}</p>", version), "")
                .unwrap();
        }

        let history = store.history("example").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(fs::read_to_string(&history[2]).unwrap(), "<p>v4</p>");
    }

    #[test]
    fn test_zero_depth_keeps_no_history() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 0);
        store.put("example", "a", "a").unwrap();
        store.put("example", "b", "b").unwrap();
        assert!(store.history("example").unwrap().is_empty());
    }

    #[test]
    fn test_slugs_lists_stored_pages() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 1);
        store.put("beta", "b", "b").unwrap();
        store.put("alpha", "a", "a").unwrap();
        assert_eq!(store.slugs().unwrap(), vec!["alpha", "beta"]);
    }
}
