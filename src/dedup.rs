//! dedup.rs — seen canonical links, persisted as a plain line-per-link file.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::ingest::types::CanonicalLink;

/// Every link already notified. Links are only ever added.
#[derive(Debug, Clone, Default)]
pub struct SeenLinks {
    inner: HashSet<CanonicalLink>,
}

impl SeenLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, link: &CanonicalLink) -> bool {
        self.inner.contains(link)
    }

    /// Returns `false` if the link was already present.
    pub fn insert(&mut self, link: CanonicalLink) -> bool {
        self.inner.insert(link)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Sorted copy, so the persisted file diffs cleanly.
    pub fn sorted(&self) -> Vec<&CanonicalLink> {
        let mut v: Vec<_> = self.inner.iter().collect();
        v.sort();
        v
    }
}

impl FromIterator<CanonicalLink> for SeenLinks {
    fn from_iter<I: IntoIterator<Item = CanonicalLink>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DedupStore {
    path: PathBuf,
}

impl DedupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is a first run, not an error.
    pub async fn load(&self) -> Result<SeenLinks> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no seen-links file yet, starting empty");
                return Ok(SeenLinks::new());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading seen links from {}", self.path.display()))
            }
        };
        let seen: SeenLinks = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(CanonicalLink::from_persisted)
            .collect();
        tracing::info!(path = %self.path.display(), count = seen.len(), "seen links loaded");
        Ok(seen)
    }

    /// Rewrites the whole file.
    pub async fn save(&self, seen: &SeenLinks) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating state dir {}", dir.display()))?;
        }
        let mut body = String::new();
        for link in seen.sorted() {
            body.push_str(link.as_str());
            body.push('\n');
        }
        fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing seen links to {}", self.path.display()))
    }
}
