//! Parse-then-reconcile orchestration and the surveys directory watcher.
//!
//! [`Resyncer::resync`] is the single entry point used by `serve` start,
//! `formwork sync`, `POST /app/surveys/sync` and the watcher. Runs are
//! serialized by an async mutex, so a watcher-triggered resync never
//! interleaves with an on-demand one.
//!
//! The watcher coalesces bursts of filesystem events: after the first event
//! it waits until `debounce` passes with no further event, then compares a
//! content fingerprint of the tree against the last synced one and resyncs
//! only if it changed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::Span;
use walkdir::WalkDir;

use formwork_core::store::Store;
use formwork_core::sync::{SyncEngine, SyncReport};

use crate::parser::SurveyParser;

pub struct Resyncer {
    parser: SurveyParser,
    engine: SyncEngine,
    running: Mutex<()>,
    span: Span,
}

impl Resyncer {
    pub fn new(root: impl Into<PathBuf>, store: Arc<dyn Store>, span: Span) -> Self {
        let root = root.into();
        Self {
            parser: SurveyParser::new(&root, tracing::info_span!(parent: &span, "parser")),
            engine: SyncEngine::new(store, tracing::info_span!(parent: &span, "sync")),
            running: Mutex::new(()),
            span,
        }
    }

    pub fn root(&self) -> &Path {
        self.parser.root()
    }

    /// Full parse and reconcile. Waits for any run already in progress.
    pub async fn resync(&self) -> Result<SyncReport> {
        let _guard = self.running.lock().await;

        let parser = self.parser.clone();
        let result = tokio::task::spawn_blocking(move || parser.read())
            .await
            .context("survey parser task panicked")??;

        let report = self.engine.sync(&result).await?;
        tracing::debug!(parent: &self.span, root = %self.root().display(), "resync finished");
        Ok(report)
    }
}

/// Hex SHA-256 over every file path and content under `root`, in path order.
pub fn tree_fingerprint(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(std::fs::read(entry.path())?);
        hasher.update([0u8]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// A running watcher. Dropping it stops both the OS watch and the task.
pub struct SurveyWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for SurveyWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// [`tree_fingerprint`] on the blocking pool. Any failure reads as "unknown".
async fn fingerprint_off_runtime(root: PathBuf) -> Option<String> {
    tokio::task::spawn_blocking(move || tree_fingerprint(&root).ok())
        .await
        .ok()
        .flatten()
}

/// Watches the resyncer's root and resyncs after each quiet period.
pub fn watch(resyncer: Arc<Resyncer>, debounce: Duration) -> Result<SurveyWatcher> {
    let root = resyncer.root().to_path_buf();
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if event.is_ok() {
            let _ = tx.send(());
        }
    })
    .context("Failed to create filesystem watcher")?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch surveys root: {}", root.display()))?;

    let span = resyncer.span.clone();
    tracing::info!(parent: &span, root = %root.display(), debounce_ms = debounce.as_millis() as u64, "watching surveys");

    let task = tokio::spawn(async move {
        let mut last = fingerprint_off_runtime(root.clone()).await;

        while rx.recv().await.is_some() {
            // Quiet period: keep draining until no event arrives for `debounce`.
            loop {
                match tokio::time::timeout(debounce, rx.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            let current = fingerprint_off_runtime(root.clone()).await;
            if current.is_some() && current == last {
                tracing::debug!(parent: &span, "surveys unchanged, skipping resync");
                continue;
            }

            match resyncer.resync().await {
                Ok(report) => {
                    last = current;
                    tracing::info!(
                        parent: &span,
                        created = report.created,
                        updated = report.updated,
                        deleted = report.deleted,
                        "surveys changed, resynced"
                    );
                }
                Err(e) => {
                    tracing::error!(parent: &span, error = %format!("{:#}", e), "resync after change failed");
                }
            }
        }
    });

    Ok(SurveyWatcher {
        _watcher: watcher,
        task,
    })
}
