//! Filesystem watcher that nudges the pipeline when a feed changes.
//!
//! Watching is an optimization, not a correctness mechanism: the pipeline
//! keeps its own fallback poll interval, so a missed notification only
//! delays a record. Events are debounced and coalesced into at most one
//! pending wake-up.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Debounced watcher over the feed paths. Dropping it stops the watch.
pub struct FeedWatcher {
    // Held for its Drop; the background watch stops when this goes away
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
}

impl FeedWatcher {
    /// Short debounce: live feeds append in quick bursts and we only need
    /// one wake-up per burst.
    const DEBOUNCE: Duration = Duration::from_millis(500);

    /// Watch the given paths, sending a unit nudge on `wake_tx` whenever
    /// any of them changes. Paths that do not exist yet are skipped with a
    /// warning; the pipeline's interval polling covers them.
    pub fn watch(paths: &[PathBuf], wake_tx: mpsc::Sender<()>) -> Result<Self> {
        let mut debouncer = notify_debouncer_mini::new_debouncer(
            Self::DEBOUNCE,
            move |res: notify_debouncer_mini::DebounceEventResult| {
                // Runs on the notify thread, not in async context. Coalesce:
                // if a nudge is already queued, this event is covered by it.
                if res.ok().is_some_and(|events| !events.is_empty()) {
                    let _ = wake_tx.try_send(());
                }
            },
        )?;

        for path in paths {
            let target = watch_target(path);
            match target {
                Some(target) => {
                    debouncer
                        .watcher()
                        .watch(&target, notify::RecursiveMode::Recursive)?;
                    tracing::debug!("Watching feed path {}", target.display());
                }
                None => {
                    tracing::warn!(
                        "Feed path {} does not exist yet; relying on interval polling",
                        path.display()
                    );
                }
            }
        }

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

/// A file feed is watched through its parent directory so appends and
/// atomic replaces are both seen.
fn watch_target(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        Some(path.to_path_buf())
    } else if path.is_file() {
        path.parent().map(Path::to_path_buf)
    } else {
        None
    }
}
