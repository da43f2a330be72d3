//! Input directory watcher
//!
//! Turns file-system events into a FIFO stream of new CSV paths. Scoring
//! itself never depends on this module; it only sees paths.

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Watches one directory (non-recursively) for arriving CSV files.
pub struct InputWatcher {
    // dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl InputWatcher {
    /// Start watching `dir`, forwarding each new CSV path to `tx` in
    /// arrival order.
    pub fn start(dir: &Path, tx: UnboundedSender<PathBuf>) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !is_arrival(&event.kind) {
                    return;
                }
                for path in event.paths {
                    if !is_csv(&path) {
                        debug!(path = %path.display(), "Ignoring non-CSV file");
                        continue;
                    }
                    debug!(path = %path.display(), "Detected new CSV");
                    if tx.send(path).is_err() {
                        warn!("Input queue closed, dropping event");
                    }
                }
            }
            Err(e) => warn!(error = %e, "File watch error"),
        })
        .context("Failed to create file watcher")?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        info!(dir = %dir.display(), "File observer started");

        Ok(Self {
            _watcher: watcher,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// A complete file appeared: closed after writing, or renamed into the
/// directory. inotify reports the close, so a file still being copied is
/// not picked up early.
#[cfg(target_os = "linux")]
fn is_arrival(kind: &EventKind) -> bool {
    use notify::event::{AccessKind, AccessMode};
    matches!(
        kind,
        EventKind::Access(AccessKind::Close(AccessMode::Write))
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    )
}

/// Other backends report no close event; producers there should write to
/// a staging name and rename the finished file into the directory.
#[cfg(not(target_os = "linux"))]
fn is_arrival(kind: &EventKind) -> bool {
    use notify::event::CreateKind;
    matches!(
        kind,
        EventKind::Create(CreateKind::File)
            | EventKind::Create(CreateKind::Any)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    )
}

/// Case-insensitive `.csv` extension check.
pub fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_csv() {
        assert!(is_csv(Path::new("/in/batch.csv")));
        assert!(is_csv(Path::new("/in/BATCH.CSV")));
        assert!(!is_csv(Path::new("/in/batch.csv.tmp")));
        assert!(!is_csv(Path::new("/in/readme")));
    }

    #[test]
    fn test_rename_into_dir_is_arrival() {
        assert!(is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::From))));
        assert!(!is_arrival(&EventKind::Remove(notify::event::RemoveKind::File)));
        assert!(!is_arrival(&EventKind::Create(notify::event::CreateKind::Folder)));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_arrival_waits_for_close_after_write() {
        use notify::event::{AccessKind, AccessMode, CreateKind, DataChange};
        assert!(!is_arrival(&EventKind::Create(CreateKind::File)));
        assert!(!is_arrival(&EventKind::Modify(ModifyKind::Data(DataChange::Any))));
        assert!(!is_arrival(&EventKind::Access(AccessKind::Close(AccessMode::Read))));
        assert!(is_arrival(&EventKind::Access(AccessKind::Close(AccessMode::Write))));
    }
}
