use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Raw file-system changes forwarded from the watcher thread to the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    /// Created or written
    Changed(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

/// A recursive file system watcher for a vault directory.
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
}

impl VaultWatcher {
    /// Start watching `root`. Changes are sent on `tx` until the watcher is
    /// dropped.
    pub fn start(root: &Path, tx: mpsc::UnboundedSender<FsChange>) -> Result<Self, notify::Error> {
        let root_owned = root.to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, "VaultWatcher: watch error");
                        return;
                    }
                };
                for change in classify(event, &root_owned) {
                    debug!(?change, "VaultWatcher: change");
                    // Receiver gone means the vault is shutting down
                    let _ = tx.send(change);
                }
            },
            Config::default(),
        )?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(VaultWatcher { _watcher: watcher })
    }
}

/// Map one notify event to the changes we care about
fn classify(event: Event, root: &Path) -> Vec<FsChange> {
    let paths: Vec<PathBuf> = event.paths.into_iter().filter(|p| is_relevant(p, root)).collect();

    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            vec![FsChange::Renamed {
                from: paths[0].clone(),
                to: paths[1].clone(),
            }]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
            paths.into_iter().map(FsChange::Removed).collect()
        }
        EventKind::Create(_) | EventKind::Modify(_) => {
            paths.into_iter().map(FsChange::Changed).collect()
        }
        _ => Vec::new(),
    }
}

/// Inside the vault and not hidden (lock files, settings, temp files)
fn is_relevant(path: &Path, root: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    !relative
        .components()
        .any(|c| c.as_os_str().to_str().is_some_and(|s| s.starts_with('.')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut e = Event::new(kind);
        for p in paths {
            e = e.add_path(PathBuf::from(p));
        }
        e
    }

    #[test]
    fn hidden_and_outside_paths_are_dropped() {
        let root = Path::new("/vault");
        assert!(is_relevant(Path::new("/vault/a/b.md"), root));
        assert!(!is_relevant(Path::new("/vault/.taskvault.lock"), root));
        assert!(!is_relevant(Path::new("/vault/.obsidian/x.md"), root));
        assert!(!is_relevant(Path::new("/elsewhere/b.md"), root));
    }

    #[test]
    fn classifies_kinds() {
        let root = Path::new("/vault");
        assert_eq!(
            classify(event(EventKind::Create(CreateKind::File), &["/vault/a.md"]), root),
            vec![FsChange::Changed("/vault/a.md".into())]
        );
        assert_eq!(
            classify(
                event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &["/vault/a.md"]),
                root
            ),
            vec![FsChange::Changed("/vault/a.md".into())]
        );
        assert_eq!(
            classify(event(EventKind::Remove(RemoveKind::File), &["/vault/a.md"]), root),
            vec![FsChange::Removed("/vault/a.md".into())]
        );
        assert_eq!(
            classify(
                event(
                    EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                    &["/vault/a.md", "/vault/b.md"]
                ),
                root
            ),
            vec![FsChange::Renamed {
                from: "/vault/a.md".into(),
                to: "/vault/b.md".into()
            }]
        );
    }

    #[test]
    fn atomic_write_temp_rename_becomes_change() {
        // tempfile writes `.tmpXXXX` then renames it over the target
        let root = Path::new("/vault");
        let changes = classify(
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/vault/.tmpAbc123", "/vault/a.md"],
            ),
            root,
        );
        assert_eq!(changes, vec![FsChange::Changed("/vault/a.md".into())]);
    }
}
