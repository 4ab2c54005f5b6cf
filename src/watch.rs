use crate::{cache::QueryCache, models::WatchEvent};
use std::path::{Path, PathBuf};

/// What the app should do after a filesystem event has been folded into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchNotice {
    Info(String),
    Warn(String),
    /// The folder shown in the preview panel is gone.
    ActiveRemoved(PathBuf),
    ActiveRenamed { from: PathBuf, to: PathBuf },
    /// A file inside the active folder changed on disk.
    ActiveFileChanged(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchOutcome {
    pub invalidated: usize,
    pub refresh_grid: bool,
    pub notices: Vec<WatchNotice>,
}

/// Where the app currently looks; events are routed relative to these.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchContext<'a> {
    pub mods_root: Option<&'a Path>,
    pub current_dir: Option<&'a Path>,
    pub active: Option<&'a Path>,
}

pub fn route(event: &WatchEvent, ctx: WatchContext<'_>, cache: &mut QueryCache) -> WatchOutcome {
    let mut outcome = WatchOutcome::default();
    match event {
        WatchEvent::Created { path } => {
            touch(path, ctx, cache, &mut outcome);
            if is_root_child(path, ctx.mods_root) {
                outcome
                    .notices
                    .push(WatchNotice::Info(format!("New mod folder: {}", display_name(path))));
            }
        }
        WatchEvent::Modified { path } => {
            touch(path, ctx, cache, &mut outcome);
            if let Some(relative) = ctx.active.and_then(|active| relative_name(path, active)) {
                outcome.notices.push(WatchNotice::ActiveFileChanged(relative));
            }
        }
        WatchEvent::Removed { path } => {
            touch(path, ctx, cache, &mut outcome);
            if ctx.active == Some(path.as_path()) {
                outcome.notices.push(WatchNotice::ActiveRemoved(path.clone()));
            } else if is_root_child(path, ctx.mods_root) {
                outcome
                    .notices
                    .push(WatchNotice::Info(format!("Mod folder removed: {}", display_name(path))));
            }
        }
        WatchEvent::Renamed { from, to } => {
            touch(from, ctx, cache, &mut outcome);
            touch(to, ctx, cache, &mut outcome);
            if ctx.active == Some(from.as_path()) {
                outcome.notices.push(WatchNotice::ActiveRenamed {
                    from: from.clone(),
                    to: to.clone(),
                });
            } else if is_root_child(to, ctx.mods_root) {
                outcome.notices.push(WatchNotice::Info(format!(
                    "Mod folder renamed: {} -> {}",
                    display_name(from),
                    display_name(to)
                )));
            }
        }
        WatchEvent::Error { message } => {
            tracing::warn!(%message, "file watcher reported an error");
            outcome
                .notices
                .push(WatchNotice::Warn(format!("File watcher: {message}")));
        }
    }
    outcome
}

fn touch(path: &Path, ctx: WatchContext<'_>, cache: &mut QueryCache, outcome: &mut WatchOutcome) {
    // Also drops the listing of every ancestor dir.
    outcome.invalidated += cache.invalidate_path(path);
    if let Some(dir) = ctx.current_dir {
        if path.parent() == Some(dir) {
            outcome.refresh_grid = true;
        }
    }
}

fn is_root_child(path: &Path, root: Option<&Path>) -> bool {
    root.is_some() && path.parent() == root
}

fn relative_name(path: &Path, folder: &Path) -> Option<String> {
    let relative = path.strip_prefix(folder).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(
        relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryKey;

    fn warm(cache: &mut QueryCache) {
        for key in [
            QueryKey::ModFolders {
                dir: PathBuf::from("/mods"),
            },
            QueryKey::ModInfo(PathBuf::from("/mods/Alpha")),
            QueryKey::IniDocument {
                folder: PathBuf::from("/mods/Alpha"),
                file_name: "merged.ini".to_string(),
            },
            QueryKey::ModInfo(PathBuf::from("/mods/Bravo")),
        ] {
            let _: u8 = cache.fetch(key, || Ok(0)).unwrap();
        }
    }

    fn ctx<'a>(active: Option<&'a Path>) -> WatchContext<'a> {
        WatchContext {
            mods_root: Some(Path::new("/mods")),
            current_dir: Some(Path::new("/mods")),
            active,
        }
    }

    #[test]
    fn root_creation_is_announced() {
        let mut cache = QueryCache::default();
        warm(&mut cache);
        let event = WatchEvent::Created {
            path: PathBuf::from("/mods/Charlie"),
        };
        let outcome = route(&event, ctx(None), &mut cache);
        assert!(outcome.refresh_grid);
        assert_eq!(
            outcome.notices,
            vec![WatchNotice::Info("New mod folder: Charlie".to_string())]
        );
        assert!(!cache.contains(&QueryKey::ModFolders {
            dir: PathBuf::from("/mods")
        }));
        assert!(cache.contains(&QueryKey::ModInfo(PathBuf::from("/mods/Bravo"))));
    }

    #[test]
    fn modified_ini_in_active_folder_is_reported() {
        let mut cache = QueryCache::default();
        warm(&mut cache);
        let event = WatchEvent::Modified {
            path: PathBuf::from("/mods/Alpha/merged.ini"),
        };
        let outcome = route(&event, ctx(Some(Path::new("/mods/Alpha"))), &mut cache);
        assert_eq!(
            outcome.notices,
            vec![WatchNotice::ActiveFileChanged("merged.ini".to_string())]
        );
        assert!(!cache.contains(&QueryKey::IniDocument {
            folder: PathBuf::from("/mods/Alpha"),
            file_name: "merged.ini".to_string(),
        }));
    }

    #[test]
    fn removing_active_mod_asks_to_locate() {
        let mut cache = QueryCache::default();
        let event = WatchEvent::Removed {
            path: PathBuf::from("/mods/Alpha"),
        };
        let outcome = route(&event, ctx(Some(Path::new("/mods/Alpha"))), &mut cache);
        assert_eq!(
            outcome.notices,
            vec![WatchNotice::ActiveRemoved(PathBuf::from("/mods/Alpha"))]
        );
    }

    #[test]
    fn rename_of_active_mod_is_followed() {
        let mut cache = QueryCache::default();
        let event = WatchEvent::Renamed {
            from: PathBuf::from("/mods/Alpha"),
            to: PathBuf::from("/mods/DISABLED Alpha"),
        };
        let outcome = route(&event, ctx(Some(Path::new("/mods/Alpha"))), &mut cache);
        assert!(matches!(
            outcome.notices.as_slice(),
            [WatchNotice::ActiveRenamed { .. }]
        ));
    }

    #[test]
    fn nested_changes_stay_quiet() {
        let mut cache = QueryCache::default();
        let event = WatchEvent::Created {
            path: PathBuf::from("/mods/Characters/Raiden/New"),
        };
        let outcome = route(&event, ctx(None), &mut cache);
        assert!(outcome.notices.is_empty());
        assert!(!outcome.refresh_grid);
    }

    #[test]
    fn watcher_errors_warn() {
        let mut cache = QueryCache::default();
        let event = WatchEvent::Error {
            message: "inotify limit".to_string(),
        };
        let outcome = route(&event, ctx(None), &mut cache);
        assert_eq!(
            outcome.notices,
            vec![WatchNotice::Warn("File watcher: inotify limit".to_string())]
        );
    }
}
