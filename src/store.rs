use crate::game::GameId;
use std::{
    collections::{BTreeSet, VecDeque},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

const TOAST_CAPACITY: usize = 4;

/// Which mod folders are selected in the grid. The primary path is the one the
/// preview panel follows; the App is the only writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionStore {
    primary: Option<PathBuf>,
    selected: BTreeSet<PathBuf>,
}

impl SelectionStore {
    pub fn primary(&self) -> Option<&Path> {
        self.primary.as_deref()
    }

    pub fn selected(&self) -> impl Iterator<Item = &PathBuf> {
        self.selected.iter()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_selected(&self, path: &Path) -> bool {
        self.selected.contains(path)
    }

    pub fn select_only(&mut self, path: &Path) {
        self.selected.clear();
        self.selected.insert(path.to_path_buf());
        self.primary = Some(path.to_path_buf());
    }

    /// Adds or removes a path; the primary follows the latest addition.
    pub fn toggle(&mut self, path: &Path) {
        if self.selected.remove(path) {
            if self.primary.as_deref() == Some(path) {
                self.primary = self.selected.iter().next_back().cloned();
            }
        } else {
            self.selected.insert(path.to_path_buf());
            self.primary = Some(path.to_path_buf());
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.primary = None;
    }

    /// Puts the selection back on `path` after a deferred change.
    pub fn reassert(&mut self, path: Option<&Path>) {
        match path {
            Some(path) => self.select_only(path),
            None => self.clear(),
        }
    }

    /// Follows a folder rename so a toggled mod stays selected.
    pub fn rename(&mut self, from: &Path, to: &Path) {
        if self.selected.remove(from) {
            self.selected.insert(to.to_path_buf());
        }
        if self.primary.as_deref() == Some(from) {
            self.primary = Some(to.to_path_buf());
        }
    }

    pub fn forget(&mut self, path: &Path) {
        self.selected.remove(path);
        if self.primary.as_deref() == Some(path) {
            self.primary = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationStore {
    pub game_id: GameId,
    pub mods_path: Option<PathBuf>,
    pub sub_path: Vec<String>,
    pub object_id: Option<String>,
}

impl NavigationStore {
    pub fn new(game_id: GameId, mods_path: Option<PathBuf>) -> Self {
        Self {
            game_id,
            mods_path,
            sub_path: Vec::new(),
            object_id: None,
        }
    }

    pub fn sub_path_string(&self) -> Option<String> {
        if self.sub_path.is_empty() {
            None
        } else {
            Some(self.sub_path.join("/"))
        }
    }

    pub fn current_dir(&self) -> Option<PathBuf> {
        let mut dir = self.mods_path.clone()?;
        for part in &self.sub_path {
            dir.push(part);
        }
        if let Some(object) = &self.object_id {
            dir.push(object);
        }
        Some(dir)
    }

    pub fn enter(&mut self, folder_name: &str) {
        self.sub_path.push(folder_name.to_string());
        self.object_id = None;
    }

    pub fn leave(&mut self) -> bool {
        if self.object_id.take().is_some() {
            return true;
        }
        self.sub_path.pop().is_some()
    }

    pub fn switch_game(&mut self, game_id: GameId, mods_path: Option<PathBuf>) {
        *self = Self::new(game_id, mods_path);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub level: ToastLevel,
    pub expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct ToastStore {
    toasts: VecDeque<Toast>,
}

impl ToastStore {
    pub fn push(&mut self, message: &str, level: ToastLevel, duration: Duration) {
        self.push_at(message, level, Instant::now() + duration);
    }

    fn push_at(&mut self, message: &str, level: ToastLevel, expires_at: Instant) {
        if let Some(last) = self.toasts.back_mut() {
            if last.message == message && last.level == level {
                last.expires_at = expires_at;
                return;
            }
        }
        self.toasts.push_back(Toast {
            message: message.to_string(),
            level,
            expires_at,
        });
        while self.toasts.len() > TOAST_CAPACITY {
            self.toasts.pop_front();
        }
    }

    pub fn dismiss(&mut self) {
        self.toasts.pop_back();
    }

    pub fn prune(&mut self, now: Instant) {
        self.toasts.retain(|toast| toast.expires_at > now);
    }

    pub fn latest(&self) -> Option<&Toast> {
        self.toasts.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_moves_primary_to_latest() {
        let mut store = SelectionStore::default();
        store.select_only(Path::new("/m/a"));
        store.toggle(Path::new("/m/b"));
        assert_eq!(store.primary(), Some(Path::new("/m/b")));
        assert_eq!(store.len(), 2);

        store.toggle(Path::new("/m/b"));
        assert_eq!(store.primary(), Some(Path::new("/m/a")));
        assert!(!store.is_selected(Path::new("/m/b")));
    }

    #[test]
    fn reassert_restores_single_selection() {
        let mut store = SelectionStore::default();
        store.select_only(Path::new("/m/b"));
        store.reassert(Some(Path::new("/m/a")));
        assert_eq!(store.primary(), Some(Path::new("/m/a")));
        assert_eq!(store.len(), 1);
        store.reassert(None);
        assert_eq!(store.primary(), None);
    }

    #[test]
    fn rename_keeps_selection_on_moved_folder() {
        let mut store = SelectionStore::default();
        store.select_only(Path::new("/m/a"));
        store.rename(Path::new("/m/a"), Path::new("/m/DISABLED a"));
        assert_eq!(store.primary(), Some(Path::new("/m/DISABLED a")));
        assert!(store.is_selected(Path::new("/m/DISABLED a")));
    }

    #[test]
    fn navigation_builds_current_dir() {
        let mut nav = NavigationStore::new(GameId::Genshin, Some(PathBuf::from("/g/Mods")));
        nav.enter("Characters");
        nav.object_id = Some("Raiden".to_string());
        assert_eq!(nav.current_dir(), Some(PathBuf::from("/g/Mods/Characters/Raiden")));
        assert!(nav.leave());
        assert_eq!(nav.sub_path_string().as_deref(), Some("Characters"));
        assert!(nav.leave());
        assert!(!nav.leave());
    }

    #[test]
    fn toasts_collapse_repeats_and_expire() {
        let mut toasts = ToastStore::default();
        let now = Instant::now();
        toasts.push_at("saved", ToastLevel::Info, now + Duration::from_secs(1));
        toasts.push_at("saved", ToastLevel::Info, now + Duration::from_secs(5));
        assert_eq!(toasts.iter().count(), 1);

        for idx in 0..6 {
            toasts.push_at(&format!("m{idx}"), ToastLevel::Warn, now + Duration::from_secs(2));
        }
        assert_eq!(toasts.iter().count(), TOAST_CAPACITY);

        toasts.prune(now + Duration::from_secs(3));
        assert_eq!(toasts.iter().count(), 0);
    }
}
