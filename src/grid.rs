use crate::{
    bridge::Client,
    cache::{QueryCache, QueryKey},
    error::BridgeError,
    models::ModFolder,
    optimistic::{self, Commit},
    store::NavigationStore,
};
use std::{
    cmp::Ordering,
    ops::Range,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone)]
pub struct ModGrid {
    folders: Vec<ModFolder>,
    pub filter: String,
    pub cursor: usize,
    pub columns: usize,
    /// Hides folders not flagged safe.
    pub safe_mode: bool,
    scroll_row: usize,
}

impl Default for ModGrid {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            filter: String::new(),
            cursor: 0,
            columns: 1,
            safe_mode: false,
            scroll_row: 0,
        }
    }
}

impl ModGrid {
    pub fn folders(&self) -> &[ModFolder] {
        &self.folders
    }

    pub fn load(
        &mut self,
        nav: &NavigationStore,
        client: &Client,
        cache: &mut QueryCache,
    ) -> Result<(), BridgeError> {
        let (Some(mods_path), Some(dir)) = (nav.mods_path.clone(), nav.current_dir()) else {
            self.set_folders(Vec::new());
            return Ok(());
        };
        let sub_path = nav.sub_path_string();
        let folders = cache.fetch(QueryKey::ModFolders { dir }, || {
            client.list_mod_folders(
                nav.game_id,
                &mods_path,
                sub_path.as_deref(),
                nav.object_id.as_deref(),
            )
        })?;
        self.set_folders(folders);
        Ok(())
    }

    /// Replaces the folder list, keeping the cursor on the same folder when it survives.
    pub fn set_folders(&mut self, mut folders: Vec<ModFolder>) {
        let current = self.current().map(|f| f.path.clone());
        folders.sort_by(compare_folders);
        self.folders = folders;
        self.cursor = 0;
        self.follow(current);
    }

    fn resort(&mut self) {
        let current = self.current().map(|f| f.path.clone());
        self.folders.sort_by(compare_folders);
        self.follow(current);
    }

    fn follow(&mut self, path: Option<PathBuf>) {
        if let Some(path) = path {
            if let Some(pos) = self
                .visible_indices()
                .iter()
                .position(|idx| self.folders[*idx].path == path)
            {
                self.cursor = pos;
            }
        }
        self.clamp_cursor();
    }

    /// Moves the cursor onto `path` if it is visible.
    pub fn focus_path(&mut self, path: &Path) {
        self.follow(Some(path.to_path_buf()));
    }

    /// Indices into `folders()` that pass the text filter and safe mode.
    pub fn visible_indices(&self) -> Vec<usize> {
        let needle = self.filter.trim().to_lowercase();
        self.folders
            .iter()
            .enumerate()
            .filter(|(_, folder)| !self.safe_mode || folder.is_safe)
            .filter(|(_, folder)| needle.is_empty() || folder.name.to_lowercase().contains(&needle))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn visible(&self) -> Vec<&ModFolder> {
        self.visible_indices()
            .into_iter()
            .map(|idx| &self.folders[idx])
            .collect()
    }

    /// The folder under the cursor, where the cursor counts visible items.
    pub fn current(&self) -> Option<&ModFolder> {
        let visible = self.visible_indices();
        visible.get(self.cursor).map(|idx| &self.folders[*idx])
    }

    pub fn move_cursor(&mut self, dx: isize, dy: isize) {
        let len = self.visible_indices().len();
        if len == 0 {
            self.cursor = 0;
            return;
        }
        let columns = self.columns.max(1) as isize;
        let target = self.cursor as isize + dx + dy * columns;
        self.cursor = target.clamp(0, len as isize - 1) as usize;
    }

    pub fn clamp_cursor(&mut self) {
        let len = self.visible_indices().len();
        if self.cursor >= len {
            self.cursor = len.saturating_sub(1);
        }
    }

    /// Scrolls so the cursor row is on screen and returns the range of visible
    /// item positions to render.
    pub fn visible_window(&mut self, viewport_rows: usize, item_count: usize) -> Range<usize> {
        let columns = self.columns.max(1);
        let viewport_rows = viewport_rows.max(1);
        let total_rows = item_count.div_ceil(columns);
        let cursor_row = self.cursor / columns;
        if cursor_row < self.scroll_row {
            self.scroll_row = cursor_row;
        } else if cursor_row >= self.scroll_row + viewport_rows {
            self.scroll_row = cursor_row + 1 - viewport_rows;
        }
        self.scroll_row = self
            .scroll_row
            .min(total_rows.saturating_sub(viewport_rows));
        let start = self.scroll_row * columns;
        let end = ((self.scroll_row + viewport_rows) * columns).min(item_count);
        start.min(end)..end
    }

    /// Flips a folder's enabled state right away and renames it through the
    /// backend; the flip is undone if the rename fails.
    pub fn toggle_enabled(&mut self, path: &Path, client: &Client) -> Commit<PathBuf, BridgeError> {
        let Some(idx) = self.index_of(path) else {
            return Commit::RolledBack(BridgeError::rejected(format!(
                "{} is not listed",
                path.display()
            )));
        };
        let enable = !self.folders[idx].enabled;
        optimistic::commit(
            &mut self.folders,
            |folders| folders[idx].enabled = enable,
            || client.toggle_mod(path, enable),
            |folders, new_path| {
                let folder = &mut folders[idx];
                folder.folder_name = new_path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default();
                folder.path = new_path.clone();
            },
        )
    }

    pub fn toggle_favorite(&mut self, path: &Path, client: &Client) -> Commit<(), BridgeError> {
        let Some(idx) = self.index_of(path) else {
            return Commit::RolledBack(BridgeError::rejected(format!(
                "{} is not listed",
                path.display()
            )));
        };
        let favorite = !self.folders[idx].is_favorite;
        let outcome = optimistic::commit(
            &mut self.folders,
            |folders| folders[idx].is_favorite = favorite,
            || client.set_mod_favorite(path, favorite),
            |_, _| {},
        );
        if outcome.is_applied() {
            self.resort();
        }
        outcome
    }

    pub fn index_of(&self, path: &Path) -> Option<usize> {
        self.folders.iter().position(|folder| folder.path == path)
    }

    pub fn forget(&mut self, path: &Path) -> bool {
        let before = self.folders.len();
        self.folders.retain(|folder| folder.path != path);
        before != self.folders.len()
    }
}

fn compare_folders(a: &ModFolder, b: &ModFolder) -> Ordering {
    b.is_favorite
        .cmp(&a.is_favorite)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{client_with, ScriptedBridge};
    use serde_json::json;
    use std::sync::Arc;

    fn folder(name: &str, enabled: bool, favorite: bool, safe: bool) -> ModFolder {
        ModFolder {
            path: PathBuf::from(format!("/mods/{name}")),
            name: name.to_string(),
            folder_name: name.to_string(),
            enabled,
            is_favorite: favorite,
            thumbnail: None,
            is_safe: safe,
        }
    }

    fn grid() -> ModGrid {
        let mut grid = ModGrid::default();
        grid.set_folders(vec![
            folder("delta", true, false, true),
            folder("Alpha", true, false, true),
            folder("charlie", false, true, false),
            folder("bravo", false, false, true),
        ]);
        grid
    }

    #[test]
    fn favorites_sort_first_then_name() {
        let grid = grid();
        let names: Vec<&str> = grid.folders().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["charlie", "Alpha", "bravo", "delta"]);
    }

    #[test]
    fn safe_mode_and_filter_hide_folders() {
        let mut grid = grid();
        grid.safe_mode = true;
        assert_eq!(grid.visible().len(), 3);
        grid.safe_mode = false;
        grid.filter = "ALP".to_string();
        let visible = grid.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Alpha");
    }

    #[test]
    fn window_follows_cursor() {
        let mut grid = ModGrid::default();
        grid.set_folders((0..10).map(|i| folder(&format!("m{i}"), true, false, true)).collect());
        grid.columns = 3;
        assert_eq!(grid.visible_window(2, 10), 0..6);

        grid.cursor = 9;
        assert_eq!(grid.visible_window(2, 10), 6..10);

        grid.move_cursor(0, -3);
        assert_eq!(grid.cursor, 0);
        assert_eq!(grid.visible_window(2, 10), 0..6);
    }

    #[test]
    fn toggle_settles_on_new_path() {
        let bridge = Arc::new(ScriptedBridge::default());
        let client = client_with(&bridge);
        bridge.reply("toggle_mod", json!("/mods/DISABLED delta"));
        let mut grid = grid();

        let outcome = grid.toggle_enabled(Path::new("/mods/delta"), &client);
        assert_eq!(
            outcome.into_result().unwrap(),
            PathBuf::from("/mods/DISABLED delta")
        );
        let idx = grid.index_of(Path::new("/mods/DISABLED delta")).unwrap();
        assert!(!grid.folders()[idx].enabled);
        assert_eq!(grid.folders()[idx].folder_name, "DISABLED delta");
    }

    #[test]
    fn failed_toggle_rolls_back() {
        let bridge = Arc::new(ScriptedBridge::default());
        let client = client_with(&bridge);
        bridge.fail("toggle_mod", "folder in use");
        let mut grid = grid();
        let before = grid.folders().to_vec();

        let outcome = grid.toggle_enabled(Path::new("/mods/bravo"), &client);
        assert!(matches!(outcome, Commit::RolledBack(BridgeError::Rejected(_))));
        assert_eq!(grid.folders(), before.as_slice());
    }

    #[test]
    fn favorite_resorts_after_confirm() {
        let bridge = Arc::new(ScriptedBridge::default());
        let client = client_with(&bridge);
        let mut grid = grid();
        assert!(grid.toggle_favorite(Path::new("/mods/delta"), &client).is_applied());
        let names: Vec<&str> = grid.folders().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["charlie", "delta", "Alpha", "bravo"]);
    }
}
