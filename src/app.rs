use crate::{
    bridge::{local::LocalBackend, Bridge, Client},
    cache::QueryCache,
    config::AppConfig,
    error::{PinError, SaveError},
    game::{self, GameId},
    grid::ModGrid,
    models::{RandomProposal, WatchEvent},
    optimistic::Commit,
    panel::{MetadataField, PreviewPanel, SectionOutcome, SelectionOutcome},
    reports::{ConflictReport, DupReport},
    safe_mode::{DisableRequest, SafeModeGate},
    store::{NavigationStore, SelectionStore, ToastLevel, ToastStore},
    watch::{self, WatchContext, WatchNotice},
};
use anyhow::Result;
use std::{
    fmt::Display,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{mpsc::Receiver, Arc},
    time::{Duration, Instant},
};

const LOG_CAPACITY: usize = 200;
const TOAST_SHORT: Duration = Duration::from_secs(2);
const TOAST_LONG: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPurpose {
    EditField { field_id: String, label: String },
    EditMetadata(MetadataField),
    FilterMods,
    Pin,
    LocateFolder { missing: PathBuf },
    AddPreview,
    ModsPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing {
        prompt: String,
        buffer: String,
        purpose: InputPurpose,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogChoice {
    Yes,
    No,
    Cancel,
}

#[derive(Debug, Clone)]
pub enum DialogKind {
    UnsavedChanges,
    MissingFolder { path: PathBuf },
    RandomProposals { proposals: Vec<RandomProposal> },
    ResolveDuplicates,
    ClearPreviews,
}

#[derive(Debug, Clone)]
pub struct Dialog {
    pub title: String,
    pub message: String,
    pub yes_label: String,
    pub no_label: String,
    pub cancel_label: Option<String>,
    pub choice: DialogChoice,
    pub kind: DialogKind,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Grid,
    Preview,
    Log,
}

/// One selectable line in the preview pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewRow {
    Metadata(MetadataField),
    Group(String),
    Field(String),
}

pub enum Report {
    Conflicts(ConflictReport),
    Duplicates(DupReport),
}

pub struct App {
    pub config: AppConfig,
    client: Client,
    cache: QueryCache,
    pub nav: NavigationStore,
    pub selection: SelectionStore,
    pub grid: ModGrid,
    pub panel: PreviewPanel,
    pub safe_mode: SafeModeGate,
    pub toasts: ToastStore,
    pub report: Option<Report>,
    pub dialog: Option<Dialog>,
    pub input_mode: InputMode,
    pub focus: Focus,
    pub preview_cursor: usize,
    pub status: String,
    pub logs: Vec<LogEntry>,
    pub log_scroll: usize,
    pub should_quit: bool,
    quit_armed: bool,
    log_path: PathBuf,
    watch: Option<Receiver<WatchEvent>>,
    connect: Option<fn(&AppConfig) -> Arc<dyn Bridge>>,
}

fn local_bridge(config: &AppConfig) -> Arc<dyn Bridge> {
    Arc::new(LocalBackend::from_config(config))
}

impl App {
    pub fn initialize() -> Result<Self> {
        let config = AppConfig::load_or_create()?;
        let client = Client::new(local_bridge(&config));
        let mut app = Self::new(config, client);
        app.connect = Some(local_bridge);
        Ok(app)
    }

    pub fn new(config: AppConfig, client: Client) -> Self {
        let game_id = config.active_game;
        let nav = NavigationStore::new(game_id, config.mods_path(game_id));
        let safe_mode = SafeModeGate::new(config.safe_mode, config.pin_hash.is_some());
        let mut grid = ModGrid::default();
        grid.safe_mode = config.safe_mode;
        let log_path = config.log_path();
        let watch = subscribe(&client);

        let mut app = Self {
            config,
            client,
            cache: QueryCache::default(),
            nav,
            selection: SelectionStore::default(),
            grid,
            panel: PreviewPanel::default(),
            safe_mode,
            toasts: ToastStore::default(),
            report: None,
            dialog: None,
            input_mode: InputMode::Normal,
            focus: Focus::Grid,
            preview_cursor: 0,
            status: String::new(),
            logs: Vec::new(),
            log_scroll: 0,
            should_quit: false,
            quit_armed: false,
            log_path,
            watch,
            connect: None,
        };

        if app.nav.mods_path.is_none() {
            app.status = format!(
                "No mods folder set for {}: press M to set one",
                game_id.display_name()
            );
        } else {
            app.status = format!("{} ready", game_id.display_name());
        }
        app.refresh_grid();
        app.select_current();
        app
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn tick(&mut self) {
        self.toasts.prune(Instant::now());
        let mut events = Vec::new();
        if let Some(rx) = &self.watch {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        for event in events {
            self.handle_watch_event(&event);
        }
    }

    pub fn set_toast(&mut self, message: &str, level: ToastLevel, duration: Duration) {
        self.toasts.push(message, level, duration);
    }

    fn report_error(&mut self, action: &str, err: impl Display) {
        let message = format!("{action} failed: {err}");
        self.status = message.clone();
        self.set_toast(&message, ToastLevel::Error, TOAST_LONG);
        self.log_error(message);
    }

    // Grid

    pub fn refresh_grid(&mut self) {
        if let Err(err) = self.grid.load(&self.nav, &self.client, &mut self.cache) {
            self.report_error("Listing mods", err);
        }
    }

    /// Points the selection at the grid cursor and lets the preview panel follow.
    pub fn select_current(&mut self) {
        match self.grid.current().map(|folder| folder.path.clone()) {
            Some(path) => self.selection.select_only(&path),
            None => self.selection.clear(),
        }
        self.sync_panel();
    }

    fn sync_panel(&mut self) {
        let outcome = self
            .panel
            .sync_selection(&mut self.selection, &self.client, &mut self.cache);
        match outcome {
            Ok(SelectionOutcome::Deferred) => {
                if let Some(active) = self.panel.active_path().map(Path::to_path_buf) {
                    self.grid.focus_path(&active);
                }
                self.open_unsaved_dialog();
            }
            Ok(SelectionOutcome::Applied) => {
                self.preview_cursor = 0;
            }
            Ok(SelectionOutcome::Unchanged) => {}
            Err(err) => self.report_error("Loading mod", err),
        }
    }

    pub fn move_grid(&mut self, dx: isize, dy: isize) {
        self.grid.move_cursor(dx, dy);
        self.select_current();
    }

    /// Opens the folder under the cursor as a category.
    pub fn enter_folder(&mut self) {
        let Some(folder) = self.grid.current().map(|f| f.folder_name.clone()) else {
            return;
        };
        self.nav.enter(&folder);
        self.grid.cursor = 0;
        self.refresh_grid();
    }

    pub fn leave_folder(&mut self) {
        if self.nav.leave() {
            self.grid.cursor = 0;
            self.refresh_grid();
        }
    }

    pub fn toggle_current_enabled(&mut self) {
        let Some(path) = self.grid.current().map(|f| f.path.clone()) else {
            return;
        };
        match self.grid.toggle_enabled(&path, &self.client) {
            Commit::Applied(new_path) => {
                self.follow_rename(&path, &new_path);
                let enabled = self
                    .grid
                    .index_of(&new_path)
                    .map(|idx| self.grid.folders()[idx].enabled)
                    .unwrap_or(false);
                let verb = if enabled { "Enabled" } else { "Disabled" };
                self.log_info(format!("{verb} {}", display_name(&new_path)));
                self.status = format!("{verb} {}", display_name(&new_path));
            }
            Commit::RolledBack(err) => self.report_error("Toggle", err),
        }
    }

    pub fn toggle_current_favorite(&mut self) {
        let Some(path) = self.grid.current().map(|f| f.path.clone()) else {
            return;
        };
        match self.grid.toggle_favorite(&path, &self.client) {
            Commit::Applied(()) => {
                self.cache.invalidate_path(&path);
                self.grid.focus_path(&path);
            }
            Commit::RolledBack(err) => self.report_error("Favorite", err),
        }
    }

    pub fn enable_only_current(&mut self) {
        let Some(path) = self.grid.current().map(|f| f.path.clone()) else {
            return;
        };
        match self.client.enable_only_this(self.nav.game_id, &path) {
            Ok(new_path) => {
                self.follow_rename(&path, &new_path);
                if let Some(parent) = new_path.parent() {
                    self.cache.invalidate_path(parent);
                }
                self.refresh_grid();
                self.grid.focus_path(&new_path);
                self.log_info(format!("Enabled only {}", display_name(&new_path)));
            }
            Err(err) => self.report_error("Enable only", err),
        }
    }

    fn follow_rename(&mut self, from: &Path, to: &Path) {
        if from == to {
            return;
        }
        self.cache.invalidate_path(from);
        self.selection.rename(from, to);
        self.panel.follow_rename(from, to);
    }

    pub fn switch_game(&mut self, game_id: GameId) {
        self.config.active_game = game_id;
        if let Err(err) = self.config.save() {
            self.log_warn(format!("Config save failed: {err}"));
        }
        self.nav.switch_game(game_id, self.config.mods_path(game_id));
        self.cache.clear();
        self.grid.cursor = 0;
        self.refresh_grid();
        self.select_current();
        self.status = format!("Switched to {}", game_id.display_name());
    }

    pub fn cycle_game(&mut self) {
        let games = game::supported_games();
        let idx = games
            .iter()
            .position(|game| *game == self.nav.game_id)
            .unwrap_or(0);
        let next = games[(idx + 1) % games.len()];
        self.switch_game(next);
    }

    // Preview pane

    pub fn preview_rows(&self) -> Vec<PreviewRow> {
        if self.panel.active_path().is_none() {
            return Vec::new();
        }
        let mut rows: Vec<PreviewRow> = MetadataField::ALL
            .iter()
            .map(|field| PreviewRow::Metadata(*field))
            .collect();
        for group in self.panel.groups() {
            rows.push(PreviewRow::Group(group.id.clone()));
            if self.panel.is_expanded(&group.id) {
                rows.extend(group.fields.iter().map(|f| PreviewRow::Field(f.id.clone())));
            }
        }
        rows
    }

    pub fn move_preview(&mut self, delta: isize) {
        let len = self.preview_rows().len();
        if len == 0 {
            self.preview_cursor = 0;
            return;
        }
        let target = self.preview_cursor as isize + delta;
        self.preview_cursor = target.clamp(0, len as isize - 1) as usize;
    }

    pub fn activate_preview_row(&mut self) {
        let Some(row) = self.preview_rows().get(self.preview_cursor).cloned() else {
            return;
        };
        match row {
            PreviewRow::Metadata(field) => {
                let buffer = self.panel.metadata_value(field).to_string();
                self.start_input(
                    format!("{}:", field.label()),
                    buffer,
                    InputPurpose::EditMetadata(field),
                );
            }
            PreviewRow::Group(group_id) => self.toggle_section(&group_id),
            PreviewRow::Field(field_id) => {
                let Some(field) = self.panel.fields().iter().find(|f| f.id == field_id) else {
                    return;
                };
                let label = format!("[{}] {}", field.section_name, field.label);
                let buffer = self.panel.draft_value(&field_id).unwrap_or_default().to_string();
                self.start_input(
                    format!("{label} ="),
                    buffer,
                    InputPurpose::EditField { field_id, label },
                );
            }
        }
    }

    pub fn toggle_section(&mut self, group_id: &str) {
        if self.panel.toggle_section(group_id) == SectionOutcome::Deferred {
            self.open_unsaved_dialog();
        }
        let len = self.preview_rows().len();
        self.preview_cursor = self.preview_cursor.min(len.saturating_sub(1));
    }

    pub fn save(&mut self) {
        match self.panel.save(&self.client, &mut self.cache) {
            Ok(summary) if summary.is_empty() => {
                self.set_toast("Nothing to save", ToastLevel::Info, TOAST_SHORT);
            }
            Ok(summary) => self.report_saved(summary.metadata_saved, summary.files_written),
            Err(err) => self.report_save_error(err),
        }
    }

    fn report_saved(&mut self, metadata: bool, files: usize) {
        let mut parts = Vec::new();
        if metadata {
            parts.push("mod info".to_string());
        }
        if files > 0 {
            parts.push(format!("{files} ini file(s)"));
        }
        let message = format!("Saved {}", parts.join(" and "));
        self.status = message.clone();
        self.set_toast(&message, ToastLevel::Info, TOAST_SHORT);
        self.log_info(message);
    }

    fn report_save_error(&mut self, err: SaveError) {
        match &err {
            SaveError::Validation { .. } | SaveError::Orphaned { .. } => {
                let message = format!("Cannot save: {err}");
                self.status = message.clone();
                self.set_toast(&message, ToastLevel::Warn, TOAST_LONG);
                self.log_warn(message);
            }
            SaveError::Backend(_) => self.report_error("Save", err),
        }
    }

    pub fn discard(&mut self) {
        if !self.panel.has_unsaved_changes() {
            return;
        }
        self.panel.discard_changes();
        self.set_toast("Changes discarded", ToastLevel::Info, TOAST_SHORT);
    }

    pub fn remove_preview_image(&mut self) {
        let Some(image) = self.panel.previews().first().map(|p| p.file_name.clone()) else {
            self.set_toast("No preview image", ToastLevel::Info, TOAST_SHORT);
            return;
        };
        match self
            .panel
            .remove_preview(&image, &self.client, &mut self.cache)
        {
            Ok(()) => self.log_info(format!("Removed preview {image}")),
            Err(err) => self.report_error("Remove preview", err),
        }
    }

    // Safe mode

    pub fn toggle_safe_mode(&mut self) {
        if !self.safe_mode.is_enabled() {
            self.safe_mode.enable();
            self.apply_safe_mode();
            return;
        }
        self.safe_mode.set_pin_required(self.config.pin_hash.is_some());
        match self.safe_mode.request_disable() {
            DisableRequest::Disabled => self.apply_safe_mode(),
            DisableRequest::NeedsPin => {
                self.start_input("PIN:".to_string(), String::new(), InputPurpose::Pin);
            }
        }
    }

    fn apply_safe_mode(&mut self) {
        let enabled = self.safe_mode.is_enabled();
        self.grid.safe_mode = enabled;
        self.grid.clamp_cursor();
        self.config.safe_mode = enabled;
        if let Err(err) = self.config.save() {
            self.log_warn(format!("Config save failed: {err}"));
        }
        let message = if enabled { "Safe mode on" } else { "Safe mode off" };
        self.status = message.to_string();
        self.set_toast(message, ToastLevel::Info, TOAST_SHORT);
        self.log_info(message.to_string());
    }

    fn submit_pin(&mut self, pin: &str) {
        match self.safe_mode.submit_pin(pin, &self.client) {
            Ok(()) => self.apply_safe_mode(),
            Err(err) => {
                if matches!(err, PinError::Backend(_)) {
                    self.log_error(err.to_string());
                } else {
                    self.log_warn(err.to_string());
                }
                // The prompt stays open and shows the gate's error inline.
                self.input_mode = InputMode::Editing {
                    prompt: "PIN:".to_string(),
                    buffer: String::new(),
                    purpose: InputPurpose::Pin,
                };
            }
        }
    }

    // Reports

    pub fn open_conflicts(&mut self) {
        let Some(folder) = self.panel.active_path().map(Path::to_path_buf) else {
            return;
        };
        match ConflictReport::load(&self.client, &folder) {
            Ok(report) => {
                if report.is_empty() {
                    self.set_toast("No shader conflicts", ToastLevel::Info, TOAST_SHORT);
                }
                self.report = Some(Report::Conflicts(report));
            }
            Err(err) => self.report_error("Conflict check", err),
        }
    }

    pub fn open_duplicates(&mut self) {
        match DupReport::scan(&self.client, self.nav.game_id) {
            Ok(report) => {
                if report.is_empty() {
                    self.set_toast("No duplicates found", ToastLevel::Info, TOAST_SHORT);
                    return;
                }
                self.report = Some(Report::Duplicates(report));
            }
            Err(err) => self.report_error("Duplicate scan", err),
        }
    }

    pub fn close_report(&mut self) {
        self.report = None;
    }

    pub fn confirm_duplicates(&mut self) {
        let Some(Report::Duplicates(report)) = &self.report else {
            return;
        };
        let count = report.resolutions().len();
        let action = match report.action {
            crate::models::DupAction::Disable => "disable",
            crate::models::DupAction::Remove => "remove",
        };
        self.open_dialog(Dialog {
            title: "Resolve duplicates".to_string(),
            message: format!("Keep the chosen folder in {count} group(s) and {action} the rest?"),
            yes_label: "Resolve".to_string(),
            no_label: "Back".to_string(),
            cancel_label: None,
            choice: DialogChoice::Yes,
            kind: DialogKind::ResolveDuplicates,
        });
    }

    fn resolve_duplicates(&mut self) {
        let Some(Report::Duplicates(report)) = self.report.take() else {
            return;
        };
        match report.apply(&self.client, &mut self.cache) {
            Ok(count) => {
                self.log_info(format!("Resolved {count} duplicate group(s)"));
                self.refresh_grid();
                self.select_current();
            }
            Err(err) => {
                self.report = Some(Report::Duplicates(report));
                self.report_error("Resolve duplicates", err);
            }
        }
    }

    // Random

    pub fn suggest_random(&mut self) {
        let safe = self.safe_mode.is_enabled();
        match self.client.suggest_random_mods(self.nav.game_id, safe) {
            Ok(proposals) if proposals.is_empty() => {
                self.set_toast("Nothing to randomize", ToastLevel::Info, TOAST_SHORT);
            }
            Ok(proposals) => {
                let message = proposals
                    .iter()
                    .map(|p| format!("{}: {}", p.object_name, p.name))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.open_dialog(Dialog {
                    title: "Random mods".to_string(),
                    message,
                    yes_label: "Apply".to_string(),
                    no_label: "Cancel".to_string(),
                    cancel_label: None,
                    choice: DialogChoice::Yes,
                    kind: DialogKind::RandomProposals { proposals },
                });
            }
            Err(err) => self.report_error("Randomize", err),
        }
    }

    fn apply_random(&mut self, proposals: Vec<RandomProposal>) {
        let mut applied = 0;
        for proposal in &proposals {
            match self.client.enable_only_this(self.nav.game_id, &proposal.path) {
                Ok(new_path) => {
                    self.follow_rename(&proposal.path, &new_path);
                    applied += 1;
                }
                Err(err) => {
                    self.report_error(&format!("Enabling {}", proposal.name), err);
                }
            }
        }
        if let Some(root) = self.nav.mods_path.clone() {
            self.cache.invalidate_path(&root);
        }
        self.refresh_grid();
        self.log_info(format!("Applied {applied} random mod(s)"));
    }

    // Watch

    pub fn handle_watch_event(&mut self, event: &WatchEvent) {
        let current_dir = self.nav.current_dir();
        let active = self.panel.active_path().map(Path::to_path_buf);
        let ctx = WatchContext {
            mods_root: self.nav.mods_path.as_deref(),
            current_dir: current_dir.as_deref(),
            active: active.as_deref(),
        };
        let outcome = watch::route(event, ctx, &mut self.cache);
        tracing::debug!(?event, invalidated = outcome.invalidated, "watch event");

        if outcome.refresh_grid {
            self.refresh_grid();
        }
        for notice in outcome.notices {
            match notice {
                WatchNotice::Info(message) => {
                    self.status = message.clone();
                    self.log_info(message);
                }
                WatchNotice::Warn(message) => {
                    self.set_toast(&message, ToastLevel::Warn, TOAST_LONG);
                    self.log_warn(message);
                }
                WatchNotice::ActiveRemoved(path) => self.open_missing_dialog(path),
                WatchNotice::ActiveRenamed { from, to } => {
                    self.follow_rename(&from, &to);
                    self.grid.focus_path(&to);
                }
                WatchNotice::ActiveFileChanged(file_name) => {
                    self.panel
                        .reload_document(&file_name, &self.client, &mut self.cache);
                }
            }
        }
    }

    fn open_missing_dialog(&mut self, path: PathBuf) {
        self.log_warn(format!("Mod folder disappeared: {}", path.display()));
        self.open_dialog(Dialog {
            title: "Mod folder missing".to_string(),
            message: format!(
                "{} was moved or deleted.\nLocate it, or remove it from the list?",
                display_name(&path)
            ),
            yes_label: "Locate".to_string(),
            no_label: "Remove".to_string(),
            cancel_label: None,
            choice: DialogChoice::Yes,
            kind: DialogKind::MissingFolder { path },
        });
    }

    fn remove_missing(&mut self, path: &Path) {
        self.grid.forget(path);
        self.grid.clamp_cursor();
        self.selection.forget(path);
        self.cache.invalidate_path(path);
        self.panel.start_session(None);
        self.select_current();
        self.log_info(format!("Removed {} from the list", display_name(path)));
    }

    fn locate_folder(&mut self, missing: &Path, found: PathBuf) {
        if !found.is_dir() {
            self.report_error("Locate", format!("{} is not a folder", found.display()));
            self.open_missing_dialog(missing.to_path_buf());
            return;
        }
        self.cache.invalidate_path(missing);
        self.selection.select_only(&found);
        if let Err(err) = self.panel.open(Some(found.clone()), &self.client, &mut self.cache) {
            self.report_error("Loading mod", err);
        }
        self.refresh_grid();
        self.grid.focus_path(&found);
        self.log_info(format!("Located {}", found.display()));
    }

    // Dialogs

    fn open_dialog(&mut self, dialog: Dialog) {
        self.dialog = Some(dialog);
        self.input_mode = InputMode::Normal;
    }

    fn open_unsaved_dialog(&mut self) {
        let count = self.panel.dirty_field_count();
        let mut message = format!("{count} keybind field(s) changed");
        if self.panel.metadata_dirty() {
            message.push_str(" and mod info edited");
        }
        message.push_str(".\nSave before continuing?");
        self.open_dialog(Dialog {
            title: "Unsaved changes".to_string(),
            message,
            yes_label: "Save".to_string(),
            no_label: "Discard".to_string(),
            cancel_label: Some("Cancel".to_string()),
            choice: DialogChoice::Yes,
            kind: DialogKind::UnsavedChanges,
        });
    }

    pub fn open_clear_previews_dialog(&mut self) {
        if self.panel.previews().is_empty() {
            return;
        }
        self.open_dialog(Dialog {
            title: "Clear previews".to_string(),
            message: format!("Delete {} preview image(s)?", self.panel.previews().len()),
            yes_label: "Delete".to_string(),
            no_label: "Keep".to_string(),
            cancel_label: None,
            choice: DialogChoice::No,
            kind: DialogKind::ClearPreviews,
        });
    }

    pub fn close_dialog(&mut self) {
        self.dialog = None;
    }

    pub fn dialog_choice_left(&mut self) {
        if let Some(dialog) = &mut self.dialog {
            dialog.choice = match (dialog.choice, dialog.cancel_label.is_some()) {
                (DialogChoice::Cancel, _) => DialogChoice::No,
                (DialogChoice::No, _) => DialogChoice::Yes,
                (DialogChoice::Yes, true) => DialogChoice::Cancel,
                (DialogChoice::Yes, false) => DialogChoice::No,
            };
        }
    }

    pub fn dialog_choice_right(&mut self) {
        if let Some(dialog) = &mut self.dialog {
            dialog.choice = match (dialog.choice, dialog.cancel_label.is_some()) {
                (DialogChoice::Yes, _) => DialogChoice::No,
                (DialogChoice::No, true) => DialogChoice::Cancel,
                (DialogChoice::No, false) | (DialogChoice::Cancel, _) => DialogChoice::Yes,
            };
        }
    }

    pub fn dialog_set_choice(&mut self, choice: DialogChoice) {
        if let Some(dialog) = &mut self.dialog {
            if choice == DialogChoice::Cancel && dialog.cancel_label.is_none() {
                dialog.choice = DialogChoice::No;
            } else {
                dialog.choice = choice;
            }
        }
    }

    /// Backs out of the open dialog the least destructive way.
    pub fn dialog_escape(&mut self) {
        let cancel = self
            .dialog
            .as_ref()
            .map(|dialog| dialog.cancel_label.is_some())
            .unwrap_or(false);
        if cancel {
            self.dialog_set_choice(DialogChoice::Cancel);
            self.dialog_confirm();
            return;
        }
        match self.dialog.as_ref().map(|dialog| &dialog.kind) {
            // Escaping this one keeps the entry; only an explicit Remove drops it.
            Some(DialogKind::MissingFolder { .. }) => self.close_dialog(),
            _ => {
                self.dialog_set_choice(DialogChoice::No);
                self.dialog_confirm();
            }
        }
    }

    pub fn dialog_confirm(&mut self) {
        let Some(dialog) = self.dialog.take() else {
            return;
        };
        match (dialog.kind, dialog.choice) {
            (DialogKind::UnsavedChanges, DialogChoice::Yes) => {
                let result =
                    self.panel
                        .resolve_save(&mut self.selection, &self.client, &mut self.cache);
                match result {
                    Ok(summary) => {
                        if !summary.is_empty() {
                            self.report_saved(summary.metadata_saved, summary.files_written);
                        }
                        self.after_transition();
                    }
                    Err(err) => {
                        self.report_save_error(err);
                        self.open_unsaved_dialog();
                    }
                }
            }
            (DialogKind::UnsavedChanges, DialogChoice::No) => {
                let result =
                    self.panel
                        .resolve_discard(&mut self.selection, &self.client, &mut self.cache);
                if let Err(err) = result {
                    self.report_error("Loading mod", err);
                }
                self.after_transition();
            }
            (DialogKind::UnsavedChanges, DialogChoice::Cancel) => {
                self.panel.resolve_cancel();
                if let Some(active) = self.panel.active_path().map(Path::to_path_buf) {
                    self.grid.focus_path(&active);
                }
            }
            (DialogKind::MissingFolder { path }, DialogChoice::Yes) => {
                let buffer = path
                    .parent()
                    .map(|parent| parent.display().to_string())
                    .unwrap_or_default();
                self.start_input(
                    "Folder path:".to_string(),
                    buffer,
                    InputPurpose::LocateFolder { missing: path },
                );
            }
            (DialogKind::MissingFolder { path }, _) => self.remove_missing(&path),
            (DialogKind::RandomProposals { proposals }, DialogChoice::Yes) => {
                self.apply_random(proposals)
            }
            (DialogKind::ResolveDuplicates, DialogChoice::Yes) => self.resolve_duplicates(),
            (DialogKind::ClearPreviews, DialogChoice::Yes) => {
                if let Err(err) = self.panel.clear_previews(&self.client, &mut self.cache) {
                    self.report_error("Clear previews", err);
                }
            }
            _ => {}
        }
    }

    fn after_transition(&mut self) {
        self.preview_cursor = 0;
        if let Some(active) = self.panel.active_path().map(Path::to_path_buf) {
            self.grid.focus_path(&active);
        }
        let len = self.preview_rows().len();
        self.preview_cursor = self.preview_cursor.min(len.saturating_sub(1));
    }

    // Input

    pub fn start_input(&mut self, prompt: String, buffer: String, purpose: InputPurpose) {
        self.input_mode = InputMode::Editing {
            prompt,
            buffer,
            purpose,
        };
    }

    pub fn enter_filter(&mut self) {
        let buffer = self.grid.filter.clone();
        self.start_input("Filter:".to_string(), buffer, InputPurpose::FilterMods);
    }

    pub fn enter_mods_path(&mut self) {
        let buffer = self
            .nav
            .mods_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        self.start_input(
            format!(
                "{} mods folder (.../{}/Mods):",
                self.nav.game_id.display_name(),
                self.nav.game_id.loader_dir_name()
            ),
            buffer,
            InputPurpose::ModsPath,
        );
    }

    pub fn enter_add_preview(&mut self) {
        if self.panel.active_path().is_none() {
            return;
        }
        self.start_input("Image path:".to_string(), String::new(), InputPurpose::AddPreview);
    }

    pub fn cancel_input(&mut self, purpose: &InputPurpose) {
        self.input_mode = InputMode::Normal;
        match purpose {
            InputPurpose::Pin => self.safe_mode.close_prompt(),
            InputPurpose::LocateFolder { missing } => self.open_missing_dialog(missing.clone()),
            _ => {}
        }
    }

    pub fn handle_submit(&mut self, purpose: InputPurpose, value: String) -> Result<()> {
        match purpose {
            InputPurpose::EditField { field_id, label } => {
                if !self.panel.edit_field(&field_id, value) {
                    self.log_warn(format!("{label} is no longer available"));
                }
            }
            InputPurpose::EditMetadata(field) => {
                self.panel.edit_metadata(field, value.trim().to_string());
            }
            InputPurpose::FilterMods => {
                self.grid.filter = value.trim().to_string();
                self.grid.cursor = 0;
                self.select_current();
            }
            InputPurpose::Pin => self.submit_pin(&value),
            InputPurpose::LocateFolder { missing } => {
                self.locate_folder(&missing, PathBuf::from(value.trim()));
            }
            InputPurpose::AddPreview => {
                let source = PathBuf::from(value.trim());
                self.panel
                    .add_preview(&source, &self.client, &mut self.cache)?;
                self.log_info(format!("Added preview {}", display_name(&source)));
            }
            InputPurpose::ModsPath => {
                let path = PathBuf::from(value.trim());
                if !game::looks_like_mods_root(&path) {
                    self.set_toast(
                        "That folder does not exist",
                        ToastLevel::Warn,
                        TOAST_LONG,
                    );
                    return Ok(());
                }
                self.config.set_mods_path(self.nav.game_id, path);
                self.config.save()?;
                if let Some(connect) = self.connect {
                    self.client = Client::new(connect(&self.config));
                    self.watch = subscribe(&self.client);
                }
                let game_id = self.nav.game_id;
                self.switch_game(game_id);
            }
        }
        Ok(())
    }

    /// Quitting with unsaved edits needs a second press.
    pub fn request_quit(&mut self) {
        if self.panel.has_unsaved_changes() && !self.quit_armed {
            self.quit_armed = true;
            self.set_toast(
                "Unsaved changes: press q again to quit, Ctrl+S to save",
                ToastLevel::Warn,
                TOAST_LONG,
            );
            return;
        }
        self.should_quit = true;
    }

    pub fn disarm_quit(&mut self) {
        self.quit_armed = false;
    }

    pub fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Grid => Focus::Preview,
            Focus::Preview => Focus::Log,
            Focus::Log => Focus::Grid,
        };
    }

    // Log

    pub fn scroll_log_up(&mut self, lines: usize) {
        self.log_scroll = self.log_scroll.saturating_add(lines);
    }

    pub fn scroll_log_down(&mut self, lines: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(lines);
    }

    pub fn log_info(&mut self, message: String) {
        self.push_log(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: String) {
        self.push_log(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: String) {
        self.push_log(LogLevel::Error, message);
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        if self.log_scroll > 0 {
            self.log_scroll = self.log_scroll.saturating_add(1);
        }

        self.logs.push(LogEntry {
            level,
            message: message.clone(),
        });

        if self.logs.len() > LOG_CAPACITY {
            let overflow = self.logs.len() - LOG_CAPACITY;
            self.logs.drain(0..overflow);
            self.log_scroll = self.log_scroll.saturating_sub(overflow);
        }

        let _ = append_log_file(&self.log_path, level, &message);
    }
}

fn subscribe(client: &Client) -> Option<Receiver<WatchEvent>> {
    match client.watch_events() {
        Ok(rx) => Some(rx),
        Err(err) => {
            tracing::warn!(error = %err, "watch channel unavailable");
            None
        }
    }
}

pub fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(path: &Path, level: LogLevel, message: &str) -> std::io::Result<()> {
    let label = log_level_label(level);
    let stamp = time::OffsetDateTime::now_utc()
        .format(time::macros::format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{stamp} [{label}] {message}")
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bridge::testing::{client_with, ScriptedBridge},
        ini::parse_ini,
        panel::PendingTransition,
    };
    use serde_json::json;
    use tempfile::TempDir;

    const A_INI: &str = "[KeySwap]\nkey = VK_F6\n";

    struct Harness {
        _dir: TempDir,
        bridge: Arc<ScriptedBridge>,
        app: App,
    }

    fn folder_json(name: &str, favorite: bool) -> serde_json::Value {
        json!({
            "path": format!("/mods/{name}"),
            "name": name,
            "folder_name": name,
            "enabled": true,
            "is_favorite": favorite,
            "thumbnail": null,
            "is_safe": true
        })
    }

    fn script_mod(bridge: &ScriptedBridge, name: &str, ini: &str) {
        bridge.reply("read_mod_info", json!({ "title": name }));
        bridge.reply(
            "list_mod_ini_files",
            json!([{ "filename": "a.ini", "path": format!("/mods/{name}/a.ini") }]),
        );
        bridge.reply(
            "read_mod_ini",
            serde_json::to_value(parse_ini("a.ini", ini)).unwrap(),
        );
        bridge.reply("list_mod_preview_images", json!([]));
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let mods = dir.path().join("Mods");
        fs::create_dir_all(&mods).unwrap();
        let mut config = AppConfig::load_or_create_in(dir.path().join("data")).unwrap();
        config.set_mods_path(GameId::Genshin, mods);

        let bridge = Arc::new(ScriptedBridge::default());
        bridge.reply(
            "list_mod_folders",
            json!([folder_json("Alpha", false), folder_json("Bravo", false)]),
        );
        script_mod(&bridge, "Alpha", A_INI);
        let app = App::new(config, client_with(&bridge));
        Harness {
            _dir: dir,
            bridge,
            app,
        }
    }

    fn first_field(app: &App) -> String {
        app.panel.fields()[0].id.clone()
    }

    #[test]
    fn startup_selects_first_mod() {
        let h = harness();
        assert_eq!(h.app.panel.active_path(), Some(Path::new("/mods/Alpha")));
        assert_eq!(h.app.selection.primary(), Some(Path::new("/mods/Alpha")));
        assert_eq!(h.app.panel.fields().len(), 1);
    }

    #[test]
    fn moving_with_dirty_edits_opens_unsaved_dialog() {
        let mut h = harness();
        let id = first_field(&h.app);
        h.app.panel.edit_field(&id, "VK_F9".to_string());

        h.app.move_grid(0, 1);
        assert!(matches!(
            h.app.dialog.as_ref().map(|d| &d.kind),
            Some(DialogKind::UnsavedChanges)
        ));
        assert_eq!(h.app.panel.active_path(), Some(Path::new("/mods/Alpha")));
        assert_eq!(h.app.grid.current().unwrap().name, "Alpha");

        script_mod(&h.bridge, "Bravo", A_INI);
        h.app.dialog_set_choice(DialogChoice::No);
        h.app.dialog_confirm();
        assert!(h.app.dialog.is_none());
        assert_eq!(h.app.panel.active_path(), Some(Path::new("/mods/Bravo")));
        assert_eq!(h.app.grid.current().unwrap().name, "Bravo");
        assert!(!h.app.panel.has_unsaved_changes());
    }

    #[test]
    fn cancel_keeps_drafts_and_clears_transition() {
        let mut h = harness();
        let id = first_field(&h.app);
        h.app.panel.edit_field(&id, "VK_F9".to_string());
        h.app.move_grid(0, 1);

        h.app.dialog_escape();
        assert!(h.app.dialog.is_none());
        assert_eq!(h.app.panel.transition(), &PendingTransition::Idle);
        assert_eq!(h.app.panel.draft_value(&id), Some("VK_F9"));
    }

    #[test]
    fn invalid_draft_keeps_dialog_open() {
        let mut h = harness();
        let id = first_field(&h.app);
        h.app.panel.edit_field(&id, "   ".to_string());
        h.app.move_grid(0, 1);

        h.app.dialog_set_choice(DialogChoice::Yes);
        h.app.dialog_confirm();
        assert!(matches!(
            h.app.dialog.as_ref().map(|d| &d.kind),
            Some(DialogKind::UnsavedChanges)
        ));
        assert!(h.bridge.calls_to("write_mod_ini").is_empty());
        assert_eq!(h.app.logs.last().unwrap().level, LogLevel::Warn);
    }

    #[test]
    fn failed_toggle_is_logged_and_rolled_back() {
        let mut h = harness();
        h.bridge.fail("toggle_mod", "access denied");
        h.app.toggle_current_enabled();
        assert!(h.app.grid.current().unwrap().enabled);
        let last = h.app.logs.last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert!(last.message.contains("access denied"));
        assert!(h.app.toasts.latest().is_some());
    }

    #[test]
    fn toggle_follows_renamed_active_mod() {
        let mut h = harness();
        h.bridge.reply("toggle_mod", json!("/mods/DISABLED Alpha"));
        h.app.toggle_current_enabled();
        assert_eq!(
            h.app.panel.active_path(),
            Some(Path::new("/mods/DISABLED Alpha"))
        );
        assert_eq!(
            h.app.selection.primary(),
            Some(Path::new("/mods/DISABLED Alpha"))
        );
    }

    #[test]
    fn removed_active_mod_asks_locate_or_remove() {
        let mut h = harness();
        h.app.handle_watch_event(&WatchEvent::Removed {
            path: PathBuf::from("/mods/Alpha"),
        });
        assert!(matches!(
            h.app.dialog.as_ref().map(|d| &d.kind),
            Some(DialogKind::MissingFolder { .. })
        ));

        script_mod(&h.bridge, "Bravo", A_INI);
        h.app.dialog_set_choice(DialogChoice::No);
        h.app.dialog_confirm();
        assert_eq!(h.app.panel.active_path(), Some(Path::new("/mods/Bravo")));
        assert_ne!(h.app.panel.active_path(), Some(Path::new("/mods/Alpha")));
        assert!(h.app.grid.index_of(Path::new("/mods/Alpha")).is_none());
    }

    #[test]
    fn random_proposals_apply_through_enable_only_this() {
        let mut h = harness();
        h.bridge.reply(
            "suggest_random_mods",
            json!([{ "object_name": "Raiden", "path": "/mods/Bravo", "name": "Bravo" }]),
        );
        h.app.suggest_random();
        assert!(matches!(
            h.app.dialog.as_ref().map(|d| &d.kind),
            Some(DialogKind::RandomProposals { .. })
        ));
        h.bridge.reply("enable_only_this", json!("/mods/Bravo"));
        h.app.dialog_confirm();
        assert_eq!(h.bridge.calls_to("enable_only_this").len(), 1);
        assert_eq!(
            h.bridge.calls_to("suggest_random_mods")[0]["is_safe"],
            json!(false)
        );
    }

    #[test]
    fn wrong_pin_keeps_prompt_open() {
        let mut h = harness();
        h.app.config.set_pin(Some("1234"));
        h.app.safe_mode.enable();
        h.app.toggle_safe_mode();
        assert!(matches!(
            h.app.input_mode,
            InputMode::Editing {
                purpose: InputPurpose::Pin,
                ..
            }
        ));

        h.bridge.reply(
            "verify_pin",
            json!({ "valid": false, "attempts_remaining": 4 }),
        );
        h.app.handle_submit(InputPurpose::Pin, "0000".to_string()).unwrap();
        assert!(h.app.safe_mode.is_enabled());
        assert!(h.app.safe_mode.error().is_some());
        assert!(matches!(h.app.input_mode, InputMode::Editing { .. }));
    }

    #[test]
    fn quit_with_unsaved_changes_needs_confirmation() {
        let mut h = harness();
        let id = first_field(&h.app);
        h.app.panel.edit_field(&id, "VK_F9".to_string());
        h.app.request_quit();
        assert!(!h.app.should_quit);
        h.app.request_quit();
        assert!(h.app.should_quit);
    }

    #[test]
    fn log_is_capped_and_mirrored_to_file() {
        let mut h = harness();
        for idx in 0..(LOG_CAPACITY + 5) {
            h.app.log_info(format!("entry {idx}"));
        }
        assert_eq!(h.app.logs.len(), LOG_CAPACITY);
        let written = fs::read_to_string(h.app.config.log_path()).unwrap();
        assert!(written.contains("[INFO] entry 0"));
    }
}
