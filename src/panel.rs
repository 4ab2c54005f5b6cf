//! Preview/editor panel for the active mod: metadata, keybind fields and the
//! guard that keeps unsaved edits from being dropped by a selection change or
//! a section collapse.

use crate::{
    bridge::Client,
    cache::{QueryCache, QueryKey},
    error::{BridgeError, SaveError},
    keybind::{self, FieldValueMap, KeyBindEditableField, KeyBindGroup},
    models::{IniDocument, IniFileEntry, ModInfo, ModInfoUpdate, PreviewImage},
    store::SelectionStore,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PendingTransition {
    #[default]
    Idle,
    /// Switch the panel to another mod (or to nothing).
    Mod(Option<PathBuf>),
    /// Collapse the keybind group with this id.
    Collapse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    Unchanged,
    Applied,
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionOutcome {
    Expanded,
    Collapsed,
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Title,
    Author,
    Version,
    Description,
}

impl MetadataField {
    pub const ALL: [MetadataField; 4] = [
        MetadataField::Title,
        MetadataField::Author,
        MetadataField::Version,
        MetadataField::Description,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MetadataField::Title => "Title",
            MetadataField::Author => "Author",
            MetadataField::Version => "Version",
            MetadataField::Description => "Description",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFields {
    pub title: String,
    pub author: String,
    pub version: String,
    pub description: String,
}

impl MetadataFields {
    pub fn get(&self, field: MetadataField) -> &str {
        match field {
            MetadataField::Title => &self.title,
            MetadataField::Author => &self.author,
            MetadataField::Version => &self.version,
            MetadataField::Description => &self.description,
        }
    }

    fn set(&mut self, field: MetadataField, value: String) {
        match field {
            MetadataField::Title => self.title = value,
            MetadataField::Author => self.author = value,
            MetadataField::Version => self.version = value,
            MetadataField::Description => self.description = value,
        }
    }

    fn diff(&self, synced: &MetadataFields) -> ModInfoUpdate {
        let changed = |field: MetadataField| {
            let draft = self.get(field);
            (draft != synced.get(field)).then(|| draft.to_string())
        };
        ModInfoUpdate {
            title: changed(MetadataField::Title),
            author: changed(MetadataField::Author),
            version: changed(MetadataField::Version),
            description: changed(MetadataField::Description),
            ..ModInfoUpdate::default()
        }
    }
}

impl From<&ModInfo> for MetadataFields {
    fn from(info: &ModInfo) -> Self {
        Self {
            title: info.title.clone(),
            author: info.author.clone(),
            version: info.version.clone(),
            description: info.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSlot {
    Loading,
    Ready(IniDocument),
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub metadata_saved: bool,
    pub files_written: usize,
}

impl SaveSummary {
    pub fn is_empty(&self) -> bool {
        !self.metadata_saved && self.files_written == 0
    }
}

#[derive(Debug, Default)]
pub struct PreviewPanel {
    active_path: Option<PathBuf>,
    info: Option<ModInfo>,
    ini_files: Vec<IniFileEntry>,
    documents: BTreeMap<String, DocumentSlot>,
    groups: Vec<KeyBindGroup>,
    fields: Vec<KeyBindEditableField>,
    field_ids: Vec<String>,
    draft_by_field: FieldValueMap,
    initial_by_field: FieldValueMap,
    metadata_synced: MetadataFields,
    metadata_draft: MetadataFields,
    previews: Vec<PreviewImage>,
    expanded: BTreeSet<String>,
    transition: PendingTransition,
    show_unsaved_modal: bool,
    load_error: Option<String>,
}

impl PreviewPanel {
    pub fn active_path(&self) -> Option<&Path> {
        self.active_path.as_deref()
    }

    pub fn info(&self) -> Option<&ModInfo> {
        self.info.as_ref()
    }

    pub fn ini_files(&self) -> &[IniFileEntry] {
        &self.ini_files
    }

    pub fn document_slots(&self) -> impl Iterator<Item = (&String, &DocumentSlot)> {
        self.documents.iter()
    }

    pub fn groups(&self) -> &[KeyBindGroup] {
        &self.groups
    }

    pub fn fields(&self) -> &[KeyBindEditableField] {
        &self.fields
    }

    pub fn previews(&self) -> &[PreviewImage] {
        &self.previews
    }

    pub fn transition(&self) -> &PendingTransition {
        &self.transition
    }

    pub fn show_unsaved_modal(&self) -> bool {
        self.show_unsaved_modal
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn draft_by_field(&self) -> &FieldValueMap {
        &self.draft_by_field
    }

    pub fn initial_by_field(&self) -> &FieldValueMap {
        &self.initial_by_field
    }

    pub fn is_expanded(&self, group_id: &str) -> bool {
        self.expanded.contains(group_id)
    }

    /// Current draft for a field. Fields that arrived while edits were pending
    /// have no map entry yet and read as their derived value.
    pub fn draft_value(&self, field_id: &str) -> Option<&str> {
        self.draft_by_field
            .get(field_id)
            .or_else(|| self.initial_by_field.get(field_id))
            .map(String::as_str)
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|field| field.id == field_id)
                    .map(|field| field.value.as_str())
            })
    }

    pub fn metadata_value(&self, field: MetadataField) -> &str {
        self.metadata_draft.get(field)
    }

    /// A draft is dirty when it differs from its initial value, or from the
    /// derived value for fields that arrived while edits were pending. Drafts
    /// whose field no longer exists always count as dirty.
    pub fn is_field_dirty(&self, field_id: &str) -> bool {
        let Some(draft) = self.draft_by_field.get(field_id) else {
            return false;
        };
        match self.initial_by_field.get(field_id) {
            Some(initial) => draft != initial,
            None => self
                .fields
                .iter()
                .find(|field| field.id == field_id)
                .map_or(true, |field| *draft != field.value),
        }
    }

    pub fn is_section_dirty(&self, group_id: &str) -> bool {
        self.groups
            .iter()
            .filter(|group| group.id == group_id)
            .flat_map(|group| group.fields.iter())
            .any(|field| self.is_field_dirty(&field.id))
    }

    pub fn has_unsaved_editor_changes(&self) -> bool {
        self.draft_by_field.keys().any(|id| self.is_field_dirty(id))
    }

    pub fn metadata_dirty(&self) -> bool {
        self.metadata_draft != self.metadata_synced
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.has_unsaved_editor_changes() || self.metadata_dirty()
    }

    pub fn dirty_field_count(&self) -> usize {
        self.draft_by_field
            .keys()
            .filter(|id| self.is_field_dirty(id))
            .count()
    }

    /// Follows the externally selected mod. A change is applied at once when
    /// nothing is dirty; otherwise it is parked as a pending transition and
    /// the selection store is pointed back at the active mod.
    pub fn sync_selection(
        &mut self,
        selection: &mut SelectionStore,
        client: &Client,
        cache: &mut QueryCache,
    ) -> Result<SelectionOutcome, BridgeError> {
        let requested = selection.primary().map(Path::to_path_buf);
        if requested == self.active_path {
            return Ok(SelectionOutcome::Unchanged);
        }

        if self.has_unsaved_changes() {
            tracing::debug!(?requested, "deferring mod switch, unsaved changes");
            self.transition = PendingTransition::Mod(requested);
            self.show_unsaved_modal = true;
            selection.reassert(self.active_path.as_deref());
            return Ok(SelectionOutcome::Deferred);
        }

        self.open(requested, client, cache)?;
        Ok(SelectionOutcome::Applied)
    }

    /// Expands a collapsed group, or collapses an expanded one unless it holds
    /// unsaved field edits, in which case the collapse waits on the modal.
    pub fn toggle_section(&mut self, group_id: &str) -> SectionOutcome {
        if !self.expanded.contains(group_id) {
            self.expanded.insert(group_id.to_string());
            return SectionOutcome::Expanded;
        }
        if self.is_section_dirty(group_id) {
            self.transition = PendingTransition::Collapse(group_id.to_string());
            self.show_unsaved_modal = true;
            return SectionOutcome::Deferred;
        }
        self.expanded.remove(group_id);
        SectionOutcome::Collapsed
    }

    pub fn edit_field(&mut self, field_id: &str, value: String) -> bool {
        if !self.fields.iter().any(|field| field.id == field_id) {
            return false;
        }
        self.draft_by_field.insert(field_id.to_string(), value);
        true
    }

    pub fn edit_metadata(&mut self, field: MetadataField, value: String) {
        self.metadata_draft.set(field, value);
    }

    pub fn discard_changes(&mut self) {
        self.draft_by_field = self.initial_by_field.clone();
        self.metadata_draft = self.metadata_synced.clone();
    }

    pub fn resolve_discard(
        &mut self,
        selection: &mut SelectionStore,
        client: &Client,
        cache: &mut QueryCache,
    ) -> Result<(), BridgeError> {
        self.discard_changes();
        self.apply_pending(selection, client, cache)
    }

    /// Saves, then applies the pending transition. On any failure the drafts,
    /// the transition and the modal stay as they were.
    pub fn resolve_save(
        &mut self,
        selection: &mut SelectionStore,
        client: &Client,
        cache: &mut QueryCache,
    ) -> Result<SaveSummary, SaveError> {
        let summary = self.save(client, cache)?;
        self.apply_pending(selection, client, cache)?;
        Ok(summary)
    }

    pub fn resolve_cancel(&mut self) {
        self.transition = PendingTransition::Idle;
        self.show_unsaved_modal = false;
    }

    fn apply_pending(
        &mut self,
        selection: &mut SelectionStore,
        client: &Client,
        cache: &mut QueryCache,
    ) -> Result<(), BridgeError> {
        let transition = std::mem::take(&mut self.transition);
        self.show_unsaved_modal = false;
        match transition {
            PendingTransition::Idle => Ok(()),
            PendingTransition::Mod(path) => {
                selection.reassert(path.as_deref());
                self.open(path, client, cache)
            }
            PendingTransition::Collapse(group_id) => {
                self.expanded.remove(&group_id);
                Ok(())
            }
        }
    }

    /// Persists dirty metadata and every changed keybind field. Field patches
    /// are validated before anything is sent, written one file at a time and
    /// the written documents are refetched before dirty state clears.
    pub fn save(&mut self, client: &Client, cache: &mut QueryCache) -> Result<SaveSummary, SaveError> {
        let Some(folder) = self.active_path.clone() else {
            return Ok(SaveSummary::default());
        };
        if let Some(field_id) = self.orphaned_draft() {
            return Err(SaveError::Orphaned {
                label: describe_field_id(&field_id),
                field_id,
            });
        }
        let patches =
            keybind::build_file_patches(&self.fields, &self.draft_by_field, &self.initial_by_field)?;

        let mut summary = SaveSummary::default();
        if self.metadata_dirty() {
            let update = self.metadata_draft.diff(&self.metadata_synced);
            let info = client.update_mod_info(&folder, &update)?;
            cache.invalidate(&QueryKey::ModInfo(folder.clone()));
            self.metadata_synced = MetadataFields::from(&info);
            self.metadata_draft = self.metadata_synced.clone();
            self.info = Some(info);
            summary.metadata_saved = true;
        }

        for patch in &patches {
            client.write_mod_ini(&folder, &patch.file_name, &patch.updates)?;
            cache.invalidate(&document_key(&folder, &patch.file_name));
            summary.files_written += 1;
        }
        if patches.is_empty() {
            return Ok(summary);
        }

        for patch in &patches {
            let document = fetch_document(client, cache, &folder, &patch.file_name)?;
            self.documents
                .insert(patch.file_name.clone(), DocumentSlot::Ready(document));
        }
        self.rebuild_fields();
        self.reset_field_maps();
        tracing::info!(files = summary.files_written, "saved keybind edits");
        Ok(summary)
    }

    /// Loads `path` into the panel, dropping whatever was shown before.
    pub fn open(
        &mut self,
        path: Option<PathBuf>,
        client: &Client,
        cache: &mut QueryCache,
    ) -> Result<(), BridgeError> {
        self.start_session(path.clone());
        let Some(folder) = path else {
            return Ok(());
        };

        let loaded = self.load_folder(&folder, client, cache);
        if let Err(err) = &loaded {
            self.load_error = Some(err.to_string());
        }
        loaded
    }

    fn load_folder(
        &mut self,
        folder: &Path,
        client: &Client,
        cache: &mut QueryCache,
    ) -> Result<(), BridgeError> {
        let info = cache.fetch(QueryKey::ModInfo(folder.to_path_buf()), || {
            client.read_mod_info(folder)
        })?;
        self.set_info(info);

        let files = cache.fetch(QueryKey::IniFiles(folder.to_path_buf()), || {
            client.list_mod_ini_files(folder)
        })?;
        self.set_ini_files(files);
        self.load_documents(client, cache);

        self.previews = cache.fetch(QueryKey::PreviewImages(folder.to_path_buf()), || {
            client.list_mod_preview_images(folder)
        })?;
        Ok(())
    }

    pub fn start_session(&mut self, path: Option<PathBuf>) {
        *self = PreviewPanel {
            active_path: path,
            ..PreviewPanel::default()
        };
    }

    pub fn set_info(&mut self, info: Option<ModInfo>) {
        let fields = info.as_ref().map(MetadataFields::from).unwrap_or_default();
        self.metadata_synced = fields.clone();
        self.metadata_draft = fields;
        self.info = info;
    }

    pub fn set_ini_files(&mut self, files: Vec<IniFileEntry>) {
        self.documents = files
            .iter()
            .map(|file| (file.filename.clone(), DocumentSlot::Loading))
            .collect();
        self.ini_files = files;
        self.rebuild_fields();
        self.reset_field_maps();
    }

    /// Fetches every listed document; each result is folded in as it arrives.
    pub fn load_documents(&mut self, client: &Client, cache: &mut QueryCache) {
        let Some(folder) = self.active_path.clone() else {
            return;
        };
        let names: Vec<String> = self.ini_files.iter().map(|f| f.filename.clone()).collect();
        for name in names {
            let result = fetch_document(client, cache, &folder, &name);
            self.receive_document(&name, result);
        }
    }

    /// Folds one document result into the derived fields. The draft/initial
    /// maps follow the new derivation only while nothing is dirty.
    pub fn receive_document(&mut self, file_name: &str, result: Result<IniDocument, BridgeError>) {
        let slot = match result {
            Ok(document) => DocumentSlot::Ready(document),
            Err(err) => {
                tracing::warn!(file = file_name, error = %err, "ini document failed to load");
                DocumentSlot::Failed(err.to_string())
            }
        };
        let previous = std::mem::take(&mut self.fields);
        self.documents.insert(file_name.to_string(), slot);
        self.rebuild_fields();
        if self.has_unsaved_editor_changes() {
            self.carry_drafts(&previous);
        } else {
            self.reset_field_maps();
        }
    }

    /// Moves dirty drafts whose field id vanished (lines shifted under them)
    /// onto the live field with the same file, section and label, nearest
    /// line first. Drafts with no match stay behind and block saving.
    fn carry_drafts(&mut self, previous: &[KeyBindEditableField]) {
        let live: BTreeSet<String> = self.field_ids.iter().cloned().collect();
        let stale: Vec<&KeyBindEditableField> = previous
            .iter()
            .filter(|field| !live.contains(&field.id))
            .collect();

        for old in stale {
            let Some(draft) = self.draft_by_field.get(&old.id) else {
                continue;
            };
            let baseline = self.initial_by_field.get(&old.id).unwrap_or(&old.value);
            if draft == baseline {
                self.draft_by_field.remove(&old.id);
                self.initial_by_field.remove(&old.id);
                continue;
            }
            let target = self
                .fields
                .iter()
                .filter(|field| {
                    field.file_name == old.file_name
                        && field.section_name == old.section_name
                        && field.label == old.label
                        && !self.is_field_dirty(&field.id)
                })
                .min_by_key(|field| field.line_idx.abs_diff(old.line_idx))
                .map(|field| field.id.clone());
            let Some(target) = target else {
                tracing::warn!(field = %old.id, "unsaved edit lost its line after reload");
                continue;
            };
            if let Some(draft) = self.draft_by_field.remove(&old.id) {
                self.initial_by_field.remove(&old.id);
                tracing::debug!(from = %old.id, to = %target, "carried draft to moved line");
                self.draft_by_field.insert(target, draft);
            }
        }
    }

    /// First dirty draft with no live field behind it.
    fn orphaned_draft(&self) -> Option<String> {
        self.draft_by_field
            .keys()
            .find(|id| !self.field_ids.contains(id) && self.is_field_dirty(id))
            .cloned()
    }

    /// Refetches a document after an outside change to it.
    pub fn reload_document(&mut self, file_name: &str, client: &Client, cache: &mut QueryCache) {
        let Some(folder) = self.active_path.clone() else {
            return;
        };
        if !self.documents.contains_key(file_name) {
            return;
        }
        cache.invalidate(&document_key(&folder, file_name));
        let result = fetch_document(client, cache, &folder, file_name);
        self.receive_document(file_name, result);
    }

    /// Keeps the panel on a folder that was renamed underneath it.
    pub fn follow_rename(&mut self, from: &Path, to: &Path) {
        if self.active_path.as_deref() == Some(from) {
            self.active_path = Some(to.to_path_buf());
        }
        if let PendingTransition::Mod(Some(target)) = &mut self.transition {
            if target.as_path() == from {
                *target = to.to_path_buf();
            }
        }
    }

    pub fn add_preview(
        &mut self,
        source: &Path,
        client: &Client,
        cache: &mut QueryCache,
    ) -> Result<(), BridgeError> {
        let Some(folder) = self.active_path.clone() else {
            return Ok(());
        };
        client.save_mod_preview_image(&folder, source)?;
        self.refresh_previews(&folder, client, cache)
    }

    pub fn remove_preview(
        &mut self,
        file_name: &str,
        client: &Client,
        cache: &mut QueryCache,
    ) -> Result<(), BridgeError> {
        let Some(folder) = self.active_path.clone() else {
            return Ok(());
        };
        client.remove_mod_preview_image(&folder, file_name)?;
        self.refresh_previews(&folder, client, cache)
    }

    pub fn clear_previews(&mut self, client: &Client, cache: &mut QueryCache) -> Result<(), BridgeError> {
        let Some(folder) = self.active_path.clone() else {
            return Ok(());
        };
        client.clear_mod_preview_images(&folder)?;
        self.refresh_previews(&folder, client, cache)
    }

    fn refresh_previews(
        &mut self,
        folder: &Path,
        client: &Client,
        cache: &mut QueryCache,
    ) -> Result<(), BridgeError> {
        let key = QueryKey::PreviewImages(folder.to_path_buf());
        cache.invalidate(&key);
        self.previews = cache.fetch(key, || client.list_mod_preview_images(folder))?;
        Ok(())
    }

    fn rebuild_fields(&mut self) {
        let documents: Vec<IniDocument> = self
            .ini_files
            .iter()
            .filter_map(|file| match self.documents.get(&file.filename) {
                Some(DocumentSlot::Ready(document)) => Some(document.clone()),
                _ => None,
            })
            .collect();
        self.groups = keybind::build_key_bind_sections(&documents);
        self.fields = keybind::flatten_fields(&self.groups);
        self.field_ids = self.fields.iter().map(|field| field.id.clone()).collect();
        let live: BTreeSet<&str> = self.groups.iter().map(|group| group.id.as_str()).collect();
        self.expanded.retain(|id| live.contains(id.as_str()));
    }

    fn reset_field_maps(&mut self) {
        self.initial_by_field = keybind::to_field_value_map(&self.fields);
        self.draft_by_field = self.initial_by_field.clone();
    }
}

/// `file::section::label::line` shown as `section / label` for messages.
fn describe_field_id(field_id: &str) -> String {
    let parts: Vec<&str> = field_id.split("::").collect();
    match parts.as_slice() {
        [_, section, label, _] => format!(
            "{} / {}",
            section.replace("%3A", ":").replace("%25", "%"),
            label.replace("%3A", ":").replace("%25", "%")
        ),
        _ => field_id.to_string(),
    }
}

fn document_key(folder: &Path, file_name: &str) -> QueryKey {
    QueryKey::IniDocument {
        folder: folder.to_path_buf(),
        file_name: file_name.to_string(),
    }
}

fn fetch_document(
    client: &Client,
    cache: &mut QueryCache,
    folder: &Path,
    file_name: &str,
) -> Result<IniDocument, BridgeError> {
    cache.fetch(document_key(folder, file_name), || {
        client.read_mod_ini(folder, file_name)
    })
}
