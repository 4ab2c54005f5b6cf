use crate::{
    bridge::{Bridge, WATCH_CHANNEL},
    config::{hash_pin, AppConfig},
    error::BridgeError,
    game::GameId,
    ini,
    models::{
        IniFileEntry, LineUpdate, ModFolder, ModInfo, ModInfoUpdate, PinStatus, PreviewImage,
        RandomProposal, WatchEvent,
    },
};
use rand::seq::SliceRandom;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    fs,
    path::{Component, Path, PathBuf},
    sync::{
        mpsc::{self, Receiver, Sender},
        Mutex,
    },
    time::{Duration, Instant},
};
use walkdir::WalkDir;

pub const DISABLED_PREFIX: &str = "DISABLED ";
pub const INFO_FILE: &str = "modnest.json";
const PREVIEW_STEM: &str = "preview";
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

/// Serves the bridge command set straight from the mods directories on disk.
pub struct LocalBackend {
    mods_roots: HashMap<GameId, PathBuf>,
    safe_keywords: Vec<String>,
    pin: Mutex<PinGuard>,
    listeners: Mutex<Vec<Sender<Value>>>,
}

struct PinGuard {
    hash: Option<String>,
    max_attempts: u32,
    lockout: Duration,
    failures: u32,
    locked_until: Option<Instant>,
}

#[derive(Deserialize)]
struct ListFoldersArgs {
    game_id: GameId,
    mods_path: Option<PathBuf>,
    #[serde(default)]
    sub_path: Option<String>,
    #[serde(default)]
    object_id: Option<String>,
}

#[derive(Deserialize)]
struct ToggleArgs {
    path: PathBuf,
    enable: bool,
}

#[derive(Deserialize)]
struct FolderArgs {
    folder_path: PathBuf,
}

#[derive(Deserialize)]
struct UpdateInfoArgs {
    folder_path: PathBuf,
    update: ModInfoUpdate,
}

#[derive(Deserialize)]
struct FavoriteArgs {
    folder_path: PathBuf,
    favorite: bool,
}

#[derive(Deserialize)]
struct IniArgs {
    folder_path: PathBuf,
    file_name: String,
}

#[derive(Deserialize)]
struct WriteIniArgs {
    folder_path: PathBuf,
    file_name: String,
    line_updates: Vec<LineUpdate>,
}

#[derive(Deserialize)]
struct SavePreviewArgs {
    folder_path: PathBuf,
    source_path: PathBuf,
}

#[derive(Deserialize)]
struct RandomArgs {
    game_id: GameId,
    is_safe: bool,
}

#[derive(Deserialize)]
struct EnableOnlyArgs {
    folder_path: PathBuf,
}

#[derive(Deserialize)]
struct PinArgs {
    pin: String,
}

impl LocalBackend {
    pub fn new(mods_roots: HashMap<GameId, PathBuf>, safe_keywords: Vec<String>) -> Self {
        Self {
            mods_roots,
            safe_keywords: safe_keywords
                .into_iter()
                .map(|keyword| keyword.to_lowercase())
                .collect(),
            pin: Mutex::new(PinGuard {
                hash: None,
                max_attempts: 5,
                lockout: Duration::from_secs(300),
                failures: 0,
                locked_until: None,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let roots = config
            .games
            .iter()
            .map(|entry| (entry.game_id, entry.mods_path.clone()))
            .collect();
        Self::new(roots, config.safe_keywords.clone()).with_pin(
            config.pin_hash.clone(),
            config.pin_max_attempts,
            Duration::from_secs(config.pin_lockout_secs),
        )
    }

    pub fn with_pin(self, hash: Option<String>, max_attempts: u32, lockout: Duration) -> Self {
        if let Ok(mut guard) = self.pin.lock() {
            guard.hash = hash;
            guard.max_attempts = max_attempts.max(1);
            guard.lockout = lockout;
        }
        self
    }

    fn emit(&self, event: WatchEvent) {
        let Ok(value) = serde_json::to_value(&event) else {
            return;
        };
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|listener| listener.send(value.clone()).is_ok());
        }
    }

    fn mods_root(&self, game_id: GameId) -> Result<&PathBuf, BridgeError> {
        self.mods_roots.get(&game_id).ok_or_else(|| {
            BridgeError::rejected(format!(
                "no mods folder configured for {}",
                game_id.display_name()
            ))
        })
    }

    fn list_mod_folders(&self, args: ListFoldersArgs) -> Result<Vec<ModFolder>, BridgeError> {
        let mut dir = match args.mods_path {
            Some(path) => path,
            None => self.mods_root(args.game_id)?.clone(),
        };
        if let Some(sub_path) = args.sub_path.as_deref().filter(|s| !s.is_empty()) {
            dir = resolve_inside(&dir, sub_path)?;
        }
        if let Some(object_id) = args.object_id.as_deref().filter(|s| !s.is_empty()) {
            dir = resolve_inside(&dir, object_id)?;
        }
        if !dir.is_dir() {
            return Err(BridgeError::rejected(format!(
                "folder not found: {}",
                dir.display()
            )));
        }

        let mut folders = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let folder_name = entry.file_name().to_string_lossy().to_string();
            if folder_name.starts_with('.') {
                continue;
            }
            folders.push(self.describe_folder(entry.path(), folder_name));
        }
        folders.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(folders)
    }

    fn describe_folder(&self, path: PathBuf, folder_name: String) -> ModFolder {
        let (enabled, name) = split_disabled_prefix(&folder_name);
        let name = name.to_string();
        let info = read_info(&path).ok().flatten().unwrap_or_default();
        let is_safe = info.is_safe.unwrap_or_else(|| !self.matches_keyword(&name));
        let thumbnail = preview_images(&path)
            .ok()
            .and_then(|images| images.into_iter().next())
            .map(|image| image.path);
        ModFolder {
            path,
            name,
            folder_name,
            enabled,
            is_favorite: info.is_favorite,
            thumbnail,
            is_safe,
        }
    }

    fn matches_keyword(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.safe_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }

    fn toggle_mod(&self, path: &Path, enable: bool) -> Result<PathBuf, BridgeError> {
        let folder_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| BridgeError::rejected(format!("not a folder: {}", path.display())))?;
        let (enabled, name) = split_disabled_prefix(folder_name);
        if enabled == enable {
            return Ok(path.to_path_buf());
        }
        let target_name = if enable {
            name.to_string()
        } else {
            format!("{DISABLED_PREFIX}{name}")
        };
        let target = path.with_file_name(target_name);
        if target.exists() {
            return Err(BridgeError::rejected(format!(
                "cannot rename, {} already exists",
                target.display()
            )));
        }
        fs::rename(path, &target)?;
        self.emit(WatchEvent::Renamed {
            from: path.to_path_buf(),
            to: target.clone(),
        });
        Ok(target)
    }

    fn update_mod_info(&self, folder: &Path, update: &ModInfoUpdate) -> Result<ModInfo, BridgeError> {
        let mut info = read_info(folder)?.unwrap_or_default();
        update.apply_to(&mut info);
        let raw = serde_json::to_string_pretty(&info)
            .map_err(|err| BridgeError::rejected(format!("serialize mod info: {err}")))?;
        let path = folder.join(INFO_FILE);
        fs::write(&path, raw)?;
        self.emit(WatchEvent::Modified { path });
        Ok(info)
    }

    fn write_mod_ini(&self, args: WriteIniArgs) -> Result<(), BridgeError> {
        let path = resolve_inside(&args.folder_path, &args.file_name)?;
        let bytes = fs::read(&path)?;
        fs::write(&path, ini::patch_line_bytes(&bytes, &args.line_updates)?)?;
        self.emit(WatchEvent::Modified { path });
        Ok(())
    }

    fn save_preview(&self, folder: &Path, source: &Path) -> Result<PreviewImage, BridgeError> {
        let ext = source
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| {
                BridgeError::rejected(format!("unsupported image: {}", source.display()))
            })?;
        let mut index = 0usize;
        let target = loop {
            let file_name = if index == 0 {
                format!("{PREVIEW_STEM}.{ext}")
            } else {
                format!("{PREVIEW_STEM}_{index}.{ext}")
            };
            let candidate = folder.join(&file_name);
            if !candidate.exists() {
                break candidate;
            }
            index += 1;
        };
        fs::copy(source, &target)?;
        self.emit(WatchEvent::Created {
            path: target.clone(),
        });
        Ok(PreviewImage {
            file_name: file_name_of(&target),
            path: target,
        })
    }

    fn remove_preview(&self, folder: &Path, file_name: &str) -> Result<(), BridgeError> {
        let image = preview_images(folder)?
            .into_iter()
            .find(|image| image.file_name == file_name)
            .ok_or_else(|| BridgeError::rejected(format!("no preview image named {file_name}")))?;
        fs::remove_file(&image.path)?;
        self.emit(WatchEvent::Removed { path: image.path });
        Ok(())
    }

    fn clear_previews(&self, folder: &Path) -> Result<(), BridgeError> {
        for image in preview_images(folder)? {
            fs::remove_file(&image.path)?;
            self.emit(WatchEvent::Removed { path: image.path });
        }
        Ok(())
    }

    fn suggest_random_mods(&self, args: RandomArgs) -> Result<Vec<RandomProposal>, BridgeError> {
        let root = self.mods_root(args.game_id)?;
        let mut rng = rand::thread_rng();
        let mut proposals = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let object_name = entry.file_name().to_string_lossy().to_string();
            let (object_enabled, object_label) = split_disabled_prefix(&object_name);
            if !object_enabled || object_name.starts_with('.') {
                continue;
            }
            let candidates: Vec<ModFolder> = fs::read_dir(entry.path())?
                .filter_map(|child| child.ok())
                .filter(|child| child.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .map(|child| {
                    let name = child.file_name().to_string_lossy().to_string();
                    self.describe_folder(child.path(), name)
                })
                .filter(|folder| !args.is_safe || folder.is_safe)
                .collect();
            // A folder holding fewer than two mods is a mod itself, not an object group.
            if candidates.len() < 2 {
                continue;
            }
            if let Some(pick) = candidates.choose(&mut rng) {
                proposals.push(RandomProposal {
                    object_name: object_label.to_string(),
                    path: pick.path.clone(),
                    name: pick.name.clone(),
                });
            }
        }
        proposals.sort_by(|a, b| a.object_name.cmp(&b.object_name));
        Ok(proposals)
    }

    fn enable_only_this(&self, folder: &Path) -> Result<PathBuf, BridgeError> {
        let parent = folder
            .parent()
            .ok_or_else(|| BridgeError::rejected(format!("no parent for {}", folder.display())))?;
        let siblings: Vec<PathBuf> = fs::read_dir(parent)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| path != folder)
            .collect();
        for path in siblings {
            let enabled = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| split_disabled_prefix(name).0)
                .unwrap_or(false);
            if enabled {
                self.toggle_mod(&path, false)?;
            }
        }
        self.toggle_mod(folder, true)
    }

    fn verify_pin(&self, pin: &str) -> Result<PinStatus, BridgeError> {
        let mut guard = self.pin.lock().map_err(|_| BridgeError::Disconnected)?;
        let Some(expected) = guard.hash.clone() else {
            return Ok(PinStatus {
                valid: true,
                attempts_remaining: guard.max_attempts,
                locked_seconds: 0,
            });
        };

        let now = Instant::now();
        if let Some(until) = guard.locked_until {
            if until > now {
                return Ok(PinStatus {
                    valid: false,
                    attempts_remaining: 0,
                    locked_seconds: until.duration_since(now).as_secs().max(1),
                });
            }
            guard.locked_until = None;
        }

        if hash_pin(pin) == expected {
            guard.failures = 0;
            return Ok(PinStatus {
                valid: true,
                attempts_remaining: guard.max_attempts,
                locked_seconds: 0,
            });
        }

        guard.failures += 1;
        if guard.failures >= guard.max_attempts {
            guard.failures = 0;
            guard.locked_until = Some(now + guard.lockout);
            tracing::warn!("PIN locked out after repeated failures");
            return Ok(PinStatus {
                valid: false,
                attempts_remaining: 0,
                locked_seconds: guard.lockout.as_secs().max(1),
            });
        }
        Ok(PinStatus {
            valid: false,
            attempts_remaining: guard.max_attempts - guard.failures,
            locked_seconds: 0,
        })
    }
}

impl Bridge for LocalBackend {
    fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError> {
        match command {
            "list_mod_folders" => reply(self.list_mod_folders(decode(command, args)?)),
            "toggle_mod" => {
                let args: ToggleArgs = decode(command, args)?;
                reply(self.toggle_mod(&args.path, args.enable))
            }
            "read_mod_info" => {
                let args: FolderArgs = decode(command, args)?;
                reply(read_info(&args.folder_path))
            }
            "update_mod_info" => {
                let args: UpdateInfoArgs = decode(command, args)?;
                reply(self.update_mod_info(&args.folder_path, &args.update))
            }
            "set_mod_favorite" => {
                let args: FavoriteArgs = decode(command, args)?;
                let update = ModInfoUpdate {
                    is_favorite: Some(args.favorite),
                    ..ModInfoUpdate::default()
                };
                self.update_mod_info(&args.folder_path, &update)?;
                Ok(Value::Null)
            }
            "list_mod_ini_files" => {
                let args: FolderArgs = decode(command, args)?;
                reply(ini_files(&args.folder_path))
            }
            "read_mod_ini" => {
                let args: IniArgs = decode(command, args)?;
                let path = resolve_inside(&args.folder_path, &args.file_name)?;
                let text = read_text(&path)?;
                reply(Ok(ini::parse_ini(&args.file_name, &text)))
            }
            "write_mod_ini" => {
                self.write_mod_ini(decode(command, args)?)?;
                Ok(Value::Null)
            }
            "list_mod_preview_images" => {
                let args: FolderArgs = decode(command, args)?;
                reply(preview_images(&args.folder_path))
            }
            "save_mod_preview_image" => {
                let args: SavePreviewArgs = decode(command, args)?;
                reply(self.save_preview(&args.folder_path, &args.source_path))
            }
            "remove_mod_preview_image" => {
                let args: IniArgs = decode(command, args)?;
                self.remove_preview(&args.folder_path, &args.file_name)?;
                Ok(Value::Null)
            }
            "clear_mod_preview_images" => {
                let args: FolderArgs = decode(command, args)?;
                self.clear_previews(&args.folder_path)?;
                Ok(Value::Null)
            }
            "suggest_random_mods" => reply(self.suggest_random_mods(decode(command, args)?)),
            "enable_only_this" => {
                let args: EnableOnlyArgs = decode(command, args)?;
                reply(self.enable_only_this(&args.folder_path))
            }
            "verify_pin" => {
                let args: PinArgs = decode(command, args)?;
                reply(self.verify_pin(&args.pin))
            }
            "check_shader_conflicts" | "dedup_scan" | "dedup_resolve" => Err(
                BridgeError::rejected(format!("{command} is not available with the local backend")),
            ),
            other => Err(BridgeError::UnknownCommand(other.to_string())),
        }
    }

    fn listen(&self, channel: &str) -> Result<Receiver<Value>, BridgeError> {
        if channel != WATCH_CHANNEL {
            return Err(BridgeError::rejected(format!("unknown channel: {channel}")));
        }
        let (tx, rx) = mpsc::channel();
        self.listeners
            .lock()
            .map_err(|_| BridgeError::Disconnected)?
            .push(tx);
        Ok(rx)
    }
}

fn decode<T: DeserializeOwned>(command: &str, args: Value) -> Result<T, BridgeError> {
    serde_json::from_value(args).map_err(|source| BridgeError::Decode {
        command: command.to_string(),
        source,
    })
}

fn reply<T: Serialize>(result: Result<T, BridgeError>) -> Result<Value, BridgeError> {
    let value = result?;
    serde_json::to_value(value).map_err(|err| BridgeError::rejected(err.to_string()))
}

/// Splits a folder name into its enabled state and the name without the disabled marker.
/// `DISABLED Foo`, `disabled_Foo` and `DISABLEDFoo` all read as disabled `Foo`.
pub fn split_disabled_prefix(folder_name: &str) -> (bool, &str) {
    let marker = "disabled";
    match folder_name.get(..marker.len()) {
        Some(head) if head.eq_ignore_ascii_case(marker) => {
            let rest = &folder_name[marker.len()..];
            let rest = rest
                .strip_prefix(' ')
                .or_else(|| rest.strip_prefix('_'))
                .unwrap_or(rest);
            (false, rest)
        }
        _ => (true, folder_name),
    }
}

fn resolve_inside(base: &Path, relative: &str) -> Result<PathBuf, BridgeError> {
    let relative = Path::new(relative);
    let escapes = relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(BridgeError::rejected(format!(
            "path escapes the mod folder: {}",
            relative.display()
        )));
    }
    Ok(base.join(relative))
}

fn read_text(path: &Path) -> Result<String, BridgeError> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_info(folder: &Path) -> Result<Option<ModInfo>, BridgeError> {
    let path = folder.join(INFO_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)?;
    let info = serde_json::from_str(&raw)
        .map_err(|err| BridgeError::rejected(format!("parse {}: {err}", path.display())))?;
    Ok(Some(info))
}

fn ini_files(folder: &Path) -> Result<Vec<IniFileEntry>, BridgeError> {
    if !folder.is_dir() {
        return Err(BridgeError::rejected(format!(
            "folder not found: {}",
            folder.display()
        )));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(folder).into_iter().filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() || !has_extension(entry.path(), &["ini"]) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(folder) else {
            continue;
        };
        let filename = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(IniFileEntry {
            filename,
            path: entry.path().to_path_buf(),
        });
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

fn preview_images(folder: &Path) -> Result<Vec<PreviewImage>, BridgeError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() || !has_extension(&path, &IMAGE_EXTENSIONS) {
            continue;
        }
        let file_name = file_name_of(&path);
        if !file_name.to_lowercase().starts_with(PREVIEW_STEM) {
            continue;
        }
        images.push(PreviewImage { path, file_name });
    }
    images.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(images)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend_for(root: &Path) -> LocalBackend {
        let mut roots = HashMap::new();
        roots.insert(GameId::Genshin, root.to_path_buf());
        LocalBackend::new(roots, vec!["NSFW".to_string()])
    }

    fn make_mod(root: &Path, rel: &str, ini: Option<&str>) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        if let Some(text) = ini {
            fs::write(dir.join("mod.ini"), text).unwrap();
        }
        dir
    }

    #[test]
    fn disabled_prefix_variants() {
        assert_eq!(split_disabled_prefix("DISABLED Foo"), (false, "Foo"));
        assert_eq!(split_disabled_prefix("disabled_Foo"), (false, "Foo"));
        assert_eq!(split_disabled_prefix("DISABLEDFoo"), (false, "Foo"));
        assert_eq!(split_disabled_prefix("Foo"), (true, "Foo"));
        assert_eq!(split_disabled_prefix("Dis"), (true, "Dis"));
    }

    #[test]
    fn lists_folders_with_flags() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        make_mod(root, "Alpha", None);
        make_mod(root, "DISABLED Beta NSFW", None);
        fs::write(root.join("Alpha").join("preview.png"), b"png").unwrap();
        let backend = backend_for(root);

        let value = backend
            .invoke(
                "list_mod_folders",
                json!({ "game_id": "genshin", "mods_path": root }),
            )
            .unwrap();
        let folders: Vec<ModFolder> = serde_json::from_value(value).unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name, "Alpha");
        assert!(folders[0].enabled);
        assert!(folders[0].is_safe);
        assert_eq!(folders[0].thumbnail, Some(root.join("Alpha").join("preview.png")));
        assert_eq!(folders[1].name, "Beta NSFW");
        assert!(!folders[1].enabled);
        assert!(!folders[1].is_safe);
    }

    #[test]
    fn toggle_renames_and_emits() {
        let temp = tempfile::tempdir().unwrap();
        let dir = make_mod(temp.path(), "Alpha", None);
        let backend = backend_for(temp.path());
        let rx = backend.listen(WATCH_CHANNEL).unwrap();

        let value = backend
            .invoke("toggle_mod", json!({ "path": dir, "enable": false }))
            .unwrap();
        let new_path: PathBuf = serde_json::from_value(value).unwrap();
        assert_eq!(new_path, temp.path().join("DISABLED Alpha"));
        assert!(new_path.is_dir());
        assert!(!dir.exists());

        let event: WatchEvent = serde_json::from_value(rx.try_recv().unwrap()).unwrap();
        assert_eq!(
            event,
            WatchEvent::Renamed {
                from: dir.clone(),
                to: new_path.clone(),
            }
        );

        let value = backend
            .invoke("toggle_mod", json!({ "path": new_path, "enable": true }))
            .unwrap();
        let restored: PathBuf = serde_json::from_value(value).unwrap();
        assert_eq!(restored, dir);
    }

    #[test]
    fn write_ini_patches_lines_and_keeps_crlf() {
        let temp = tempfile::tempdir().unwrap();
        let dir = make_mod(
            temp.path(),
            "Alpha",
            Some("[KeySwap]\r\nkey = VK_F1\r\ntype = cycle\r\n"),
        );
        let backend = backend_for(temp.path());
        backend
            .invoke(
                "write_mod_ini",
                json!({
                    "folder_path": dir,
                    "file_name": "mod.ini",
                    "line_updates": [{ "line_idx": 1, "content": "key = VK_F9" }],
                }),
            )
            .unwrap();
        let text = fs::read_to_string(dir.join("mod.ini")).unwrap();
        assert_eq!(text, "[KeySwap]\r\nkey = VK_F9\r\ntype = cycle\r\n");
    }

    #[test]
    fn write_ini_keeps_legacy_encoded_bytes() {
        let temp = tempfile::tempdir().unwrap();
        let dir = make_mod(temp.path(), "Alpha", None);
        let mut original = vec![b';', b' ', 0x93, 0xfa, 0x96, 0x7b, 0x8c, 0xea, b'\r', b'\n'];
        original.extend_from_slice(b"[KeySwap]\r\nkey = VK_F1\r\n");
        fs::write(dir.join("mod.ini"), &original).unwrap();

        let backend = backend_for(temp.path());
        backend
            .invoke(
                "write_mod_ini",
                json!({
                    "folder_path": dir,
                    "file_name": "mod.ini",
                    "line_updates": [{ "line_idx": 2, "content": "key = VK_F9" }],
                }),
            )
            .unwrap();

        let mut expected = original[..21].to_vec();
        expected.extend_from_slice(b"key = VK_F9\r\n");
        assert_eq!(fs::read(dir.join("mod.ini")).unwrap(), expected);
    }

    #[test]
    fn ini_paths_cannot_escape_the_folder() {
        let temp = tempfile::tempdir().unwrap();
        let dir = make_mod(temp.path(), "Alpha", Some("[KeyA]\nkey = 1\n"));
        let backend = backend_for(temp.path());
        let err = backend
            .invoke(
                "read_mod_ini",
                json!({ "folder_path": dir, "file_name": "../secret.ini" }),
            )
            .unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }

    #[test]
    fn lists_nested_ini_files_with_forward_slashes() {
        let temp = tempfile::tempdir().unwrap();
        let dir = make_mod(temp.path(), "Alpha", Some("[KeyA]\nkey = 1\n"));
        fs::create_dir_all(dir.join("extra")).unwrap();
        fs::write(dir.join("extra").join("Toggle.INI"), "[KeyB]\nkey = 2\n").unwrap();
        let files = ini_files(&dir).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["extra/Toggle.INI", "mod.ini"]);
    }

    #[test]
    fn enable_only_this_disables_siblings() {
        let temp = tempfile::tempdir().unwrap();
        let object = temp.path().join("Raiden");
        make_mod(&object, "Skin A", None);
        let b = make_mod(&object, "DISABLED Skin B", None);
        let backend = backend_for(temp.path());

        let value = backend
            .invoke(
                "enable_only_this",
                json!({ "game_id": "genshin", "folder_path": b }),
            )
            .unwrap();
        let enabled: PathBuf = serde_json::from_value(value).unwrap();
        assert_eq!(enabled, object.join("Skin B"));
        assert!(object.join("DISABLED Skin A").is_dir());
    }

    #[test]
    fn random_picks_one_per_object_group() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        make_mod(root, "Raiden/Skin A", None);
        make_mod(root, "Raiden/Skin B", None);
        make_mod(root, "Nahida/Only", None);
        let backend = backend_for(root);

        let value = backend
            .invoke(
                "suggest_random_mods",
                json!({ "game_id": "genshin", "is_safe": true }),
            )
            .unwrap();
        let proposals: Vec<RandomProposal> = serde_json::from_value(value).unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].object_name, "Raiden");
        assert!(proposals[0].path.starts_with(root.join("Raiden")));
    }

    #[test]
    fn preview_images_save_and_clear() {
        let temp = tempfile::tempdir().unwrap();
        let dir = make_mod(temp.path(), "Alpha", None);
        let source = temp.path().join("shot.PNG");
        fs::write(&source, b"png").unwrap();
        let backend = backend_for(temp.path());

        let first = backend.save_preview(&dir, &source).unwrap();
        let second = backend.save_preview(&dir, &source).unwrap();
        assert_eq!(first.file_name, "preview.png");
        assert_eq!(second.file_name, "preview_1.png");

        backend.remove_preview(&dir, "preview.png").unwrap();
        assert_eq!(preview_images(&dir).unwrap().len(), 1);
        backend.clear_previews(&dir).unwrap();
        assert!(preview_images(&dir).unwrap().is_empty());
    }

    #[test]
    fn pin_locks_out_after_max_attempts() {
        let temp = tempfile::tempdir().unwrap();
        let backend = backend_for(temp.path()).with_pin(
            Some(hash_pin("2468")),
            2,
            Duration::from_secs(90),
        );

        let first = backend.verify_pin("0000").unwrap();
        assert!(!first.valid);
        assert_eq!(first.attempts_remaining, 1);

        let second = backend.verify_pin("0000").unwrap();
        assert_eq!(second.locked_seconds, 90);

        let locked = backend.verify_pin("2468").unwrap();
        assert!(!locked.valid);
        assert!(locked.locked_seconds > 0);
    }

    #[test]
    fn scoring_commands_are_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let backend = backend_for(temp.path());
        let err = backend
            .invoke("dedup_scan", json!({ "game_id": "genshin" }))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Rejected(_)));
        let err = backend.invoke("nope", Value::Null).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownCommand(_)));
    }
}
