pub mod local;

use crate::{
    error::BridgeError,
    game::GameId,
    models::{
        ConflictInfo, DupResolution, DupScanGroup, IniDocument, IniFileEntry, LineUpdate,
        ModFolder, ModInfo, ModInfoUpdate, PinStatus, PreviewImage, RandomProposal, WatchEvent,
    },
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::{
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, Receiver},
        Arc,
    },
    thread,
};

pub const WATCH_CHANNEL: &str = "fs-watch";

/// Request/response plus push-event boundary to the native backend.
pub trait Bridge: Send + Sync {
    fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError>;

    fn listen(&self, channel: &str) -> Result<Receiver<Value>, BridgeError>;
}

/// Typed wrapper over the backend command set.
#[derive(Clone)]
pub struct Client {
    bridge: Arc<dyn Bridge>,
}

impl Client {
    pub fn new(bridge: Arc<dyn Bridge>) -> Self {
        Self { bridge }
    }

    fn call<T: DeserializeOwned>(&self, command: &str, args: Value) -> Result<T, BridgeError> {
        tracing::debug!(command, "invoke");
        let value = self.bridge.invoke(command, args).map_err(|err| {
            tracing::warn!(command, error = %err, "invoke failed");
            err
        })?;
        serde_json::from_value(value).map_err(|source| BridgeError::Decode {
            command: command.to_string(),
            source,
        })
    }

    fn call_unit(&self, command: &str, args: Value) -> Result<(), BridgeError> {
        tracing::debug!(command, "invoke");
        self.bridge.invoke(command, args).map(|_| ()).map_err(|err| {
            tracing::warn!(command, error = %err, "invoke failed");
            err
        })
    }

    pub fn list_mod_folders(
        &self,
        game_id: GameId,
        mods_path: &Path,
        sub_path: Option<&str>,
        object_id: Option<&str>,
    ) -> Result<Vec<ModFolder>, BridgeError> {
        self.call(
            "list_mod_folders",
            json!({
                "game_id": game_id,
                "mods_path": mods_path,
                "sub_path": sub_path,
                "object_id": object_id,
            }),
        )
    }

    /// Returns the folder's path after the rename that flips its enabled state.
    pub fn toggle_mod(&self, path: &Path, enable: bool) -> Result<PathBuf, BridgeError> {
        self.call("toggle_mod", json!({ "path": path, "enable": enable }))
    }

    pub fn read_mod_info(&self, folder_path: &Path) -> Result<Option<ModInfo>, BridgeError> {
        self.call("read_mod_info", json!({ "folder_path": folder_path }))
    }

    pub fn update_mod_info(
        &self,
        folder_path: &Path,
        update: &ModInfoUpdate,
    ) -> Result<ModInfo, BridgeError> {
        self.call(
            "update_mod_info",
            json!({ "folder_path": folder_path, "update": update }),
        )
    }

    pub fn set_mod_favorite(&self, folder_path: &Path, favorite: bool) -> Result<(), BridgeError> {
        self.call_unit(
            "set_mod_favorite",
            json!({ "folder_path": folder_path, "favorite": favorite }),
        )
    }

    pub fn list_mod_ini_files(&self, folder_path: &Path) -> Result<Vec<IniFileEntry>, BridgeError> {
        self.call("list_mod_ini_files", json!({ "folder_path": folder_path }))
    }

    pub fn read_mod_ini(
        &self,
        folder_path: &Path,
        file_name: &str,
    ) -> Result<IniDocument, BridgeError> {
        self.call(
            "read_mod_ini",
            json!({ "folder_path": folder_path, "file_name": file_name }),
        )
    }

    pub fn write_mod_ini(
        &self,
        folder_path: &Path,
        file_name: &str,
        line_updates: &[LineUpdate],
    ) -> Result<(), BridgeError> {
        self.call_unit(
            "write_mod_ini",
            json!({
                "folder_path": folder_path,
                "file_name": file_name,
                "line_updates": line_updates,
            }),
        )
    }

    pub fn list_mod_preview_images(
        &self,
        folder_path: &Path,
    ) -> Result<Vec<PreviewImage>, BridgeError> {
        self.call(
            "list_mod_preview_images",
            json!({ "folder_path": folder_path }),
        )
    }

    pub fn save_mod_preview_image(
        &self,
        folder_path: &Path,
        source_path: &Path,
    ) -> Result<PreviewImage, BridgeError> {
        self.call(
            "save_mod_preview_image",
            json!({ "folder_path": folder_path, "source_path": source_path }),
        )
    }

    pub fn remove_mod_preview_image(
        &self,
        folder_path: &Path,
        file_name: &str,
    ) -> Result<(), BridgeError> {
        self.call_unit(
            "remove_mod_preview_image",
            json!({ "folder_path": folder_path, "file_name": file_name }),
        )
    }

    pub fn clear_mod_preview_images(&self, folder_path: &Path) -> Result<(), BridgeError> {
        self.call_unit(
            "clear_mod_preview_images",
            json!({ "folder_path": folder_path }),
        )
    }

    pub fn suggest_random_mods(
        &self,
        game_id: GameId,
        is_safe: bool,
    ) -> Result<Vec<RandomProposal>, BridgeError> {
        self.call(
            "suggest_random_mods",
            json!({ "game_id": game_id, "is_safe": is_safe }),
        )
    }

    pub fn enable_only_this(&self, game_id: GameId, folder_path: &Path) -> Result<PathBuf, BridgeError> {
        self.call(
            "enable_only_this",
            json!({ "game_id": game_id, "folder_path": folder_path }),
        )
    }

    pub fn check_shader_conflicts(
        &self,
        folder_path: &Path,
    ) -> Result<Vec<ConflictInfo>, BridgeError> {
        self.call(
            "check_shader_conflicts",
            json!({ "folder_path": folder_path }),
        )
    }

    pub fn dedup_scan(&self, game_id: GameId) -> Result<Vec<DupScanGroup>, BridgeError> {
        self.call("dedup_scan", json!({ "game_id": game_id }))
    }

    pub fn dedup_resolve(&self, resolutions: &[DupResolution]) -> Result<(), BridgeError> {
        self.call_unit("dedup_resolve", json!({ "resolutions": resolutions }))
    }

    pub fn verify_pin(&self, pin: &str) -> Result<PinStatus, BridgeError> {
        self.call("verify_pin", json!({ "pin": pin }))
    }

    /// Subscribes to filesystem watch events. Undecodable payloads are logged and dropped.
    pub fn watch_events(&self) -> Result<Receiver<WatchEvent>, BridgeError> {
        let raw = self.bridge.listen(WATCH_CHANNEL)?;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for value in raw {
                match serde_json::from_value::<WatchEvent>(value) {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "dropping malformed watch event"),
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::{
        collections::{HashMap, VecDeque},
        sync::{mpsc::Sender, Mutex},
    };

    /// Scripted bridge: queued replies per command, every call recorded.
    #[derive(Default)]
    pub struct ScriptedBridge {
        replies: Mutex<HashMap<String, VecDeque<Result<Value, String>>>>,
        calls: Mutex<Vec<(String, Value)>>,
        listeners: Mutex<Vec<Sender<Value>>>,
    }

    impl ScriptedBridge {
        pub fn reply(&self, command: &str, value: Value) {
            self.push(command, Ok(value));
        }

        pub fn fail(&self, command: &str, message: &str) {
            self.push(command, Err(message.to_string()));
        }

        fn push(&self, command: &str, reply: Result<Value, String>) {
            self.replies
                .lock()
                .unwrap()
                .entry(command.to_string())
                .or_default()
                .push_back(reply);
        }

        pub fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_to(&self, command: &str) -> Vec<Value> {
            self.calls()
                .into_iter()
                .filter(|(name, _)| name == command)
                .map(|(_, args)| args)
                .collect()
        }

        pub fn emit(&self, value: Value) {
            for listener in self.listeners.lock().unwrap().iter() {
                let _ = listener.send(value.clone());
            }
        }
    }

    impl Bridge for ScriptedBridge {
        fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), args));
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get_mut(command)
                .and_then(|queue| queue.pop_front());
            match reply {
                Some(Ok(value)) => Ok(value),
                Some(Err(message)) => Err(BridgeError::Rejected(message)),
                None => Ok(Value::Null),
            }
        }

        fn listen(&self, _channel: &str) -> Result<Receiver<Value>, BridgeError> {
            let (tx, rx) = mpsc::channel();
            self.listeners.lock().unwrap().push(tx);
            Ok(rx)
        }
    }

    pub fn client_with(bridge: &Arc<ScriptedBridge>) -> Client {
        Client::new(bridge.clone() as Arc<dyn Bridge>)
    }
}
