use crate::game::{self, GameId};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fs, path::PathBuf};

const DEFAULT_SAFE_KEYWORDS: [&str; 4] = ["nsfw", "nude", "lewd", "18+"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub active_game: GameId,
    #[serde(default)]
    pub games: Vec<GameConfig>,
    #[serde(default)]
    pub safe_mode: bool,
    #[serde(default = "default_safe_keywords")]
    pub safe_keywords: Vec<String>,
    #[serde(default)]
    pub pin_hash: Option<String>,
    #[serde(default = "default_pin_max_attempts")]
    pub pin_max_attempts: u32,
    #[serde(default = "default_pin_lockout_secs")]
    pub pin_lockout_secs: u64,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub game_id: GameId,
    pub mods_path: PathBuf,
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        let base_dir = base_data_dir()?;
        Self::load_or_create_in(base_dir)
    }

    pub fn load_or_create_in(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).context("create app data dir")?;
        let path = base_dir.join("config.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let mut config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            config.data_dir = base_dir;
            if !game::supported_games().contains(&config.active_game) {
                config.active_game = GameId::default();
                config.save()?;
            }
            return Ok(config);
        }

        let config = AppConfig {
            active_game: GameId::default(),
            games: Vec::new(),
            safe_mode: false,
            safe_keywords: default_safe_keywords(),
            pin_hash: None,
            pin_max_attempts: default_pin_max_attempts(),
            pin_lockout_secs: default_pin_lockout_secs(),
            data_dir: base_dir,
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).context("create app data dir")?;
        let path = self.data_dir.join("config.json");
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(path, raw).context("write app config")?;
        Ok(())
    }

    pub fn mods_path(&self, game: GameId) -> Option<PathBuf> {
        self.games
            .iter()
            .find(|entry| entry.game_id == game)
            .map(|entry| entry.mods_path.clone())
            .filter(|path| !path.as_os_str().is_empty())
    }

    pub fn set_mods_path(&mut self, game: GameId, path: PathBuf) {
        if let Some(entry) = self.games.iter_mut().find(|entry| entry.game_id == game) {
            entry.mods_path = path;
        } else {
            self.games.push(GameConfig {
                game_id: game,
                mods_path: path,
            });
        }
    }

    pub fn set_pin(&mut self, pin: Option<&str>) {
        self.pin_hash = pin.map(hash_pin);
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("modnest.log")
    }
}

pub fn hash_pin(pin: &str) -> String {
    let digest = Sha256::digest(pin.trim().as_bytes());
    format!("{digest:x}")
}

fn default_safe_keywords() -> Vec<String> {
    DEFAULT_SAFE_KEYWORDS
        .iter()
        .map(|keyword| keyword.to_string())
        .collect()
}

fn default_pin_max_attempts() -> u32 {
    5
}

fn default_pin_lockout_secs() -> u64 {
    300
}

pub fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("modnest"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_defaults_then_reloads() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("modnest");
        let mut config = AppConfig::load_or_create_in(dir.clone()).unwrap();
        assert_eq!(config.pin_max_attempts, 5);
        assert!(config.safe_keywords.iter().any(|k| k == "nsfw"));

        config.set_mods_path(GameId::Zenless, PathBuf::from("/games/ZZMI/Mods"));
        config.set_pin(Some("1234"));
        config.save().unwrap();

        let reloaded = AppConfig::load_or_create_in(dir).unwrap();
        assert_eq!(
            reloaded.mods_path(GameId::Zenless),
            Some(PathBuf::from("/games/ZZMI/Mods"))
        );
        assert_eq!(reloaded.pin_hash, Some(hash_pin("1234")));
        assert_eq!(reloaded.mods_path(GameId::Genshin), None);
    }

    #[test]
    fn pin_hash_ignores_surrounding_whitespace() {
        assert_eq!(hash_pin(" 0000 "), hash_pin("0000"));
        assert_ne!(hash_pin("0000"), hash_pin("0001"));
        assert_eq!(hash_pin("0000").len(), 64);
    }
}
