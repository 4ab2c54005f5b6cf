use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameId {
    Genshin,
    StarRail,
    Zenless,
    Wuthering,
}

impl Default for GameId {
    fn default() -> Self {
        GameId::Genshin
    }
}

impl GameId {
    pub fn display_name(self) -> &'static str {
        match self {
            GameId::Genshin => "Genshin Impact",
            GameId::StarRail => "Honkai: Star Rail",
            GameId::Zenless => "Zenless Zone Zero",
            GameId::Wuthering => "Wuthering Waves",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameId::Genshin => "genshin",
            GameId::StarRail => "starrail",
            GameId::Zenless => "zzz",
            GameId::Wuthering => "wuwa",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        supported_games()
            .into_iter()
            .find(|game| game.as_str().eq_ignore_ascii_case(value))
    }

    /// Name of the 3DMigoto loader folder that holds the `Mods` directory.
    pub fn loader_dir_name(self) -> &'static str {
        match self {
            GameId::Genshin => "GIMI",
            GameId::StarRail => "SRMI",
            GameId::Zenless => "ZZMI",
            GameId::Wuthering => "WWMI",
        }
    }
}

pub fn supported_games() -> Vec<GameId> {
    vec![
        GameId::Genshin,
        GameId::StarRail,
        GameId::Zenless,
        GameId::Wuthering,
    ]
}

pub fn looks_like_mods_root(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.eq_ignore_ascii_case("mods"))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_matches_short_names() {
        assert_eq!(GameId::parse("ZZZ"), Some(GameId::Zenless));
        assert_eq!(GameId::parse("genshin"), Some(GameId::Genshin));
        assert_eq!(GameId::parse("bg3"), None);
    }

    #[test]
    fn mods_root_requires_mods_dir() {
        let temp = tempfile::tempdir().unwrap();
        let mods = temp.path().join("Mods");
        std::fs::create_dir_all(&mods).unwrap();
        assert!(looks_like_mods_root(&mods));
        assert!(!looks_like_mods_root(temp.path()));
    }
}
