//! Read-only views over the backend's shader conflict and duplicate scans.
//! Scoring happens behind the bridge; these only order, select and apply.

use crate::{
    bridge::Client,
    cache::QueryCache,
    error::BridgeError,
    game::GameId,
    models::{ConflictInfo, DupAction, DupResolution, DupScanGroup},
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default)]
pub struct ConflictReport {
    pub folder: PathBuf,
    pub conflicts: Vec<ConflictInfo>,
}

impl ConflictReport {
    pub fn load(client: &Client, folder: &Path) -> Result<Self, BridgeError> {
        let mut conflicts = client.check_shader_conflicts(folder)?;
        conflicts.sort_by(|a, b| b.files.len().cmp(&a.files.len()).then_with(|| a.hash.cmp(&b.hash)));
        Ok(Self {
            folder: folder.to_path_buf(),
            conflicts,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// One line per conflicting hash, files shown relative to the checked folder's parent.
    pub fn lines(&self) -> Vec<String> {
        let base = self.folder.parent().unwrap_or(&self.folder);
        self.conflicts
            .iter()
            .map(|conflict| {
                let files: Vec<String> = conflict
                    .files
                    .iter()
                    .map(|file| {
                        file.strip_prefix(base)
                            .unwrap_or(file)
                            .display()
                            .to_string()
                    })
                    .collect();
                format!("{}  {}", conflict.hash, files.join(", "))
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DupReport {
    groups: Vec<DupScanGroup>,
    keep: BTreeMap<String, usize>,
    pub action: DupAction,
    pub cursor: usize,
}

impl DupReport {
    pub fn scan(client: &Client, game_id: GameId) -> Result<Self, BridgeError> {
        Ok(Self::from_groups(client.dedup_scan(game_id)?))
    }

    /// Groups are shown most confident first; each keeps its largest member by default.
    pub fn from_groups(mut groups: Vec<DupScanGroup>) -> Self {
        groups.retain(|group| group.members.len() > 1);
        groups.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.group_id.cmp(&b.group_id))
        });
        let keep = groups
            .iter()
            .map(|group| {
                let largest = group
                    .members
                    .iter()
                    .enumerate()
                    .max_by_key(|(idx, member)| (member.size_bytes, std::cmp::Reverse(*idx)))
                    .map(|(idx, _)| idx)
                    .unwrap_or(0);
                (group.group_id.clone(), largest)
            })
            .collect();
        Self {
            groups,
            keep,
            action: DupAction::Disable,
            cursor: 0,
        }
    }

    pub fn groups(&self) -> &[DupScanGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn kept_index(&self, group_id: &str) -> Option<usize> {
        self.keep.get(group_id).copied()
    }

    pub fn set_keep(&mut self, group_id: &str, member: usize) -> bool {
        let Some(group) = self.groups.iter().find(|g| g.group_id == group_id) else {
            return false;
        };
        if member >= group.members.len() {
            return false;
        }
        self.keep.insert(group_id.to_string(), member);
        true
    }

    /// Rotates the kept member of the group under the cursor.
    pub fn cycle_keep(&mut self) {
        let Some(group) = self.groups.get(self.cursor) else {
            return;
        };
        let count = group.members.len();
        let entry = self.keep.entry(group.group_id.clone()).or_insert(0);
        *entry = (*entry + 1) % count;
    }

    pub fn move_cursor(&mut self, delta: isize) {
        if self.groups.is_empty() {
            self.cursor = 0;
            return;
        }
        let target = self.cursor as isize + delta;
        self.cursor = target.clamp(0, self.groups.len() as isize - 1) as usize;
    }

    pub fn resolutions(&self) -> Vec<DupResolution> {
        self.groups
            .iter()
            .filter_map(|group| {
                let keep = group.members.get(self.kept_index(&group.group_id)?)?;
                Some(DupResolution {
                    group_id: group.group_id.clone(),
                    keep: keep.path.clone(),
                    action: self.action,
                })
            })
            .collect()
    }

    /// Sends every resolution in one call and drops cached queries for the
    /// members that were not kept.
    pub fn apply(&self, client: &Client, cache: &mut QueryCache) -> Result<usize, BridgeError> {
        let resolutions = self.resolutions();
        if resolutions.is_empty() {
            return Ok(0);
        }
        client.dedup_resolve(&resolutions)?;
        for group in &self.groups {
            let kept = self.kept_index(&group.group_id);
            for (idx, member) in group.members.iter().enumerate() {
                if Some(idx) != kept {
                    cache.invalidate_path(&member.path);
                }
            }
        }
        tracing::info!(groups = resolutions.len(), action = ?self.action, "resolved duplicates");
        Ok(resolutions.len())
    }
}
