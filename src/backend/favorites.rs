use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use super::proxy::MangaSummary;
use super::settings::app_config_dir;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("favorites storage unavailable: {0}")]
    StorageUnavailable(String),
}

fn unavailable(e: impl std::fmt::Display) -> StoreError {
    StoreError::StorageUnavailable(e.to_string())
}

/// Saved manga, persisted as a JSON array in favorite-add order.
///
/// Nothing is held in memory: every read goes to disk and every toggle
/// rewrites the whole file, so callers must re-read after a toggle.
#[derive(Debug, Clone)]
pub struct FavoritesStore {
    path: PathBuf,
}

impl Default for FavoritesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FavoritesStore {
    pub fn new() -> Self {
        Self::at(app_config_dir().join("favorites.json"))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Vec<MangaSummary>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(unavailable)?;
        serde_json::from_str(&content).map_err(unavailable)
    }

    fn save(&self, favorites: &[MangaSummary]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(unavailable)?;
        }
        let content = serde_json::to_string_pretty(favorites).map_err(unavailable)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(unavailable)?;
        fs::rename(&tmp, &self.path).map_err(unavailable)
    }

    pub fn list(&self) -> Vec<MangaSummary> {
        match self.load() {
            Ok(favorites) => favorites,
            Err(e) => {
                log::warn!("{e}; treating favorites as empty");
                Vec::new()
            }
        }
    }

    pub fn contains(&self, manga_id: &str) -> bool {
        self.list().iter().any(|m| m.id == manga_id)
    }

    /// Removes `manga` if saved, otherwise appends it. Returns whether it is
    /// now a favorite; a failed write leaves the stored set unchanged.
    pub fn toggle(&self, manga: &MangaSummary) -> Result<bool, StoreError> {
        let mut favorites = self.list();

        let added = if favorites.iter().any(|m| m.id == manga.id) {
            favorites.retain(|m| m.id != manga.id);
            false
        } else {
            favorites.push(manga.clone());
            true
        };

        self.save(&favorites).inspect_err(|e| {
            log::warn!("failed to persist favorites: {e}");
        })?;
        log::debug!(
            "favorite {} {}",
            manga.id,
            if added { "added" } else { "removed" }
        );
        Ok(added)
    }
}
