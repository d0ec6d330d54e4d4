//! Key-value persistence for favorites, the last played channel and the
//! playlist URL override.
//!
//! Values are plain strings under fixed keys, stored together in one JSON
//! object on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::app_file_path;
use crate::error::Result;
use crate::m3u_parser::DEFAULT_PLAYLIST_URL;

pub const KEY_FAVORITES: &str = "iptv_favorites";
pub const KEY_LAST_CHANNEL: &str = "iptv_last_channel";
pub const KEY_PLAYLIST: &str = "iptv_playlist_url";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Store backed by `<config_dir>/iptv_web_player/storage.json`.
///
/// Every write rewrites the whole file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    pub fn open_default() -> Self {
        Self::open(app_file_path("storage.json"))
    }

    /// Open the store at `path`; a missing or unreadable file starts empty
    pub fn open(path: PathBuf) -> Self {
        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable storage {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// In-memory store, nothing survives the process
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Favorite channel ids; a corrupt value loads as an empty set
pub fn load_favorites(store: &dyn KeyValueStore) -> BTreeSet<String> {
    let Some(raw) = store.get(KEY_FAVORITES) else {
        return BTreeSet::new();
    };

    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            warn!("Failed to load favorites: {}", e);
            BTreeSet::new()
        }
    }
}

/// Persist favorites as a JSON array of ids
pub fn save_favorites(store: &mut dyn KeyValueStore, favorites: &BTreeSet<String>) -> Result<()> {
    let ids: Vec<&String> = favorites.iter().collect();
    store.set(KEY_FAVORITES, serde_json::to_string(&ids)?)
}

pub fn last_channel(store: &dyn KeyValueStore) -> Option<String> {
    store.get(KEY_LAST_CHANNEL).filter(|id| !id.is_empty())
}

pub fn set_last_channel(store: &mut dyn KeyValueStore, id: &str) -> Result<()> {
    store.set(KEY_LAST_CHANNEL, id.to_string())
}

/// Playlist URL override, or the public default
pub fn playlist_url(store: &dyn KeyValueStore) -> String {
    store
        .get(KEY_PLAYLIST)
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PLAYLIST_URL.to_string())
}

/// Store a playlist URL override; blank input is ignored and returns false
pub fn set_playlist_url(store: &mut dyn KeyValueStore, url: &str) -> Result<bool> {
    let url = url.trim();
    if url.is_empty() {
        return Ok(false);
    }
    store.set(KEY_PLAYLIST, url.to_string())?;
    Ok(true)
}

pub fn reset_playlist_url(store: &mut dyn KeyValueStore) -> Result<()> {
    store.remove(KEY_PLAYLIST)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("iptv_web_player_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn test_favorites_round_trip() {
        let mut store = MemoryStore::default();
        let favorites: BTreeSet<String> = ["b.de", "a.us", "gen_4"].iter().map(|s| s.to_string()).collect();

        save_favorites(&mut store, &favorites).unwrap();
        assert_eq!(store.get(KEY_FAVORITES).unwrap(), r#"["a.us","b.de","gen_4"]"#);
        assert_eq!(load_favorites(&store), favorites);
    }

    #[test]
    fn test_favorites_missing_or_corrupt() {
        let mut store = MemoryStore::default();
        assert!(load_favorites(&store).is_empty());

        store.set(KEY_FAVORITES, "{not json".to_string()).unwrap();
        assert!(load_favorites(&store).is_empty());
    }

    #[test]
    fn test_playlist_url_override_and_reset() {
        let mut store = MemoryStore::default();
        assert_eq!(playlist_url(&store), DEFAULT_PLAYLIST_URL);

        assert!(!set_playlist_url(&mut store, "   ").unwrap());
        assert_eq!(playlist_url(&store), DEFAULT_PLAYLIST_URL);

        assert!(set_playlist_url(&mut store, " https://example.com/my.m3u ").unwrap());
        assert_eq!(playlist_url(&store), "https://example.com/my.m3u");

        reset_playlist_url(&mut store).unwrap();
        assert_eq!(playlist_url(&store), DEFAULT_PLAYLIST_URL);
    }

    #[test]
    fn test_last_channel() {
        let mut store = MemoryStore::default();
        assert_eq!(last_channel(&store), None);
        set_last_channel(&mut store, "cnn.us").unwrap();
        assert_eq!(last_channel(&store).as_deref(), Some("cnn.us"));
    }

    #[test]
    fn test_json_file_store_persists_across_reopen() {
        let path = temp_store_path("persist");
        let _ = fs::remove_file(&path);

        let favorites: BTreeSet<String> = ["x.fr".to_string()].into_iter().collect();
        {
            let mut store = JsonFileStore::open(path.clone());
            save_favorites(&mut store, &favorites).unwrap();
            set_last_channel(&mut store, "x.fr").unwrap();
        }

        let store = JsonFileStore::open(path.clone());
        assert_eq!(load_favorites(&store), favorites);
        assert_eq!(last_channel(&store).as_deref(), Some("x.fr"));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_json_file_store_unreadable_file_starts_empty() {
        let path = temp_store_path("corrupt");
        fs::write(&path, "[1, 2, 3").unwrap();

        let mut store = JsonFileStore::open(path.clone());
        assert_eq!(store.get(KEY_PLAYLIST), None);

        // The next write replaces the corrupt file
        store.set(KEY_PLAYLIST, "https://example.com/a.m3u".to_string()).unwrap();
        let reopened = JsonFileStore::open(path.clone());
        assert_eq!(playlist_url(&reopened), "https://example.com/a.m3u");
        let _ = fs::remove_file(&path);
    }
}
