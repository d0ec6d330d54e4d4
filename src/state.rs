//! Application state shared by the UI panels
//!
//! Everything the channel list shows lives here: the parsed playlist, the
//! filter query, favorites, the filtered view with its paging window and
//! the current selection. The egui shell owns one `AppState` and drives it
//! through these methods; nothing in here does network IO.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::filter;
use crate::geo::{self, GeoInfo};
use crate::m3u_parser::{self, ParsedPlaylist};
use crate::models::{Channel, FilterQuery, Selection};
use crate::storage::{self, KeyValueStore};

/// Rows rendered after every filter change
pub const INITIAL_PAGE_SIZE: usize = 100;
/// Rows added when the list is scrolled to the bottom
pub const PAGE_INCREMENT: usize = 50;
/// Rows kept below the selection when keyboard navigation grows the window
const NAVIGATION_LOOKAHEAD: usize = 20;

#[derive(Debug)]
pub struct AppState {
    pub channels: Vec<Channel>,
    pub categories: BTreeSet<String>,
    pub countries: BTreeSet<String>,
    pub country_codes: BTreeMap<String, String>,
    pub query: FilterQuery,
    pub favorites: BTreeSet<String>,
    /// Positions in `channels` passing the current query
    filtered: Vec<usize>,
    /// Position in `channels` of the selected channel
    current: Option<usize>,
    page_size: usize,
    detected_country: Option<GeoInfo>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            categories: BTreeSet::new(),
            countries: BTreeSet::new(),
            country_codes: BTreeMap::new(),
            query: FilterQuery::default(),
            favorites: BTreeSet::new(),
            filtered: Vec::new(),
            current: None,
            page_size: INITIAL_PAGE_SIZE,
            detected_country: None,
        }
    }
}

impl AppState {
    /// Empty state with favorites restored from `store`
    pub fn new(store: &dyn KeyValueStore) -> Self {
        Self {
            favorites: storage::load_favorites(store),
            ..Default::default()
        }
    }

    /// Parse playlist text and replace the channel list
    pub fn load_playlist(&mut self, text: &str) {
        self.load_parsed(m3u_parser::parse_playlist(text));
    }

    /// Replace the channel list with an already parsed playlist.
    ///
    /// The query is kept and the filtered view is rebuilt from it, so
    /// filter changes made while the playlist was loading still apply.
    pub fn load_parsed(&mut self, parsed: ParsedPlaylist) {
        info!(
            "Loaded {} channels ({} categories, {} countries)",
            parsed.channels.len(),
            parsed.categories.len(),
            parsed.countries.len()
        );
        self.channels = parsed.channels;
        self.categories = parsed.categories;
        self.countries = parsed.countries;
        self.country_codes = parsed.country_codes;
        self.current = None;
        self.apply_filter();
    }

    /// Recompute the filtered view from scratch and rewind the paging window
    pub fn apply_filter(&mut self) {
        self.filtered = filter::filter_indices(&self.channels, &self.query, &self.favorites);
        self.page_size = INITIAL_PAGE_SIZE;
    }

    pub fn set_search(&mut self, text: &str) {
        self.query.text = text.to_string();
        self.apply_filter();
    }

    pub fn set_category(&mut self, category: Selection) {
        self.query.category = category;
        self.apply_filter();
    }

    pub fn set_country(&mut self, country: Selection) {
        self.query.country = country;
        self.apply_filter();
    }

    pub fn toggle_favorites_only(&mut self) {
        self.query.favorites_only = !self.query.favorites_only;
        self.apply_filter();
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.contains(id)
    }

    /// Add or remove `id` from favorites and persist the set.
    ///
    /// Returns whether the channel is a favorite afterwards. In
    /// favorites-only mode the view is refiltered so removed channels
    /// disappear immediately.
    pub fn toggle_favorite(&mut self, id: &str, store: &mut dyn KeyValueStore) -> bool {
        let now_favorite = if self.favorites.remove(id) {
            false
        } else {
            self.favorites.insert(id.to_string());
            true
        };

        if let Err(e) = storage::save_favorites(store, &self.favorites) {
            warn!("Failed to save favorites: {}", e);
        }

        if self.query.favorites_only {
            self.apply_filter();
        }
        now_favorite
    }

    /// Number of channels passing the current query
    pub fn filtered_len(&self) -> usize {
        self.filtered.len()
    }

    /// Channel at `pos` in the filtered view
    pub fn filtered_channel(&self, pos: usize) -> Option<&Channel> {
        self.filtered.get(pos).map(|&idx| &self.channels[idx])
    }

    /// Every channel passing the current query, in playlist order
    pub fn filtered(&self) -> impl Iterator<Item = &Channel> + '_ {
        self.filtered.iter().map(move |&idx| &self.channels[idx])
    }

    /// `(filtered position, channel)` pairs inside the paging window
    pub fn visible(&self) -> impl Iterator<Item = (usize, &Channel)> + '_ {
        self.filtered
            .iter()
            .take(self.page_size)
            .enumerate()
            .map(move |(pos, &idx)| (pos, &self.channels[idx]))
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn has_more(&self) -> bool {
        self.page_size < self.filtered.len()
    }

    /// Grow the paging window after the list was scrolled to its end
    pub fn load_more(&mut self) -> bool {
        if !self.has_more() {
            return false;
        }
        self.page_size += PAGE_INCREMENT;
        true
    }

    pub fn current_channel(&self) -> Option<&Channel> {
        self.current.map(|idx| &self.channels[idx])
    }

    /// Position of the selected channel in the filtered view, if it passes
    /// the current query
    pub fn current_position(&self) -> Option<usize> {
        let current = self.current?;
        self.filtered.iter().position(|&idx| idx == current)
    }

    /// Select the channel at `pos` in the filtered view and remember it as
    /// the last played channel
    pub fn select(&mut self, pos: usize, store: &mut dyn KeyValueStore) -> Option<&Channel> {
        let idx = *self.filtered.get(pos)?;
        self.current = Some(idx);

        let channel = &self.channels[idx];
        if let Err(e) = storage::set_last_channel(store, &channel.id) {
            warn!("Failed to save last channel: {}", e);
        }
        Some(channel)
    }

    /// Next channel in the filtered view, wrapping to the first
    pub fn select_next(&mut self, store: &mut dyn KeyValueStore) -> Option<&Channel> {
        let len = self.filtered.len();
        if len == 0 {
            return None;
        }
        let pos = match self.current_position() {
            Some(pos) if pos + 1 < len => pos + 1,
            Some(_) => 0,
            None => 0,
        };
        self.select(pos, store)
    }

    /// Previous channel in the filtered view, wrapping to the last
    pub fn select_prev(&mut self, store: &mut dyn KeyValueStore) -> Option<&Channel> {
        let len = self.filtered.len();
        if len == 0 {
            return None;
        }
        let pos = match self.current_position() {
            Some(pos) if pos > 0 => pos - 1,
            _ => len - 1,
        };
        self.select(pos, store)
    }

    /// Move the selection by `delta` rows, clamped to the filtered view.
    ///
    /// Grows the paging window when the new row lies past it.
    pub fn navigate(&mut self, delta: isize, store: &mut dyn KeyValueStore) -> Option<&Channel> {
        let len = self.filtered.len();
        if len == 0 {
            return None;
        }
        let from = self.current_position().map_or(-1, |pos| pos as isize);
        let pos = (from + delta).clamp(0, len as isize - 1) as usize;

        if pos >= self.page_size {
            self.page_size = pos + NAVIGATION_LOOKAHEAD;
        }
        self.select(pos, store)
    }

    /// Reselect the last played channel after a playlist load.
    ///
    /// The channel is looked up in the full list, so it is resumed even when
    /// the active filters hide it.
    pub fn restore_last_channel(&mut self, store: &mut dyn KeyValueStore) -> Option<&Channel> {
        let last_id = storage::last_channel(store)?;
        let idx = self.channels.iter().position(|c| c.id == last_id)?;
        self.current = Some(idx);

        let channel = &self.channels[idx];
        if let Err(e) = storage::set_last_channel(store, &channel.id) {
            warn!("Failed to save last channel: {}", e);
        }
        Some(channel)
    }

    pub fn detected_country(&self) -> Option<&GeoInfo> {
        self.detected_country.as_ref()
    }

    /// Remember a geolocation result and apply it if the playlist is loaded.
    ///
    /// Results without a country name are ignored.
    pub fn set_detected_country(&mut self, info: GeoInfo) -> Option<String> {
        if info.country_name.as_deref().unwrap_or_default().is_empty() {
            return None;
        }
        self.detected_country = Some(info);
        self.apply_country_detection()
    }

    /// Preselect the detected country in the country filter.
    ///
    /// Needs both the playlist and a geolocation result; whichever arrives
    /// second triggers it. Returns the selected country.
    pub fn apply_country_detection(&mut self) -> Option<String> {
        if self.countries.is_empty() {
            return None;
        }
        let geo = self.detected_country.as_ref()?;
        let country = geo::resolve_country(geo, &self.countries, &self.country_codes)?;

        info!("Detected country: {}", country);
        self.set_country(Selection::Only(country.clone()));
        Some(country)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const PLAYLIST: &str = r#"#EXTM3U
#EXTINF:-1 tvg-id="cnn.us" group-title="News",CNN
http://example.com/cnn
#EXTINF:-1 tvg-id="zdf.de" group-title="General",ZDF
http://example.com/zdf
#EXTINF:-1 tvg-id="fox.us" group-title="News",Fox News
http://example.com/fox
#EXTINF:-1 group-title="Music",Radio Paradise
http://example.com/radio
#EXTINF:-1 tvg-id="ard.de" group-title="News",Tagesschau
http://example.com/ard
"#;

    fn loaded_state() -> AppState {
        let mut state = AppState::default();
        state.load_playlist(PLAYLIST);
        state
    }

    fn big_playlist(count: usize) -> String {
        let mut content = String::from("#EXTM3U\n");
        for i in 0..count {
            content.push_str(&format!("#EXTINF:-1 group-title=\"G\",Channel {}\nhttp://example.com/{}\n", i, i));
        }
        content
    }

    fn filtered_names(state: &AppState) -> Vec<String> {
        state.filtered().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn test_load_playlist_shows_everything() {
        let state = loaded_state();
        assert_eq!(state.channels.len(), 5);
        assert_eq!(state.filtered_len(), 5);
        assert_eq!(state.current_channel(), None);
        assert_eq!(state.categories.len(), 3);
        assert_eq!(state.countries.len(), 3);
    }

    #[test]
    fn test_reload_replaces_channels() {
        let mut state = loaded_state();
        let mut store = MemoryStore::default();
        state.select(0, &mut store);

        state.load_playlist("#EXTINF:-1,Only\nhttp://example.com/only\n");
        assert_eq!(state.channels.len(), 1);
        assert_eq!(state.current_channel(), None);
        assert_eq!(state.categories.iter().map(String::as_str).collect::<Vec<_>>(), vec!["Uncategorized"]);
    }

    #[test]
    fn test_category_and_search_filters() {
        let mut state = loaded_state();
        state.set_category(Selection::Only("News".to_string()));
        assert_eq!(filtered_names(&state), vec!["CNN", "Fox News", "Tagesschau"]);

        state.set_search("fox");
        assert_eq!(filtered_names(&state), vec!["Fox News"]);

        state.set_search("");
        state.set_category(Selection::All);
        assert_eq!(state.filtered_len(), 5);
    }

    #[test]
    fn test_favorites_toggle_and_persistence() {
        let mut store = MemoryStore::default();
        let mut state = AppState::new(&store);
        state.load_playlist(PLAYLIST);

        assert!(state.toggle_favorite("zdf.de", &mut store));
        assert!(state.toggle_favorite("gen_4", &mut store));
        assert!(state.is_favorite("zdf.de"));

        state.toggle_favorites_only();
        assert_eq!(filtered_names(&state), vec!["ZDF", "Radio Paradise"]);

        // Reload favorites from persistence into a fresh state
        let mut reloaded = AppState::new(&store);
        reloaded.load_playlist(PLAYLIST);
        assert_eq!(reloaded.favorites, state.favorites);
        reloaded.toggle_favorites_only();
        assert_eq!(filtered_names(&reloaded), vec!["ZDF", "Radio Paradise"]);
    }

    #[test]
    fn test_unfavorite_in_favorites_view_refilters() {
        let mut store = MemoryStore::default();
        let mut state = loaded_state();
        state.toggle_favorite("cnn.us", &mut store);
        state.toggle_favorite("ard.de", &mut store);
        state.toggle_favorites_only();
        assert_eq!(state.filtered_len(), 2);

        assert!(!state.toggle_favorite("cnn.us", &mut store));
        assert_eq!(filtered_names(&state), vec!["Tagesschau"]);
        assert_eq!(storage::load_favorites(&store).into_iter().collect::<Vec<_>>(), vec!["ard.de"]);
    }

    #[test]
    fn test_select_persists_last_channel() {
        let mut store = MemoryStore::default();
        let mut state = loaded_state();

        let selected = state.select(2, &mut store).map(|c| c.name.clone());
        assert_eq!(selected.as_deref(), Some("Fox News"));
        assert_eq!(state.current_position(), Some(2));
        assert_eq!(storage::last_channel(&store).as_deref(), Some("fox.us"));

        assert!(state.select(99, &mut store).is_none());
        assert_eq!(state.current_position(), Some(2));
    }

    #[test]
    fn test_next_prev_wrap_around() {
        let mut store = MemoryStore::default();
        let mut state = loaded_state();

        // Nothing selected: next starts at the top, prev at the bottom
        assert_eq!(state.select_next(&mut store).map(|c| c.sn), Some(1));
        assert_eq!(state.select_prev(&mut store).map(|c| c.sn), Some(5));
        assert_eq!(state.select_next(&mut store).map(|c| c.sn), Some(1));
        assert_eq!(state.select_next(&mut store).map(|c| c.sn), Some(2));
    }

    #[test]
    fn test_next_prev_on_empty_view() {
        let mut store = MemoryStore::default();
        let mut state = loaded_state();
        state.set_search("no such channel");
        assert!(state.select_next(&mut store).is_none());
        assert!(state.select_prev(&mut store).is_none());
        assert!(state.navigate(1, &mut store).is_none());
    }

    #[test]
    fn test_navigate_clamps() {
        let mut store = MemoryStore::default();
        let mut state = loaded_state();

        assert_eq!(state.navigate(-1, &mut store).map(|c| c.sn), Some(1));
        assert_eq!(state.navigate(1, &mut store).map(|c| c.sn), Some(2));
        assert_eq!(state.navigate(10, &mut store).map(|c| c.sn), Some(5));
        assert_eq!(state.navigate(1, &mut store).map(|c| c.sn), Some(5));
    }

    #[test]
    fn test_selection_survives_filter_when_still_visible() {
        let mut store = MemoryStore::default();
        let mut state = loaded_state();
        state.select(4, &mut store); // Tagesschau

        state.set_category(Selection::Only("News".to_string()));
        assert_eq!(state.current_position(), Some(2));

        state.set_category(Selection::Only("Music".to_string()));
        assert_eq!(state.current_position(), None);
        assert_eq!(state.current_channel().map(|c| c.name.as_str()), Some("Tagesschau"));
    }

    #[test]
    fn test_paging_window() {
        let mut store = MemoryStore::default();
        let mut state = AppState::default();
        state.load_playlist(&big_playlist(230));

        assert_eq!(state.visible().count(), 100);
        assert!(state.load_more());
        assert_eq!(state.visible().count(), 150);
        assert!(state.load_more());
        assert!(state.load_more());
        assert_eq!(state.visible().count(), 230);
        assert!(!state.load_more());

        // Any filter change rewinds the window
        state.set_search("channel");
        assert_eq!(state.page_size(), INITIAL_PAGE_SIZE);

        // Keyboard navigation past the window grows it
        state.select(99, &mut store);
        state.navigate(1, &mut store);
        assert_eq!(state.current_position(), Some(100));
        assert_eq!(state.page_size(), 120);
    }

    #[test]
    fn test_restore_last_channel() {
        let mut store = MemoryStore::default();
        storage::set_last_channel(&mut store, "ard.de").unwrap();

        let mut state = loaded_state();
        let restored = state.restore_last_channel(&mut store).map(|c| c.name.clone());
        assert_eq!(restored.as_deref(), Some("Tagesschau"));

        storage::set_last_channel(&mut store, "gone.xx").unwrap();
        let mut state = loaded_state();
        assert!(state.restore_last_channel(&mut store).is_none());
    }

    #[test]
    fn test_restore_last_channel_hidden_by_country_filter() {
        let mut store = MemoryStore::default();
        storage::set_last_channel(&mut store, "cnn.us").unwrap();

        let mut state = AppState::default();
        state.set_detected_country(GeoInfo {
            country_name: Some("Germany".to_string()),
            country_code: Some("DE".to_string()),
        });
        state.load_playlist(PLAYLIST);
        state.apply_country_detection();
        assert_eq!(filtered_names(&state), vec!["ZDF", "Tagesschau"]);

        let restored = state.restore_last_channel(&mut store).map(|c| c.name.clone());
        assert_eq!(restored.as_deref(), Some("CNN"));
        assert_eq!(state.current_channel().map(|c| c.id.as_str()), Some("cnn.us"));
        assert_eq!(state.current_position(), None);
        assert_eq!(storage::last_channel(&store).as_deref(), Some("cnn.us"));

        // Once the filter is cleared the resumed channel is highlighted again
        state.set_country(Selection::All);
        assert_eq!(state.current_position(), Some(0));
    }

    #[test]
    fn test_query_set_while_loading_applies_to_loaded_playlist() {
        let mut state = AppState::default();
        state.toggle_favorites_only();
        state.set_search("fox");

        state.load_playlist(PLAYLIST);
        assert_eq!(state.channels.len(), 5);
        assert_eq!(state.filtered_len(), 0);

        state.toggle_favorites_only();
        assert_eq!(filtered_names(&state), vec!["Fox News"]);
    }

    #[test]
    fn test_reload_keeps_category_filter() {
        let mut state = AppState::default();
        state.set_category(Selection::Only("News".to_string()));
        state.load_playlist(PLAYLIST);
        assert_eq!(filtered_names(&state), vec!["CNN", "Fox News", "Tagesschau"]);
        assert_eq!(state.page_size(), INITIAL_PAGE_SIZE);
    }

    #[test]
    fn test_country_detection_after_playlist() {
        let mut state = loaded_state();
        let selected = state.set_detected_country(GeoInfo {
            country_name: Some("Germany".to_string()),
            country_code: Some("DE".to_string()),
        });
        assert_eq!(selected.as_deref(), Some("Germany"));
        assert_eq!(state.query.country, Selection::Only("Germany".to_string()));
        assert_eq!(filtered_names(&state), vec!["ZDF", "Tagesschau"]);
    }

    #[test]
    fn test_country_detection_before_playlist() {
        let mut state = AppState::default();
        let selected = state.set_detected_country(GeoInfo {
            country_name: Some("USA".to_string()),
            country_code: Some("US".to_string()),
        });
        assert_eq!(selected, None);
        assert!(state.detected_country().is_some());

        state.load_playlist(PLAYLIST);
        assert_eq!(state.apply_country_detection().as_deref(), Some("United States"));
        assert_eq!(filtered_names(&state), vec!["CNN", "Fox News"]);
    }

    #[test]
    fn test_country_detection_ignores_unknown_or_empty() {
        let mut state = loaded_state();
        assert_eq!(state.set_detected_country(GeoInfo::default()), None);
        assert!(state.detected_country().is_none());

        let selected = state.set_detected_country(GeoInfo {
            country_name: Some("Japan".to_string()),
            country_code: Some("JP".to_string()),
        });
        assert_eq!(selected, None);
        assert_eq!(state.query.country, Selection::All);
        assert_eq!(state.filtered_len(), 5);
    }
}
