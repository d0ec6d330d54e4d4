//! Data models for the IPTV channel player

/// Category used when a channel carries no `group-title`
pub const DEFAULT_GROUP: &str = "Uncategorized";
/// Country used when no region can be derived from `tvg-id`
pub const DEFAULT_COUNTRY: &str = "International";
/// Display name used when the `#EXTINF` line has no name after its last comma
pub const UNKNOWN_CHANNEL: &str = "Unknown Channel";

/// UI panel selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Channels,
    Console,
}

/// One playable channel from the playlist.
///
/// Created once per parse and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// `tvg-id` from the playlist, or `gen_<sn>` when the tag is missing
    pub id: String,
    pub name: String,
    pub group: String,
    /// Logo URL, empty when the playlist has none
    pub logo: String,
    /// Upper-case ISO region code the country was derived from
    pub country_code: Option<String>,
    pub country: String,
    /// 1-based position in the playlist
    pub sn: usize,
    pub url: String,
    /// Lower-case `"<sn> <name> <group> <country>"`, matched by the search box
    pub search_str: String,
}

impl Channel {
    pub fn new(
        sn: usize,
        id: String,
        name: String,
        group: String,
        logo: String,
        country_code: Option<String>,
        country: String,
        url: String,
    ) -> Self {
        let search_str = format!("{} {} {} {}", sn, name, group, country).to_lowercase();
        Self {
            id,
            name,
            group,
            logo,
            country_code,
            country,
            sn,
            url,
            search_str,
        }
    }
}

/// Category or country choice in the filter bar
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Only(String),
}

impl Selection {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(wanted) => wanted == value,
        }
    }

    /// Text for a combo box, `all_label` when nothing is selected
    pub fn label<'a>(&'a self, all_label: &'a str) -> &'a str {
        match self {
            Selection::All => all_label,
            Selection::Only(value) => value,
        }
    }
}

/// Current search / filter settings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterQuery {
    pub text: String,
    pub category: Selection,
    pub country: Selection,
    pub favorites_only: bool,
}
