//! M3U playlist parser with HTTPS download support

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::iter::Peekable;
use std::str::Chars;

use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::{Channel, DEFAULT_COUNTRY, DEFAULT_GROUP, UNKNOWN_CHANNEL};
use crate::region;

/// Public iptv-org index used when no playlist URL is configured
pub const DEFAULT_PLAYLIST_URL: &str = "https://iptv-org.github.io/iptv/index.m3u";

// The full iptv-org index is well above ureq's 10 MB default body limit
const MAX_PLAYLIST_BYTES: u64 = 256 * 1024 * 1024;

/// Channels plus the filter values derived from them
#[derive(Debug, Clone, Default)]
pub struct ParsedPlaylist {
    pub channels: Vec<Channel>,
    pub categories: BTreeSet<String>,
    pub countries: BTreeSet<String>,
    /// Region code -> display name for every derived country
    pub country_codes: BTreeMap<String, String>,
}

impl ParsedPlaylist {
    fn push(&mut self, channel: Channel) {
        self.categories.insert(channel.group.clone());
        self.countries.insert(channel.country.clone());
        if let Some(code) = &channel.country_code {
            self.country_codes
                .entry(code.clone())
                .or_insert_with(|| channel.country.clone());
        }
        self.channels.push(channel);
    }
}

/// Metadata from an `#EXTINF` line waiting for its URL line
#[derive(Debug)]
struct PendingEntry {
    tvg_id: Option<String>,
    name: String,
    group: String,
    logo: String,
}

impl PendingEntry {
    fn from_extinf(info: &str) -> Self {
        // Display name follows the last comma; attributes sit before it
        let (attr_part, name) = match info.rfind(',') {
            Some(pos) => (&info[..pos], info[pos + 1..].trim()),
            None => (info, ""),
        };
        let mut attrs = parse_attributes(attr_part);

        Self {
            tvg_id: attrs.remove("tvg-id").filter(|id| !id.is_empty()),
            name: if name.is_empty() { UNKNOWN_CHANNEL.to_string() } else { name.to_string() },
            group: attrs.remove("group-title").unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            logo: attrs.remove("tvg-logo").unwrap_or_default(),
        }
    }

    fn into_channel(self, sn: usize, url: &str) -> Channel {
        let (country_code, country) = match &self.tvg_id {
            Some(id) => derive_country(id),
            None => (None, DEFAULT_COUNTRY.to_string()),
        };
        let id = self.tvg_id.unwrap_or_else(|| format!("gen_{}", sn));

        Channel::new(sn, id, self.name, self.group, self.logo, country_code, country, url.to_string())
    }
}

/// Download an M3U playlist (plain or gzip-compressed) and return its text
pub fn download_playlist(url: &str, config: &AppConfig) -> Result<String> {
    info!("Downloading playlist from {}", url);

    let mut response = config
        .http_agent()
        .get(url)
        .header("User-Agent", config.user_agent.as_str())
        .call()?;

    if response.status() != 200 {
        return Err(Error::Status(response.status().as_u16()));
    }

    let bytes = response
        .body_mut()
        .with_config()
        .limit(MAX_PLAYLIST_BYTES)
        .read_to_vec()?;

    decode_body(&bytes)
}

/// Inflate gzip bodies (`.m3u.gz`), pass everything else through as UTF-8
fn decode_body(bytes: &[u8]) -> Result<String> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut text = String::new();
        GzDecoder::new(bytes).read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Parse M3U content into channels and the derived category/country sets.
///
/// Entries without a following `http` URL line are dropped; input without
/// any complete entry yields an empty playlist.
pub fn parse_playlist(content: &str) -> ParsedPlaylist {
    let mut playlist = ParsedPlaylist::default();
    let mut pending: Option<PendingEntry> = None;
    let mut dropped = 0usize;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(info) = line.strip_prefix("#EXTINF:") {
            if pending.replace(PendingEntry::from_extinf(info)).is_some() {
                dropped += 1;
            }
        } else if line.starts_with("http") {
            if let Some(entry) = pending.take() {
                // Numbered on commit: entries without a URL leave no gap
                let sn = playlist.channels.len() + 1;
                playlist.push(entry.into_channel(sn, line));
            }
        }
    }

    if pending.is_some() {
        dropped += 1;
    }

    debug!(
        "Parsed {} channels, {} categories, {} countries ({} entries without URL)",
        playlist.channels.len(),
        playlist.categories.len(),
        playlist.countries.len(),
        dropped
    );

    playlist
}

/// Derive `(region code, country display name)` from a `tvg-id`.
///
/// `abc.us@SD` -> `(Some("US"), "United States")`. Ids whose last dotted
/// segment is not two characters long map to "International".
pub fn derive_country(tvg_id: &str) -> (Option<String>, String) {
    let base = tvg_id.split('@').next().unwrap_or_default();
    let last = base.rsplit('.').next().unwrap_or_default();

    if last.chars().count() != 2 {
        return (None, DEFAULT_COUNTRY.to_string());
    }

    let code = last.to_uppercase();
    let name = region::display_name(&code)
        .map(str::to_string)
        .unwrap_or_else(|| code.clone());
    (Some(code), name)
}

/// Tokenize the attribute part of an `#EXTINF` line into `key -> value`.
///
/// Keys are lower-cased. Values may be quoted (`key="a b"`, with `\"`
/// escapes) or bare (`key=value`). Only the first occurrence of a key is
/// kept. Tokens without `=` (such as the `-1` duration) are skipped.
pub fn parse_attributes(info: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut chars = info.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }

        if chars.peek() != Some(&'=') {
            continue;
        }
        chars.next(); // consume '='

        let value = read_value(&mut chars);
        // Tolerate stray quotes in front of keys: "tvg-name="x"
        let key = key.trim_matches('"').to_lowercase();
        if !key.is_empty() {
            attrs.entry(key).or_insert(value);
        }
    }

    attrs
}

fn read_value(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut value = String::new();

    if chars.peek() == Some(&'"') {
        chars.next(); // opening quote
        while let Some(c) = chars.next() {
            match c {
                '"' => break,
                '\\' if chars.peek() == Some(&'"') => {
                    value.push('"');
                    chars.next();
                }
                _ => value.push(c),
            }
        }
    } else {
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == ',' {
                break;
            }
            value.push(c);
            chars.next();
        }
    }

    value
}

#[cfg(test)]
#[path = "m3u_parser_tests.rs"]
mod tests;
