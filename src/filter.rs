//! Channel list filtering: search text, category, country and favorites

use std::collections::BTreeSet;

use crate::models::{Channel, FilterQuery};

/// Lower-cased search needle, computed once per filter pass
fn needle(query: &FilterQuery) -> String {
    query.text.to_lowercase()
}

fn matches(channel: &Channel, query: &FilterQuery, needle: &str, favorites: &BTreeSet<String>) -> bool {
    (needle.is_empty() || channel.search_str.contains(needle))
        && query.category.matches(&channel.group)
        && query.country.matches(&channel.country)
        && (!query.favorites_only || favorites.contains(&channel.id))
}

/// Positions in `channels` of every channel passing the query, in playlist order
pub fn filter_indices(channels: &[Channel], query: &FilterQuery, favorites: &BTreeSet<String>) -> Vec<usize> {
    let needle = needle(query);
    channels
        .iter()
        .enumerate()
        .filter(|(_, channel)| matches(channel, query, &needle, favorites))
        .map(|(idx, _)| idx)
        .collect()
}

/// Channels passing the query, in playlist (`sn`) order.
///
/// By-reference form of [`filter_indices`]; `AppState` keeps positions
/// instead so its selection survives refiltering.
pub fn filter<'a>(channels: &'a [Channel], query: &FilterQuery, favorites: &BTreeSet<String>) -> Vec<&'a Channel> {
    let needle = needle(query);
    channels
        .iter()
        .filter(|channel| matches(channel, query, &needle, favorites))
        .collect()
}
