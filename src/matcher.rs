use indexmap::IndexMap;

use crate::channels::ChannelEntry;
use crate::template::Taxonomy;

/// category -> primary channel name -> candidate urls in accumulation order.
pub type MatchedChannels = IndexMap<String, IndexMap<String, Vec<String>>>;

/// Folds decoded entries from every source into the template layout.
///
/// Matching is by exact name against any of a channel's aliases and ignores the
/// category an entry was decoded under. Channels without a match are absent.
pub fn match_channels(taxonomy: &Taxonomy, entries: &[ChannelEntry]) -> MatchedChannels {
    let mut matched = MatchedChannels::new();

    for (category, specs) in taxonomy.iter() {
        let by_name = matched.entry(category.clone()).or_default();
        for spec in specs {
            for entry in entries {
                for alias in spec.names() {
                    if *alias == entry.name {
                        by_name
                            .entry(spec.primary().to_string())
                            .or_default()
                            .push(entry.url.clone());
                    }
                }
            }
        }
    }

    matched
}

pub fn matched_channel_count(matched: &MatchedChannels) -> usize {
    matched.values().map(IndexMap::len).sum()
}
