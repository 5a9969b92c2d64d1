use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;

/// Marker that turns a line into a category header in templates and txt playlists.
pub const GENRE_MARKER: &str = "#genre#";

/// A template channel: the first name is canonical, the rest are aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    names: Vec<String>,
}

impl ChannelSpec {
    /// Splits a `name|alias|alias` template entry.
    pub fn parse(raw: &str) -> Self {
        let names = raw.split('|').map(|n| n.to_string()).collect();
        Self { names }
    }

    pub fn primary(&self) -> &str {
        &self.names[0]
    }

    /// All equivalent names, primary included.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Ordered category -> channel layout the output must follow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taxonomy {
    categories: IndexMap<String, Vec<ChannelSpec>>,
}

impl Taxonomy {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<ChannelSpec>)> {
        self.categories.iter()
    }

    pub fn get(&self, category: &str) -> Option<&Vec<ChannelSpec>> {
        self.categories.get(category)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }
}

/// Text before the first comma, trimmed.
pub(crate) fn leading_field(line: &str) -> &str {
    line.split(',').next().unwrap_or("").trim()
}

pub fn parse_template(content: &str) -> Taxonomy {
    let mut categories: IndexMap<String, Vec<ChannelSpec>> = IndexMap::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.contains(GENRE_MARKER) {
            let category = leading_field(line).to_string();
            // A repeated header restarts the category in its original position.
            categories.insert(category.clone(), Vec::new());
            current = Some(category);
        } else if let Some(category) = &current {
            if let Some(channels) = categories.get_mut(category) {
                channels.push(ChannelSpec::parse(leading_field(line)));
            }
        }
    }

    Taxonomy { categories }
}

pub fn load_template(path: &Path) -> Result<Taxonomy> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading channel template {}", path.display()))?;
    Ok(parse_template(&content))
}
