use lazy_static::lazy_static;
use regex::Regex;

use crate::settings::DecoderOptions;
use crate::template::{leading_field, GENRE_MARKER};

/// Number of leading lines inspected when deciding the playlist format.
const FORMAT_PROBE_LINES: usize = 15;

lazy_static! {
    static ref RE_EXTINF: Regex = Regex::new(r#"group-title="(.*?)",(.*)"#).unwrap();
}

/// One `(category, name, url)` triple decoded from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub category: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistFormat {
    /// `#EXTINF` attribute style.
    M3u,
    /// `name,url` lines with `category,#genre#` headers.
    Txt,
}

impl PlaylistFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistFormat::M3u => "m3u",
            PlaylistFormat::Txt => "txt",
        }
    }
}

pub fn detect_format(content: &str) -> PlaylistFormat {
    if content
        .split('\n')
        .take(FORMAT_PROBE_LINES)
        .any(|line| line.contains("#EXTINF"))
    {
        PlaylistFormat::M3u
    } else {
        PlaylistFormat::Txt
    }
}

pub fn decode_playlist(content: &str, options: &DecoderOptions) -> Vec<ChannelEntry> {
    match detect_format(content) {
        PlaylistFormat::M3u => parse_m3u(content),
        PlaylistFormat::Txt => parse_txt(content, options.multi_url_separator.as_deref()),
    }
}

pub fn parse_m3u(content: &str) -> Vec<ChannelEntry> {
    let mut channels = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in content.split('\n') {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("#EXTINF") {
            // Lines without a group-title keep the previous channel current.
            if let Some(caps) = RE_EXTINF.captures(line) {
                current = Some((caps[1].trim().to_string(), caps[2].trim().to_string()));
            }
        } else if !line.starts_with('#') {
            if let Some((category, name)) = &current {
                if !category.is_empty() && !name.is_empty() {
                    channels.push(ChannelEntry {
                        category: category.clone(),
                        name: name.clone(),
                        url: line.to_string(),
                    });
                }
            }
        }
    }

    channels
}

pub fn parse_txt(content: &str, multi_url_separator: Option<&str>) -> Vec<ChannelEntry> {
    let mut channels = Vec::new();
    let mut current: Option<String> = None;

    for line in content.split('\n') {
        let line = line.trim();
        if line.contains(GENRE_MARKER) {
            current = Some(leading_field(line).to_string());
            continue;
        }
        let Some(category) = &current else {
            continue;
        };

        match line.split_once(',') {
            Some((name, url)) => {
                let name = name.trim();
                let url = url.trim();
                match multi_url_separator {
                    Some(sep) if !sep.is_empty() => {
                        for part in url.split(sep) {
                            channels.push(ChannelEntry {
                                category: category.clone(),
                                name: name.to_string(),
                                url: part.to_string(),
                            });
                        }
                    }
                    _ => channels.push(ChannelEntry {
                        category: category.clone(),
                        name: name.to_string(),
                        url: url.to_string(),
                    }),
                }
            }
            None if !line.is_empty() => channels.push(ChannelEntry {
                category: category.clone(),
                name: line.to_string(),
                url: String::new(),
            }),
            None => {}
        }
    }

    channels
}

/// Distinct categories in first-seen order, for logging.
pub fn categories(entries: &[ChannelEntry]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for entry in entries {
        if !seen.contains(&entry.category.as_str()) {
            seen.push(&entry.category);
        }
    }
    seen
}
