use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

use crate::matcher::MatchedChannels;
use crate::settings::{AnnouncementGroup, IpVersion, OutputSettings, RouteLabel};
use crate::template::{Taxonomy, GENRE_MARKER};

lazy_static! {
    static ref RE_IPV6_URL: Regex = Regex::new(r"^http://\[[0-9a-fA-F:]+\]").unwrap();
}

pub fn is_ipv6(url: &str) -> bool {
    RE_IPV6_URL.is_match(url)
}

/// URLs already emitted during one write pass.
#[derive(Debug, Default)]
pub struct WrittenUrls {
    seen: HashSet<String>,
}

impl WrittenUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Returns false when the url was already written.
    pub fn insert(&mut self, url: &str) -> bool {
        self.seen.insert(url.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPlaylists {
    pub m3u: String,
    pub txt: String,
    /// Channel lines emitted from the template, announcements excluded.
    pub channel_count: usize,
}

/// Stable partition by address family, preferred family first.
pub fn sort_by_family(urls: &[String], preference: IpVersion) -> Vec<String> {
    let mut sorted = urls.to_vec();
    sorted.sort_by_key(|url| match preference {
        IpVersion::Ipv6 => !is_ipv6(url),
        IpVersion::Ipv4 => is_ipv6(url),
    });
    sorted
}

/// Drops empty, already written and blacklisted urls, recording survivors.
pub fn filter_urls(urls: Vec<String>, written: &mut WrittenUrls, blacklist: &[String]) -> Vec<String> {
    let mut kept = Vec::new();
    for url in urls {
        if url.is_empty()
            || written.contains(&url)
            || blacklist.iter().any(|b| url.contains(b.as_str()))
        {
            continue;
        }
        written.insert(&url);
        kept.push(url);
    }
    kept
}

/// Replaces any existing `$...` parameter with the route suffix.
pub fn label_url(url: &str, index: usize, total: usize, style: RouteLabel) -> String {
    let family = if is_ipv6(url) { "IPV6" } else { "IPV4" };
    let suffix = if total == 1 {
        format!("$LR•{family}")
    } else {
        match style {
            RouteLabel::Plain => format!("$LR•{family}『线路{index}』"),
            RouteLabel::WithTotal => format!("$LR•{total}•{family}『线路{index}』"),
        }
    };
    let base = url.split_once('$').map_or(url, |(base, _)| base);
    format!("{base}{suffix}")
}

pub fn logo_url(template: &str, name: &str) -> String {
    template.replace("{name}", name)
}

pub fn m3u_header(epg_urls: &[String]) -> String {
    let urls = epg_urls
        .iter()
        .map(|u| format!("\"{u}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!("#EXTM3U x-tvg-url={urls}\n")
}

pub fn extinf(index: usize, name: &str, logo: &str, category: &str) -> String {
    format!(
        "#EXTINF:-1 tvg-id=\"{index}\" tvg-name=\"{name}\" tvg-logo=\"{logo}\" group-title=\"{category}\",{name}\n"
    )
}

/// Serializes matched channels into m3u and txt text, announcements first.
pub fn render_playlists(
    matched: &MatchedChannels,
    taxonomy: &Taxonomy,
    output: &OutputSettings,
    announcements: &[AnnouncementGroup],
    today: &str,
) -> RenderedPlaylists {
    let mut m3u = m3u_header(&output.epg_urls);
    let mut txt = String::new();
    let mut written = WrittenUrls::new();
    let mut channel_count = 0;

    for group in announcements {
        txt.push_str(&format!("{},{GENRE_MARKER}\n", group.category));
        for announcement in &group.entries {
            let name = announcement.name.as_deref().unwrap_or(today);
            m3u.push_str(&extinf(1, name, &announcement.logo, &group.category));
            m3u.push_str(&format!("{}\n", announcement.url));
            txt.push_str(&format!("{},{}\n", name, announcement.url));
        }
    }

    for (category, specs) in taxonomy.iter() {
        txt.push_str(&format!("{category},{GENRE_MARKER}\n"));
        let Some(channels) = matched.get(category) else {
            continue;
        };

        for spec in specs {
            let name = spec.primary();
            let Some(candidates) = channels.get(name) else {
                continue;
            };

            let sorted = sort_by_family(candidates, output.ip_version_priority);
            let filtered = filter_urls(sorted, &mut written, &output.url_blacklist);
            let total = filtered.len();
            let logo = logo_url(&output.logo_url_template, name);

            for (i, url) in filtered.iter().enumerate() {
                let index = i + 1;
                let labeled = label_url(url, index, total, output.route_label);
                m3u.push_str(&extinf(index, name, &logo, category));
                m3u.push_str(&format!("{labeled}\n"));
                txt.push_str(&format!("{name},{labeled}\n"));
                channel_count += 1;
            }
        }
    }
    txt.push('\n');

    RenderedPlaylists {
        m3u,
        txt,
        channel_count,
    }
}

pub async fn write_playlists(rendered: &RenderedPlaylists, output: &OutputSettings) -> Result<()> {
    write_file(&output.m3u, &rendered.m3u).await?;
    write_file(&output.txt, &rendered.txt).await?;
    info!(
        "Wrote {} channel lines to {} and {}",
        rendered.channel_count,
        output.m3u.display(),
        output.txt.display()
    );
    Ok(())
}

pub(crate) async fn write_file(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("writing {}", path.display()))
}
