use std::path::Path;

use anyhow::Result;
use tracing::warn;

use crate::writer::{extinf, logo_url, m3u_header, write_file};

/// Reads `endpoint,score` lines. A missing or unreadable file is an empty snapshot.
pub async fn read_speed_snapshot(path: &Path) -> Vec<(String, f64)> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => {
            warn!("No usable speed snapshot at {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    parse_speed_snapshot(&content)
}

pub fn parse_speed_snapshot(content: &str) -> Vec<(String, f64)> {
    content
        .lines()
        .filter_map(|line| {
            let (endpoint, score) = line.trim().split_once(',')?;
            let score = score.trim().parse::<f64>().ok()?;
            Some((endpoint.trim().to_string(), score))
        })
        .collect()
}

pub fn format_speed_snapshot(ranked: &[(String, f64)]) -> String {
    ranked
        .iter()
        .map(|(endpoint, score)| format!("{endpoint},{score}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn write_speed_snapshot(path: &Path, ranked: &[(String, f64)]) -> Result<()> {
    write_file(path, &format_speed_snapshot(ranked)).await
}

/// The previous run's selected `name,url` lines, verbatim. Missing file means none.
pub async fn read_selection(path: &Path) -> Vec<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content.split('\n').map(str::to_string).collect(),
        Err(e) => {
            warn!("No hotel selection snapshot at {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

pub async fn write_selection(path: &Path, lines: &[String]) -> Result<()> {
    write_file(path, &lines.join("\n")).await
}

/// Format A rendition of the selected lines; `tvg-id` restarts for each channel name.
pub fn render_hotel_m3u(
    lines: &[String],
    category: &str,
    epg_urls: &[String],
    logo_template: &str,
) -> String {
    let mut m3u = m3u_header(epg_urls);
    let mut previous = "";
    let mut index = 1;

    for line in lines {
        let Some((name, url)) = line.split_once(',') else {
            continue;
        };
        if name != previous {
            previous = name;
            index = 1;
        }
        m3u.push_str(&extinf(index, name, &logo_url(logo_template, name), category));
        m3u.push_str(&format!("{url}\n"));
        index += 1;
    }
    m3u
}
