pub mod channels;
pub mod hotel;
pub mod matcher;
pub mod metrics;
pub mod settings;
pub mod speed;
pub mod template;
pub mod writer;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::Result;
use channels::ChannelEntry;
use matcher::MatchedChannels;
use metrics::{SOURCE_FETCHES, WRITTEN_CHANNELS};
use settings::{Settings, Source};
use speed::ProbeJob;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub entries: usize,
    pub matched_channels: usize,
    pub written_channels: usize,
}

pub fn http_client(settings: &Settings) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(settings.sources.timeout_secs))
        .build()?)
}

pub async fn fetch_playlist(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client.get(url).send().await?.error_for_status()?;
    Ok(resp.text().await?)
}

/// Decoded entries of one source; `None` when the fetch failed.
pub async fn fetch_channels(
    client: &reqwest::Client,
    source: &Source,
    settings: &Settings,
) -> Option<Vec<ChannelEntry>> {
    let text = match source {
        Source::Hotel => hotel::discover(settings).await.join("\n"),
        Source::Url(url) => match fetch_playlist(client, url).await {
            Ok(text) => text,
            Err(e) => {
                error!("url: {} fetch failed: {}", url, e);
                SOURCE_FETCHES.with_label_values(&["failed"]).inc();
                return None;
            }
        },
    };

    let format = channels::detect_format(&text);
    let entries = channels::decode_playlist(&text, &settings.decoder);
    info!(
        "url: {} fetched as {}, {} lines, {} channels, categories: {}",
        source.label(),
        format.as_str(),
        text.split('\n').count(),
        entries.len(),
        channels::categories(&entries).join(", ")
    );
    SOURCE_FETCHES.with_label_values(&["ok"]).inc();
    Some(entries)
}

/// Re-orders every channel's candidates by measured speed, fastest first.
pub async fn rank_by_speed(mut matched: MatchedChannels, settings: &Settings) -> MatchedChannels {
    let mut jobs: Vec<ProbeJob> = Vec::new();
    let mut queued: HashSet<&str> = HashSet::new();
    for (name, url) in matched
        .values()
        .flat_map(|channels| channels.iter())
        .flat_map(|(name, urls)| urls.iter().map(move |u| (name, u)))
    {
        if !url.is_empty() && queued.insert(url.as_str()) {
            jobs.push(ProbeJob {
                subject: url.clone(),
                name: name.clone(),
                url: url.clone(),
            });
        }
    }

    info!("Speed testing {} candidate urls", jobs.len());
    let rates: HashMap<String, f64> = speed::sample_all(
        jobs,
        &settings.speed_test,
        settings.speed_rank.trials,
        settings.speed_rank.concurrency,
    )
    .await
    .into_iter()
    .map(|s| (s.subject, s.rate))
    .collect();

    for urls in matched.values_mut().flat_map(|channels| channels.values_mut()) {
        urls.sort_by(|a, b| {
            let ra = rates.get(a).copied().unwrap_or(0.0);
            let rb = rates.get(b).copied().unwrap_or(0.0);
            rb.total_cmp(&ra)
        });
    }
    matched
}

/// Template, fetch every source in order, match, optionally speed rank, write.
pub async fn run(settings: &Settings) -> Result<RunSummary> {
    let taxonomy = template::load_template(&settings.template)?;
    info!(
        "Template {} has {} categories, {} channels",
        settings.template.display(),
        taxonomy.len(),
        taxonomy.channel_count()
    );

    let client = http_client(settings)?;
    let mut summary = RunSummary::default();
    let mut entries: Vec<ChannelEntry> = Vec::new();
    for source in settings.sources.sources() {
        match fetch_channels(&client, &source, settings).await {
            Some(mut e) => {
                summary.sources_ok += 1;
                entries.append(&mut e);
            }
            None => summary.sources_failed += 1,
        }
    }
    summary.entries = entries.len();

    if entries.is_empty() {
        warn!("No channels decoded from any source");
    }

    let mut matched = matcher::match_channels(&taxonomy, &entries);
    summary.matched_channels = matcher::matched_channel_count(&matched);
    if settings.speed_rank.enabled {
        matched = rank_by_speed(matched, settings).await;
    }

    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let rendered = writer::render_playlists(
        &matched,
        &taxonomy,
        &settings.output,
        &settings.announcements,
        &today,
    );
    writer::write_playlists(&rendered, &settings.output).await?;
    summary.written_channels = rendered.channel_count;
    WRITTEN_CHANNELS.set(rendered.channel_count as f64);
    info!("Done, {} channel lines written", rendered.channel_count);

    if let Some(path) = &settings.monitoring.metrics_file {
        metrics::write_metrics(path).await?;
    }

    Ok(summary)
}
