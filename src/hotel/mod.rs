//! Hotel multicast discovery: search relays, list their channels, speed test a
//! sample per relay, keep the fast ones and persist the result for the next run.

use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::metrics::HOTEL_ENDPOINT_SPEED;
use crate::settings::{Settings, HOTEL_SOURCE};
use crate::speed::{self, ProbeJob, SpeedSample};
use crate::template::GENRE_MARKER;

pub mod search;
pub mod snapshot;

use search::{HotelChannel, HotelClient};

/// A relay host and the channels it lists.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub address: String,
    pub channels: Vec<HotelChannel>,
}

/// Final score: 0 once `dead_sample_count` samples are zero, else the best sample.
pub fn endpoint_score(rates: &[f64], dead_sample_count: usize) -> f64 {
    let zeros = rates.iter().filter(|r| **r == 0.0).count();
    if dead_sample_count > 0 && zeros >= dead_sample_count {
        return 0.0;
    }
    rates.iter().copied().fold(0.0, f64::max)
}

/// Scores every endpoint and sorts descending; ties keep discovery order.
pub fn rank_endpoints(
    endpoints: &[String],
    samples: &[SpeedSample],
    dead_sample_count: usize,
) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = endpoints
        .iter()
        .map(|endpoint| {
            let rates: Vec<f64> = samples
                .iter()
                .filter(|s| s.subject == *endpoint)
                .map(|s| s.rate)
                .collect();
            (endpoint.clone(), endpoint_score(&rates, dead_sample_count))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

/// Seeds from the last run plus reachable search results, deduplicated in order.
async fn find_endpoints(settings: &Settings, client: &HotelClient) -> Result<Vec<String>> {
    let hotel = &settings.hotel;
    let mut endpoints: Vec<String> = Vec::new();
    for (endpoint, score) in snapshot::read_speed_snapshot(&hotel.speed_snapshot).await {
        if score > hotel.seed_threshold && !endpoints.contains(&endpoint) {
            endpoints.push(endpoint);
        }
    }

    let probe_timeout = Duration::from_secs(hotel.connect_timeout_secs);
    for candidate in client.search(&hotel.search_key).await? {
        if endpoints.contains(&candidate) {
            continue;
        }
        if search::is_reachable(&candidate, probe_timeout).await {
            endpoints.push(candidate);
        }
    }

    info!("Hotel multicast endpoints: {}", endpoints.join(", "));
    Ok(endpoints)
}

/// Builds the probe list: at most `sample_size` channels per endpoint.
pub fn probe_jobs(endpoints: &[Endpoint], sample_size: usize) -> Vec<ProbeJob> {
    endpoints
        .iter()
        .flat_map(|endpoint| {
            endpoint
                .channels
                .iter()
                .take(sample_size)
                .map(move |c| ProbeJob {
                    subject: endpoint.address.clone(),
                    name: c.name.clone(),
                    url: c.url.clone(),
                })
        })
        .collect()
}

/// Lines of every endpoint scoring above `threshold`, in rank order.
pub fn select_lines(ranked: &[(String, f64)], endpoints: &[Endpoint], threshold: f64) -> Vec<String> {
    let mut lines = Vec::new();
    for (address, score) in ranked {
        if *score <= threshold {
            continue;
        }
        if let Some(endpoint) = endpoints.iter().find(|e| e.address == *address) {
            lines.extend(endpoint.channels.iter().map(HotelChannel::line));
        }
    }
    lines
}

/// Returns the freshly selected lines, or `None` when nothing usable was found.
async fn run_discovery(settings: &Settings) -> Result<Option<Vec<String>>> {
    let hotel = &settings.hotel;
    let client = HotelClient::new(hotel)?;

    let addresses = find_endpoints(settings, &client).await?;
    if addresses.is_empty() {
        return Ok(None);
    }

    let mut endpoints = Vec::with_capacity(addresses.len());
    for address in addresses {
        let channels = match client.list_channels(&address).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Listing channels of {} failed: {:#}", address, e);
                Vec::new()
            }
        };
        info!("Endpoint {} lists {} channels", address, channels.len());
        endpoints.push(Endpoint { address, channels });
    }

    let jobs = probe_jobs(&endpoints, hotel.sample_size);
    info!(
        "Speed testing {} channels across {} endpoints",
        jobs.len(),
        endpoints.len()
    );
    let samples = speed::sample_all(
        jobs,
        &settings.speed_test,
        settings.speed_test.trials,
        hotel.concurrency,
    )
    .await;

    let order: Vec<String> = endpoints.iter().map(|e| e.address.clone()).collect();
    let ranked = rank_endpoints(&order, &samples, hotel.dead_sample_count);
    for (address, score) in &ranked {
        info!("Endpoint: {}, speed: {}", address, score);
        HOTEL_ENDPOINT_SPEED.with_label_values(&[address.as_str()]).set(*score);
    }

    if let Err(e) = snapshot::write_speed_snapshot(&hotel.speed_snapshot, &ranked).await {
        warn!("{:#}", e);
    }

    let selected = select_lines(&ranked, &endpoints, hotel.select_threshold);
    if selected.is_empty() {
        return Ok(None);
    }

    if let Err(e) = snapshot::write_selection(&hotel.selection_snapshot, &selected).await {
        warn!("{:#}", e);
    }
    let m3u = snapshot::render_hotel_m3u(
        &selected,
        HOTEL_SOURCE,
        &settings.output.epg_urls,
        &hotel.logo_url_template,
    );
    if let Err(e) = crate::writer::write_file(&hotel.playlist, &m3u).await {
        warn!("{:#}", e);
    }

    Ok(Some(selected))
}

/// Runs discovery and returns txt playlist lines headed by the hotel category.
///
/// Falls back to the previous selection snapshot, unmodified, when the search
/// fails or nothing usable is found.
pub async fn discover(settings: &Settings) -> Vec<String> {
    let lines = match run_discovery(settings).await {
        Ok(Some(lines)) => lines,
        Ok(None) => {
            error!("{}: no usable endpoints found, reading previous selection", HOTEL_SOURCE);
            snapshot::read_selection(&settings.hotel.selection_snapshot).await
        }
        Err(e) => {
            error!("{}: discovery failed ({:#}), reading previous selection", HOTEL_SOURCE, e);
            snapshot::read_selection(&settings.hotel.selection_snapshot).await
        }
    };

    let mut out = Vec::with_capacity(lines.len() + 1);
    out.push(format!("{HOTEL_SOURCE},{GENRE_MARKER}"));
    out.extend(lines);
    out
}
