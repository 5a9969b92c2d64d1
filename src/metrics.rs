use std::path::Path;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter_vec, Encoder, Gauge, GaugeVec,
    IntCounterVec, TextEncoder,
};

lazy_static! {
    pub static ref SOURCE_FETCHES: IntCounterVec = register_int_counter_vec!(
        "iptv_merge_source_fetches_total",
        "Playlist source fetches by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref SPEED_PROBES: IntCounterVec = register_int_counter_vec!(
        "iptv_merge_speed_probes_total",
        "Speed test probes by outcome (measured, unusable, error)",
        &["outcome"]
    )
    .unwrap();
    pub static ref HOTEL_ENDPOINT_SPEED: GaugeVec = register_gauge_vec!(
        "iptv_merge_hotel_endpoint_speed_mbps",
        "Final speed score per hotel multicast endpoint in MB/s",
        &["endpoint"]
    )
    .unwrap();
    pub static ref WRITTEN_CHANNELS: Gauge = register_gauge!(
        "iptv_merge_written_channels",
        "Channel lines written in the last playlist pass"
    )
    .unwrap();
}

pub fn gather_metrics() -> Result<String> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub async fn write_metrics(path: &Path) -> Result<()> {
    let text = gather_metrics()?;
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("writing metrics to {}", path.display()))
}
