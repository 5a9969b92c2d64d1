use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::metrics::SPEED_PROBES;
use crate::settings::SpeedTestSettings;

/// A measured rate in MB/s for a url or an endpoint. Zero means unusable.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedSample {
    pub subject: String,
    pub rate: f64,
}

/// Work item for the bounded probe pool: `subject` is what the sample is credited to.
#[derive(Debug, Clone)]
pub struct ProbeJob {
    pub subject: String,
    pub name: String,
    pub url: String,
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Bytes over elapsed time, in MB/s rounded to 4 decimals.
pub fn rate_mb_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    round4(bytes as f64 / secs / 1024.0 / 1024.0)
}

enum Trial {
    /// The download stayed open for the whole budget.
    Measured(f64),
    /// The stream ended before the budget ran out.
    Short,
}

async fn run_trial(
    client: &reqwest::Client,
    url: &str,
    budget: Duration,
) -> Result<Trial, reqwest::Error> {
    let response = client.get(url).send().await?.error_for_status()?;
    let start = Instant::now();
    let mut size: u64 = 0;
    let mut body = response.bytes_stream();

    loop {
        let remaining = budget.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Ok(Trial::Measured(rate_mb_per_sec(size, start.elapsed())));
        }
        match tokio::time::timeout(remaining, body.next()).await {
            Ok(Some(chunk)) => size += chunk?.len() as u64,
            Ok(None) => return Ok(Trial::Short),
            // Still open when the budget ran out, even if nothing arrived.
            Err(_) => return Ok(Trial::Measured(rate_mb_per_sec(size, start.elapsed()))),
        }
    }
}

/// Time-boxed streamed download; returns MB/s or 0 when no trial lasted the budget.
pub async fn measure(url: &str, settings: &SpeedTestSettings) -> f64 {
    measure_with_trials(url, settings, settings.trials).await
}

pub async fn measure_with_trials(url: &str, settings: &SpeedTestSettings, trials: usize) -> f64 {
    let timeout = Duration::from_secs(settings.timeout_secs);
    // Every probe gets its own connection pool.
    let client = match reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to build speed test client for {}: {}", url, e);
            SPEED_PROBES.with_label_values(&["error"]).inc();
            return 0.0;
        }
    };
    let budget = Duration::from_millis(settings.budget_ms);

    for attempt in 1..=trials {
        match run_trial(&client, url, budget).await {
            Ok(Trial::Measured(rate)) => {
                debug!("Speed test {} attempt {}: {} MB/s", url, attempt, rate);
                SPEED_PROBES.with_label_values(&["measured"]).inc();
                return rate;
            }
            Ok(Trial::Short) => {
                debug!("Speed test {} attempt {}: stream ended early", url, attempt);
            }
            Err(e) => {
                debug!("Speed test {} attempt {} failed: {}", url, attempt, e);
            }
        }
    }

    SPEED_PROBES.with_label_values(&["unusable"]).inc();
    0.0
}

/// Runs every job through a pool of at most `concurrency` in-flight probes and
/// waits for all of them. Result order follows completion, not submission.
pub async fn sample_all(
    jobs: Vec<ProbeJob>,
    settings: &SpeedTestSettings,
    trials: usize,
    concurrency: usize,
) -> Vec<SpeedSample> {
    stream::iter(jobs)
        .map(|job| async move {
            let rate = measure_with_trials(&job.url, settings, trials).await;
            debug!("Channel: {}, URL: {}, {}", job.name, job.url, rate);
            SpeedSample {
                subject: job.subject,
                rate,
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}
