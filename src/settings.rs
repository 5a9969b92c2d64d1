use std::path::PathBuf;

use serde::de::Deserializer;
use serde::Deserialize;

/// Source entry that triggers hotel multicast discovery instead of a plain fetch.
pub const HOTEL_SOURCE: &str = "酒店组播";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_template")]
    pub template: PathBuf,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub decoder: DecoderOptions,
    #[serde(default)]
    pub announcements: Vec<AnnouncementGroup>,
    #[serde(default)]
    pub hotel: HotelSettings,
    #[serde(default)]
    pub speed_test: SpeedTestSettings,
    #[serde(default)]
    pub speed_rank: SpeedRankSettings,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template: default_template(),
            sources: SourcesConfig::default(),
            output: OutputSettings::default(),
            decoder: DecoderOptions::default(),
            announcements: Vec::new(),
            hotel: HotelSettings::default(),
            speed_test: SpeedTestSettings::default(),
            speed_rank: SpeedRankSettings::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

fn default_template() -> PathBuf {
    PathBuf::from("demo.txt")
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    #[serde(default, alias = "url", deserialize_with = "deserialize_one_or_many")]
    pub urls: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn deserialize_one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

/// A configured playlist source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(String),
    Hotel,
}

impl Source {
    pub fn parse(raw: &str) -> Self {
        if raw.trim() == HOTEL_SOURCE {
            Source::Hotel
        } else {
            Source::Url(raw.trim().to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Source::Url(url) => url,
            Source::Hotel => HOTEL_SOURCE,
        }
    }
}

impl SourcesConfig {
    pub fn sources(&self) -> Vec<Source> {
        self.urls.iter().map(|u| Source::parse(u)).collect()
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    #[default]
    #[value(name = "ipv4")]
    Ipv4,
    #[value(name = "ipv6")]
    Ipv6,
}

/// How the per-URL route suffix is spelled when a channel has several lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteLabel {
    /// `$LR•IPV4『线路2』`
    #[default]
    Plain,
    /// `$LR•3•IPV4『线路2』`
    WithTotal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_m3u")]
    pub m3u: PathBuf,
    #[serde(default = "default_txt")]
    pub txt: PathBuf,
    #[serde(default)]
    pub ip_version_priority: IpVersion,
    #[serde(default)]
    pub url_blacklist: Vec<String>,
    #[serde(default)]
    pub epg_urls: Vec<String>,
    #[serde(default = "default_logo_url_template")]
    pub logo_url_template: String,
    #[serde(default)]
    pub route_label: RouteLabel,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            m3u: default_m3u(),
            txt: default_txt(),
            ip_version_priority: IpVersion::default(),
            url_blacklist: Vec::new(),
            epg_urls: Vec::new(),
            logo_url_template: default_logo_url_template(),
            route_label: RouteLabel::default(),
        }
    }
}

fn default_m3u() -> PathBuf {
    PathBuf::from("live.m3u")
}

fn default_txt() -> PathBuf {
    PathBuf::from("live.txt")
}

fn default_logo_url_template() -> String {
    "https://gitee.com/yuanzl77/TVBox-logo/raw/main/png/{name}.png".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecoderOptions {
    /// When set, a `name,url` line whose url field contains this token yields one entry per part.
    #[serde(default)]
    pub multi_url_separator: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnouncementGroup {
    #[serde(alias = "channel")]
    pub category: String,
    #[serde(default)]
    pub entries: Vec<Announcement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Announcement {
    /// Falls back to the current date when absent.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub logo: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HotelSettings {
    #[serde(default = "default_hotel_base_url")]
    pub base_url: String,
    #[serde(default = "default_search_key")]
    pub search_key: String,
    #[serde(default = "default_speed_snapshot")]
    pub speed_snapshot: PathBuf,
    #[serde(default = "default_selection_snapshot")]
    pub selection_snapshot: PathBuf,
    #[serde(default = "default_hotel_playlist")]
    pub playlist: PathBuf,
    #[serde(default = "default_hotel_logo_url_template")]
    pub logo_url_template: String,
    #[serde(default = "default_seed_threshold")]
    pub seed_threshold: f64,
    #[serde(default = "default_select_threshold")]
    pub select_threshold: f64,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_dead_sample_count")]
    pub dead_sample_count: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HotelSettings {
    fn default() -> Self {
        Self {
            base_url: default_hotel_base_url(),
            search_key: default_search_key(),
            speed_snapshot: default_speed_snapshot(),
            selection_snapshot: default_selection_snapshot(),
            playlist: default_hotel_playlist(),
            logo_url_template: default_hotel_logo_url_template(),
            seed_threshold: default_seed_threshold(),
            select_threshold: default_select_threshold(),
            sample_size: default_sample_size(),
            concurrency: default_concurrency(),
            dead_sample_count: default_dead_sample_count(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_hotel_base_url() -> String {
    "http://www.foodieguide.com/iptvsearch".to_string()
}

fn default_search_key() -> String {
    "广东电信".to_string()
}

fn default_speed_snapshot() -> PathBuf {
    PathBuf::from("hotelspeed.txt")
}

fn default_selection_snapshot() -> PathBuf {
    PathBuf::from("hotel.txt")
}

fn default_hotel_playlist() -> PathBuf {
    PathBuf::from("hotel.m3u")
}

fn default_hotel_logo_url_template() -> String {
    "https://epg.112114.free.hr/logo/{name}.png".to_string()
}

fn default_seed_threshold() -> f64 {
    0.5
}

fn default_select_threshold() -> f64 {
    0.2
}

fn default_sample_size() -> usize {
    15
}

fn default_concurrency() -> usize {
    15
}

fn default_dead_sample_count() -> usize {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeedTestSettings {
    #[serde(default = "default_budget_ms")]
    pub budget_ms: u64,
    #[serde(default = "default_trials")]
    pub trials: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SpeedTestSettings {
    fn default() -> Self {
        Self {
            budget_ms: default_budget_ms(),
            trials: default_trials(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_budget_ms() -> u64 {
    3000
}

fn default_trials() -> usize {
    2
}

fn default_timeout_secs() -> u64 {
    6
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeedRankSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rank_trials")]
    pub trials: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SpeedRankSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            trials: default_rank_trials(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_rank_trials() -> usize {
    3
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
}

/// Loads settings from a TOML file layered with `IPTV_MERGE__*` environment overrides.
pub fn load(path: &str) -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("IPTV_MERGE").separator("__"))
        .build()?;
    Ok(settings.try_deserialize()?)
}
