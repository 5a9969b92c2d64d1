mod common;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use iptv_merge::channels::parse_txt;
use iptv_merge::settings::{Announcement, AnnouncementGroup, IpVersion, Settings};

const M3U_SOURCE: &str = r#"#EXTM3U x-tvg-url="http://epg"
#EXTINF:-1 tvg-id="1" tvg-name="CNN" group-title="News",CNN
http://a
#EXTINF:-1 tvg-id="2" tvg-name="BBC" group-title="News",BBC World
http://bbc-world
#EXTINF:-1 tvg-id="3" group-title="Sport",ESPN
http://[2409:8087::1]/espn
"#;

const TXT_SOURCE: &str = "\
Other,#genre#
CNN_ALT,http://b
CNN,http://a
ESPN,http://espn-v4$old
ESPN,http://ads.example/espn
";

fn source_router() -> Router {
    Router::new()
        .route("/a.m3u", get(|| async { M3U_SOURCE }))
        .route("/b.txt", get(|| async { TXT_SOURCE }))
        .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
}

fn settings_in(dir: &std::path::Path, addr: std::net::SocketAddr) -> Settings {
    std::fs::write(
        dir.join("demo.txt"),
        "News,#genre#\nCNN|CNN_ALT\nBBC\nSport,#genre#\nESPN\n酒店组播,#genre#\nCCTV1\n",
    )
    .unwrap();
    std::fs::write(dir.join("hotel.txt"), "CCTV1,http://hotel/1\nCCTV1,http://hotel/2").unwrap();

    let mut settings = Settings::default();
    settings.template = dir.join("demo.txt");
    settings.sources.urls = vec![
        format!("http://{addr}/a.m3u"),
        format!("http://{addr}/broken"),
        format!("http://{addr}/b.txt"),
        "酒店组播".to_string(),
    ];
    settings.output.m3u = dir.join("live.m3u");
    settings.output.txt = dir.join("live.txt");
    settings.output.url_blacklist = vec!["ads.example".to_string()];
    settings.hotel.base_url = format!("http://{}", common::closed_addr());
    settings.hotel.speed_snapshot = dir.join("hotelspeed.txt");
    settings.hotel.selection_snapshot = dir.join("hotel.txt");
    settings.hotel.playlist = dir.join("hotel.m3u");
    settings.hotel.connect_timeout_secs = 1;
    settings.announcements = vec![AnnouncementGroup {
        category: "Updated".to_string(),
        entries: vec![Announcement {
            name: Some("Notice".to_string()),
            logo: "http://logo".to_string(),
            url: "http://notice".to_string(),
        }],
    }];
    settings
}

#[tokio::test]
async fn test_run_merges_sources_into_template() {
    let addr = common::spawn(source_router()).await;
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path(), addr);

    let summary = iptv_merge::run(&settings).await.unwrap();
    assert_eq!(summary.sources_ok, 3);
    assert_eq!(summary.sources_failed, 1);
    assert_eq!(summary.matched_channels, 3);
    assert_eq!(summary.written_channels, 6);

    let txt = std::fs::read_to_string(&settings.output.txt).unwrap();
    assert_eq!(
        txt,
        "\
Updated,#genre#
Notice,http://notice
News,#genre#
CNN,http://a$LR•IPV4『线路1』
CNN,http://b$LR•IPV4『线路2』
Sport,#genre#
ESPN,http://espn-v4$LR•IPV4『线路1』
ESPN,http://[2409:8087::1]/espn$LR•IPV6『线路2』
酒店组播,#genre#
CCTV1,http://hotel/1$LR•IPV4『线路1』
CCTV1,http://hotel/2$LR•IPV4『线路2』

"
    );

    let m3u = std::fs::read_to_string(&settings.output.m3u).unwrap();
    assert!(m3u.starts_with("#EXTM3U x-tvg-url=\n"));
    assert_eq!(m3u.matches("http://a$").count(), 1);
    assert!(m3u.contains(
        "#EXTINF:-1 tvg-id=\"2\" tvg-name=\"ESPN\" tvg-logo=\"https://gitee.com/yuanzl77/TVBox-logo/raw/main/png/ESPN.png\" group-title=\"Sport\",ESPN\n"
    ));
}

#[tokio::test]
async fn test_written_txt_decodes_back_without_duplicates() {
    let addr = common::spawn(source_router()).await;
    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings_in(dir.path(), addr);
    settings.output.ip_version_priority = IpVersion::Ipv6;

    iptv_merge::run(&settings).await.unwrap();
    let txt = std::fs::read_to_string(&settings.output.txt).unwrap();

    let decoded = parse_txt(&txt, None);
    let pairs: Vec<(String, String)> = decoded
        .iter()
        .filter(|e| e.category != "Updated")
        .map(|e| {
            let base = e.url.split_once('$').map_or(e.url.as_str(), |(b, _)| b);
            (e.name.clone(), base.to_string())
        })
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("CNN".to_string(), "http://a".to_string()),
            ("CNN".to_string(), "http://b".to_string()),
            ("ESPN".to_string(), "http://[2409:8087::1]/espn".to_string()),
            ("ESPN".to_string(), "http://espn-v4".to_string()),
            ("CCTV1".to_string(), "http://hotel/1".to_string()),
            ("CCTV1".to_string(), "http://hotel/2".to_string()),
        ]
    );

    let mut urls: Vec<&str> = decoded.iter().map(|e| e.url.as_str()).collect();
    let total = urls.len();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), total);
}

#[tokio::test]
async fn test_missing_template_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.template = dir.path().join("absent.txt");
    settings.output.m3u = dir.path().join("live.m3u");
    settings.output.txt = dir.path().join("live.txt");

    assert!(iptv_merge::run(&settings).await.is_err());
    assert!(!settings.output.txt.exists());
}

#[tokio::test]
async fn test_speed_rank_puts_live_streams_first() {
    let streams = common::spawn(common::stream_router()).await;
    let playlist = format!(
        "Live,#genre#\nCCTV1,http://{streams}/short/1\nCCTV1,http://{streams}/live/1\nCCTV1,http://{streams}/missing\n"
    );
    let source = common::spawn(Router::new().route(
        "/list.txt",
        get(move || {
            let playlist = playlist.clone();
            async move { playlist }
        }),
    ))
    .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("demo.txt"), "Live,#genre#\nCCTV1\n").unwrap();
    let mut settings = Settings::default();
    settings.template = dir.path().join("demo.txt");
    settings.sources.urls = vec![format!("http://{source}/list.txt")];
    settings.output.m3u = dir.path().join("live.m3u");
    settings.output.txt = dir.path().join("live.txt");
    settings.speed_test = common::fast_speed_test();
    settings.speed_rank.enabled = true;
    settings.speed_rank.trials = 2;

    iptv_merge::run(&settings).await.unwrap();
    let txt = std::fs::read_to_string(&settings.output.txt).unwrap();
    assert_eq!(
        txt,
        format!(
            "Live,#genre#\n\
             CCTV1,http://{streams}/live/1$LR•IPV4『线路1』\n\
             CCTV1,http://{streams}/short/1$LR•IPV4『线路2』\n\
             CCTV1,http://{streams}/missing$LR•IPV4『线路3』\n\n"
        )
    );
}
